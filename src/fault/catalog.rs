//! The fault catalog: one row per simulated HTTP failure condition.
//!
//! Weights are expressed out of [`MAX_DISTRIBUTION`]. Whatever is left after summing all weights is
//! the probability of a clean response, so a catalog is only valid if its weights add up to at
//! most [`MAX_DISTRIBUTION`].
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Random draws happen in `[0, MAX_DISTRIBUTION)`
pub const MAX_DISTRIBUTION: u32 = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FaultDescriptor {
    pub status_code: u16,
    pub status_text: &'static str,
    pub weight: u8,
}

impl FaultDescriptor {
    pub const fn new(status_code: u16, status_text: &'static str, weight: u8) -> Self {
        Self {
            status_code,
            status_text,
            weight,
        }
    }
}

const fn fault(status_code: u16, status_text: &'static str, weight: u8) -> FaultDescriptor {
    FaultDescriptor::new(status_code, status_text, weight)
}

/// The default table. A status code of 0 represents a dropped connection.
pub const DEFAULT_FAULTS: &[FaultDescriptor] = &[
    fault(0, "", 5),
    fault(400, "Bad request", 1),
    fault(401, "Not authorized", 3),
    fault(403, "Forbidden", 3),
    fault(404, "Not found", 6),
    fault(405, "Method not allowed", 2),
    fault(406, "Not acceptable", 2),
    fault(407, "Proxy Authentication Required", 0),
    fault(408, "Request timeout", 2),
    fault(409, "Conflict", 1),
    fault(410, "Gone", 1),
    fault(411, "Length required", 1),
    fault(412, "Precondition Failed", 1),
    fault(413, "Request entity too large", 1),
    fault(414, "Request-URI too long", 1),
    fault(415, "Unsupported media type", 1),
    fault(416, "Requested range not satisfiable", 1),
    fault(417, "Expectation failed", 1),
    fault(500, "Internal server error", 5),
    fault(501, "Not implemented", 1),
    fault(502, "Bad gateway", 0),
    fault(503, "Service unavailable", 1),
    fault(504, "Gateway timeout", 0),
    fault(505, "HTTP version not supported", 0),
];

/// Sum of the weights of a fault set
pub fn total_weight(faults: &[FaultDescriptor]) -> u32 {
    faults.iter().map(|f| f.weight as u32).sum()
}

/// Fails with [`Error::Configuration`] if the fault set can't be used for a draw
pub fn validate_weights(faults: &[FaultDescriptor]) -> Result<()> {
    let total = total_weight(faults);
    if total > MAX_DISTRIBUTION {
        return Err(Error::Configuration {
            reason: format!(
                "Sum of weights ({}) is greater than the max distribution ({})",
                total, MAX_DISTRIBUTION
            ),
        });
    }
    Ok(())
}

/// Read only table of [`FaultDescriptor`]s
#[derive(Clone, Debug)]
pub struct FaultCatalog {
    faults: Vec<FaultDescriptor>,
}

impl Default for FaultCatalog {
    fn default() -> Self {
        Self {
            faults: DEFAULT_FAULTS.to_vec(),
        }
    }
}

impl FaultCatalog {
    /// Builds a custom catalog.
    ///
    /// # Errors
    /// [`Error::Configuration`] if the weights add up to more than [`MAX_DISTRIBUTION`] or if a
    /// status code shows up more than once.
    pub fn new(faults: Vec<FaultDescriptor>) -> Result<Self> {
        validate_weights(&faults)?;
        for (i, fault) in faults.iter().enumerate() {
            if faults[..i]
                .iter()
                .any(|other| other.status_code == fault.status_code)
            {
                return Err(Error::Configuration {
                    reason: format!("Duplicated status code {} in catalog", fault.status_code),
                });
            }
        }

        Ok(Self { faults })
    }

    pub fn faults(&self) -> &[FaultDescriptor] {
        &self.faults
    }

    pub fn lookup(&self, code: u16) -> Result<&FaultDescriptor> {
        self.faults
            .iter()
            .find(|f| f.status_code == code)
            .ok_or(Error::UnsupportedCode { code })
    }

    /// Same as [`FaultCatalog::lookup`] but for codes coming from untyped input (configs, JSON payloads)
    pub fn lookup_json(&self, code: &Value) -> Result<&FaultDescriptor> {
        let code = code
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())
            .ok_or_else(|| {
                Error::invalid_argument(format!("Must provide an integer error code, got {}", code))
            })?;

        self.lookup(code)
    }

    pub fn codes(&self) -> Vec<u16> {
        self.faults.iter().map(|f| f.status_code).collect()
    }
}
