//! Weighted random error selection plus the deterministic "forced error" override.
use std::sync::Mutex;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{event, Level};

use super::catalog::{validate_weights, FaultCatalog, FaultDescriptor, MAX_DISTRIBUTION};
use crate::{error::Result, response::ErrorEnvelope, utils::acquire_lock};

#[derive(Debug)]
struct State {
    forced: Option<u16>,
    disabled: bool,
    rng: StdRng,
}

/// Decides whether a simulated request fails and with which error.
///
/// Policy when both a forced override and the disabled flag are set: the forced override wins.
/// Disabling only turns off the *random* generation.
#[derive(Debug)]
pub struct ErrorSelector {
    catalog: FaultCatalog,
    state: Mutex<State>,
}

impl ErrorSelector {
    pub fn new(catalog: FaultCatalog) -> Self {
        Self::with_rng(catalog, StdRng::from_entropy())
    }

    /// Selector whose draws are reproducible
    pub fn seeded(catalog: FaultCatalog, seed: u64) -> Self {
        Self::with_rng(catalog, StdRng::seed_from_u64(seed))
    }

    fn with_rng(catalog: FaultCatalog, rng: StdRng) -> Self {
        Self {
            catalog,
            state: Mutex::new(State {
                forced: None,
                disabled: false,
                rng,
            }),
        }
    }

    pub fn catalog(&self) -> &FaultCatalog {
        &self.catalog
    }

    /// Draws from the catalog this selector was built with
    pub fn draw(&self) -> Result<Option<ErrorEnvelope>> {
        self.draw_from(self.catalog.faults())
    }

    /// Draws an error from `faults`.
    ///
    /// A random number `r` is drawn in `[0, MAX_DISTRIBUTION)` and the first fault whose cumulative
    /// weight is at least `r` is selected. The first fault of the set also owns `r == 0`, so it fires
    /// with `(weight + 1) / MAX_DISTRIBUTION`. Nothing selected means a clean response.
    ///
    /// # Errors
    /// [`crate::error::Error::Configuration`] if the weights add up to more than [`MAX_DISTRIBUTION`].
    /// The check happens before anything else, forced override included.
    pub fn draw_from(&self, faults: &[FaultDescriptor]) -> Result<Option<ErrorEnvelope>> {
        validate_weights(faults)?;

        let mut state = acquire_lock(&self.state, "ErrorSelector")?;
        if let Some(code) = state.forced {
            event!(Level::DEBUG, "Returning forced error {}", code);
            return Ok(Some(self.catalog.lookup(code)?.into()));
        }

        if state.disabled {
            return Ok(None);
        }

        let r = state.rng.gen_range(0..MAX_DISTRIBUTION);
        match select(faults, r) {
            Some(fault) => {
                event!(
                    Level::DEBUG,
                    "Random error {} selected (r = {})",
                    fault.status_code,
                    r
                );
                Ok(Some(fault.into()))
            }
            None => Ok(None),
        }
    }

    /// Sets whether random errors are suppressed and returns the current value.
    /// Passing `None` only reads the flag.
    pub fn disable_random_errors(&self, disabled: Option<bool>) -> Result<bool> {
        let mut state = acquire_lock(&self.state, "ErrorSelector")?;
        if let Some(disabled) = disabled {
            state.disabled = disabled;
        }
        Ok(state.disabled)
    }

    /// Forces every subsequent draw to return `code` until called with `None`.
    ///
    /// # Errors
    /// [`crate::error::Error::UnsupportedCode`] if `code` is not part of the catalog
    pub fn force_error(&self, code: Option<u16>) -> Result<()> {
        if let Some(code) = code {
            self.catalog.lookup(code)?;
        }

        let mut state = acquire_lock(&self.state, "ErrorSelector")?;
        state.forced = code;
        Ok(())
    }

    pub fn forced_error(&self) -> Result<Option<u16>> {
        Ok(acquire_lock(&self.state, "ErrorSelector")?.forced)
    }
}

fn select(faults: &[FaultDescriptor], r: u32) -> Option<&FaultDescriptor> {
    let mut cumulative = 0;
    faults.iter().find(|fault| {
        cumulative += fault.weight as u32;
        cumulative >= r
    })
}
