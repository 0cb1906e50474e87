//! This module defines client/user visible errors that can be returned by mockend.
//!
//! Two families live in the same enum:
//!  1. errors caused by the caller (bad configuration, bad arguments, unknown status codes).
//!     These are returned by the synchronous call that caused them.
//!  2. [`Error::Rejected`], which carries a simulated HTTP failure. It is a normal outcome of an
//!     endpoint operation and is only ever returned by the async operations.
use std::fmt::Display;

use serde::Serialize;

use crate::response::ErrorEnvelope;

pub type Result<T> = std::result::Result<T, Error>;

/// Error enum with all possible variants
#[derive(Debug, Serialize)]
pub enum Error {
    /// Fault weights exceed the maximum distribution or the catalog is malformed
    Configuration { reason: String },
    /// Bad constructor input, bad trigger registration or a non integer status code
    InvalidArgument { reason: String },
    /// The status code is not part of the fault catalog
    UnsupportedCode { code: u16 },
    /// A simulated HTTP failure (including 404s for missing records)
    Rejected(ErrorEnvelope),
    Http { reason: String },
    Io { reason: String },
    Json { reason: String },
    Logic { reason: String },
}

impl Error {
    /// Returns true if this is a rejection carrying a 404 status code
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Rejected(envelope) if envelope.status_code == 404)
    }

    /// Returns the simulated error envelope, if this is a [`Error::Rejected`]
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            Error::Rejected(envelope) => Some(envelope),
            _ => None,
        }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http {
            reason: err.to_string(),
        }
    }
}

impl From<ErrorEnvelope> for Error {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self::Rejected(envelope)
    }
}
