//! User registered error triggers.
//!
//! A trigger binds a predicate over the request/response data to a status code. When the predicate
//! returns true for data flowing through an operation of the right method, the error is returned
//! regardless of the random error configuration.
use std::{
    fmt::Debug,
    str::FromStr,
    sync::{Arc, Mutex, Weak},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{event, Level};

use super::catalog::FaultCatalog;
use crate::{
    error::{Error, Result},
    response::ErrorEnvelope,
    utils::acquire_lock,
};

/// HTTP method class of a simulated operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
}

/// Which operations a trigger applies to
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum MethodScope {
    Get,
    Post,
    #[default]
    All,
}

impl MethodScope {
    pub fn matches(&self, method: Method) -> bool {
        matches!(
            (self, method),
            (MethodScope::All, _)
                | (MethodScope::Get, Method::Get)
                | (MethodScope::Post, Method::Post)
        )
    }

    /// Parses a scope, failing with an [`Error::InvalidArgument`] listing the valid values
    pub fn parse(scope: &str) -> Result<Self> {
        MethodScope::from_str(scope).map_err(|_| {
            let valid: Vec<String> = MethodScope::iter().map(|s| s.to_string()).collect();
            Error::invalid_argument(format!(
                "method must be one of: {}, got {}",
                valid.join(","),
                scope
            ))
        })
    }
}

pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

struct Trigger {
    id: u64,
    predicate: Predicate,
    status_code: u16,
    scope: MethodScope,
}

impl Debug for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trigger")
            .field("id", &self.id)
            .field("status_code", &self.status_code)
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Debug, Default)]
struct Triggers {
    next_id: u64,
    entries: Vec<Trigger>,
}

/// Ordered collection of triggers.
///
/// Ids are handed out by a monotonic counter, so an id is never reused for the life of the registry
/// even if triggers are removed in the middle of the sequence.
#[derive(Debug)]
pub struct TriggerRegistry {
    catalog: FaultCatalog,
    triggers: Arc<Mutex<Triggers>>,
}

/// Returned by [`TriggerRegistry::add`]. Calling [`TriggerHandle::remove`] removes exactly the
/// trigger that created it. Dropping the handle leaves the trigger registered.
#[derive(Debug)]
#[must_use = "the handle is the only way to remove the trigger"]
pub struct TriggerHandle {
    id: u64,
    triggers: Weak<Mutex<Triggers>>,
}

impl TriggerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Removes the trigger. Returns false if it was already gone (or the registry was dropped).
    pub fn remove(self) -> bool {
        let Some(triggers) = self.triggers.upgrade() else {
            return false;
        };

        let Ok(mut guard) = acquire_lock(&triggers, "TriggerRegistry") else {
            return false;
        };

        match guard.entries.iter().position(|t| t.id == self.id) {
            Some(index) => {
                guard.entries.remove(index);
                event!(Level::DEBUG, "Removed error trigger {}", self.id);
                true
            }
            None => false,
        }
    }
}

impl TriggerRegistry {
    pub fn new(catalog: FaultCatalog) -> Self {
        Self {
            catalog,
            triggers: Default::default(),
        }
    }

    /// Registers `predicate` so that `status_code` is returned whenever it matches data flowing
    /// through an operation covered by `scope`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `status_code` is not part of the catalog
    pub fn add<F>(&self, predicate: F, status_code: u16, scope: MethodScope) -> Result<TriggerHandle>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        if self.catalog.lookup(status_code).is_err() {
            let valid: Vec<String> = self.catalog.codes().iter().map(u16::to_string).collect();
            return Err(Error::invalid_argument(format!(
                "error code must be one of: {}, got {}",
                valid.join(","),
                status_code
            )));
        }

        let mut guard = acquire_lock(&self.triggers, "TriggerRegistry")?;
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push(Trigger {
            id,
            predicate: Arc::new(predicate),
            status_code,
            scope,
        });
        event!(
            Level::INFO,
            "Registered error trigger {} ({} for {})",
            id,
            status_code,
            scope
        );

        Ok(TriggerHandle {
            id,
            triggers: Arc::downgrade(&self.triggers),
        })
    }

    /// Runs every trigger scoped to `method` (or to all methods) against `data`.
    ///
    /// Triggers are scanned in registration order and the LAST one that matches wins.
    /// Absent data (or JSON null) never fires a trigger.
    pub fn evaluate(&self, data: Option<&Value>, method: Method) -> Result<Option<ErrorEnvelope>> {
        let data = match data {
            None | Some(Value::Null) => return Ok(None),
            Some(data) => data,
        };

        // predicates are user code, so they run without holding the lock
        let candidates: Vec<(u64, Predicate, u16)> = {
            let guard = acquire_lock(&self.triggers, "TriggerRegistry")?;
            guard
                .entries
                .iter()
                .filter(|t| t.scope.matches(method))
                .map(|t| (t.id, t.predicate.clone(), t.status_code))
                .collect()
        };

        let mut hit = None;
        for (id, predicate, status_code) in candidates {
            if predicate(data) {
                hit = Some((id, status_code));
            }
        }

        match hit {
            Some((id, status_code)) => {
                event!(Level::DEBUG, "Error trigger {} fired ({})", id, status_code);
                Ok(Some(self.catalog.lookup(status_code)?.into()))
            }
            None => Ok(None),
        }
    }

    /// Number of registered triggers
    pub fn len(&self) -> Result<usize> {
        Ok(acquire_lock(&self.triggers, "TriggerRegistry")?.entries.len())
    }

    pub fn ids(&self) -> Result<Vec<u64>> {
        Ok(acquire_lock(&self.triggers, "TriggerRegistry")?
            .entries
            .iter()
            .map(|t| t.id)
            .collect())
    }
}
