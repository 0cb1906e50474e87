//! Fault injection: the catalog of simulated failures, the random/forced selector and the
//! user registered triggers, tied together by [`FaultInjector`].
//!
//! Every endpoint owns a [`FaultInjector`]. Cloning an injector shares its state, which is how
//! several endpoints opt into a common fault namespace (a forced error or a trigger registered
//! through one of them is observed by all of them).
use std::sync::Arc;

use serde_json::Value;
use tracing::{event, Level};

pub mod catalog;
pub mod selector;
pub mod trigger;

use catalog::FaultCatalog;
use selector::ErrorSelector;
use trigger::{Method, MethodScope, TriggerHandle, TriggerRegistry};

use crate::{error::Result, response::ErrorEnvelope};

#[derive(Debug)]
struct Inner {
    selector: ErrorSelector,
    triggers: TriggerRegistry,
}

#[derive(Clone, Debug)]
pub struct FaultInjector {
    inner: Arc<Inner>,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new(FaultCatalog::default())
    }
}

impl FaultInjector {
    pub fn new(catalog: FaultCatalog) -> Self {
        Self::from_selector(ErrorSelector::new(catalog.clone()), catalog)
    }

    /// Injector whose random draws are reproducible
    pub fn with_seed(catalog: FaultCatalog, seed: u64) -> Self {
        Self::from_selector(ErrorSelector::seeded(catalog.clone(), seed), catalog)
    }

    fn from_selector(selector: ErrorSelector, catalog: FaultCatalog) -> Self {
        Self {
            inner: Arc::new(Inner {
                selector,
                triggers: TriggerRegistry::new(catalog),
            }),
        }
    }

    pub fn catalog(&self) -> &FaultCatalog {
        self.inner.selector.catalog()
    }

    pub fn selector(&self) -> &ErrorSelector {
        &self.inner.selector
    }

    pub fn triggers(&self) -> &TriggerRegistry {
        &self.inner.triggers
    }

    /// Returns true if both injectors share the same state
    pub fn shares_state_with(&self, other: &FaultInjector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Decides whether an operation fails.
    ///
    /// Triggers are evaluated first and win even if random errors are disabled. If none fires the
    /// selector is asked for a forced or random error.
    pub fn produce_error(&self, data: Option<&Value>, method: Method) -> Result<Option<ErrorEnvelope>> {
        if let Some(envelope) = self.inner.triggers.evaluate(data, method)? {
            return Ok(Some(envelope));
        }

        let envelope = self.inner.selector.draw()?;
        if let Some(envelope) = &envelope {
            event!(
                Level::INFO,
                "Injecting error {} on {}",
                envelope.status_code,
                method
            );
        }
        Ok(envelope)
    }

    pub fn disable_random_errors(&self, disabled: Option<bool>) -> Result<bool> {
        self.inner.selector.disable_random_errors(disabled)
    }

    pub fn force_error(&self, code: Option<u16>) -> Result<()> {
        self.inner.selector.force_error(code)
    }

    pub fn add_error_trigger<F>(
        &self,
        predicate: F,
        status_code: u16,
        scope: MethodScope,
    ) -> Result<TriggerHandle>
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.inner.triggers.add(predicate, status_code, scope)
    }
}
