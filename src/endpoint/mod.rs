//! Module that contains the simulated endpoints.
//!
//! # Design principals
//! Every operation follows the same pipeline:
//!  1. ask the [`FaultInjector`] whether the request fails (triggers first, then forced/random errors)
//!  2. suspend for the configured latency, whatever the outcome of step 1
//!  3. reject with the simulated error, or perform the read/mutation and resolve
//!
//! Two implementations of [`Endpoint`] exist: [`mock::MockEndpoint`] serves an in-memory fixture set
//! and [`live::LiveEndpoint`] proxies a real origin, merging its records with a mock record.
use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;

pub mod live;
pub mod mock;

pub use mock::FixtureSource;

use crate::{
    error::{Error, Result},
    fault::{
        trigger::{Method, MethodScope, TriggerHandle},
        FaultInjector,
    },
    http::HttpClient,
    latency::{LatencyConfig, LatencyOptions, LatencyScheduler, Timer, TokioTimer},
    response::{Priority, SuccessEnvelope},
    utils::loosely_equals,
};

/// Predicate matching a record against a requested identifier
pub type CompareFn = Box<dyn Fn(&Value) -> bool + Send + Sync>;
/// Builds a [`CompareFn`] out of the identifier given to `get`/`update`
pub type MakeCompareFn = Arc<dyn Fn(&Value) -> CompareFn + Send + Sync>;
/// Applied to outbound payloads before they are sent to a live origin
pub type Transform = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Default identifier matching: the record `id` loosely equals the requested identifier
pub fn match_by_id() -> MakeCompareFn {
    Arc::new(|id: &Value| {
        let id = id.clone();
        Box::new(move |record: &Value| {
            record
                .get("id")
                .map(|record_id| loosely_equals(record_id, &id))
                .unwrap_or(false)
        }) as CompareFn
    })
}

/// Identifier matching that accepts every record (so `get` returns the first one)
pub fn match_any() -> MakeCompareFn {
    Arc::new(|_: &Value| Box::new(|_: &Value| true) as CompareFn)
}

/// Options accepted by every endpoint constructor. Unset fields fall back to defaults.
#[derive(Clone, Default)]
pub struct EndpointOptions {
    pub latency: LatencyOptions,
    /// Merge priority for live endpoints
    pub priority: Priority,
    pub make_compare_fn: Option<MakeCompareFn>,
    /// Pass a clone of another endpoint's injector to share forced errors and triggers with it
    pub faults: Option<FaultInjector>,
    pub timer: Option<Arc<dyn Timer>>,
    pub http_client: Option<Arc<dyn HttpClient>>,
    pub transform: Option<Transform>,
}

impl Debug for EndpointOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointOptions")
            .field("latency", &self.latency)
            .field("priority", &self.priority)
            .field("custom_compare", &self.make_compare_fn.is_some())
            .field("faults", &self.faults)
            .field("timer", &self.timer)
            .field("http_client", &self.http_client)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl EndpointOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: LatencyOptions) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_compare_fn(mut self, make_compare_fn: MakeCompareFn) -> Self {
        self.make_compare_fn = Some(make_compare_fn);
        self
    }

    pub fn with_faults(mut self, faults: FaultInjector) -> Self {
        self.faults = Some(faults);
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    fn latency_scheduler(&self) -> LatencyScheduler {
        let mut config = LatencyConfig::default();
        config.merge(&self.latency);
        let timer = self.timer.clone().unwrap_or_else(|| Arc::new(TokioTimer));
        LatencyScheduler::new(config, timer)
    }
}

/// Trait that defines the operations a simulated endpoint exposes.
///
/// Every operation resolves to a [`SuccessEnvelope`] or fails with [`Error::Rejected`] carrying the
/// simulated HTTP error.
#[async_trait]
pub trait Endpoint: Debug + Send + Sync {
    fn faults(&self) -> &FaultInjector;
    fn latency(&self) -> &LatencyScheduler;

    /// Record identified by `id`. No identifier means every record, like [`Endpoint::get_all`]
    async fn get(&self, id: Option<Value>) -> Result<SuccessEnvelope>;
    async fn get_all(&self) -> Result<SuccessEnvelope>;
    /// First record for which every key of `query` is present with an equal value
    async fn query(&self, query: Value) -> Result<SuccessEnvelope>;
    async fn create(&self, data: Value) -> Result<SuccessEnvelope>;
    async fn update(&self, id: Value, data: Value) -> Result<SuccessEnvelope>;
    /// Updates when `data` carries a truthy `id`, creates otherwise
    async fn save(&self, data: Value) -> Result<SuccessEnvelope>;

    fn disable_random_errors(&self, disabled: Option<bool>) -> Result<bool> {
        self.faults().disable_random_errors(disabled)
    }

    fn force_error(&self, code: Option<u16>) -> Result<()> {
        self.faults().force_error(code)
    }

    fn add_error_trigger(
        &self,
        predicate: Arc<dyn Fn(&Value) -> bool + Send + Sync>,
        status_code: u16,
        scope: MethodScope,
    ) -> Result<TriggerHandle> {
        self.faults()
            .add_error_trigger(move |data| predicate(data), status_code, scope)
    }
}

/// Steps 1 and 2 of the pipeline. The fault is decided before the latency so that it can't be
/// influenced by anything happening during the suspension, but it is only delivered after it.
pub(crate) async fn simulate(
    faults: &FaultInjector,
    latency: &LatencyScheduler,
    data: Option<&Value>,
    method: Method,
) -> Result<()> {
    let fault = faults.produce_error(data, method)?;
    latency.delay().await?;
    match fault {
        Some(envelope) => Err(Error::Rejected(envelope)),
        None => Ok(()),
    }
}

/// True if every key of `query` is present in `record` with an equal value
pub(crate) fn partially_matches(record: &Value, query: &serde_json::Map<String, Value>) -> bool {
    query.iter().all(|(k, v)| record.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{match_any, match_by_id, partially_matches};

    #[test]
    fn default_compare_coerces_identifiers() {
        let by_id = match_by_id();
        assert!(by_id(&json!("1"))(&json!({"id": 1})));
        assert!(by_id(&json!(2))(&json!({"id": "2"})));
        assert!(!by_id(&json!(1))(&json!({"title": "no id"})));
        assert!(match_any()(&json!(42))(&json!({"id": 1})));
    }

    #[test]
    fn partial_match() {
        let record = json!({"id": 1, "title": "A", "done": false});
        let query = json!({"title": "A", "done": false});
        assert!(partially_matches(&record, query.as_object().unwrap()));

        let query = json!({"title": "A", "owner": "me"});
        assert!(!partially_matches(&record, query.as_object().unwrap()));
        assert!(partially_matches(&record, &serde_json::Map::new()));
    }
}
