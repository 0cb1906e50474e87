//! JSON configuration describing a [`Namespace`] of mock endpoints.
//!
//! ```json
//! {
//!   "seed": 42,
//!   "shared_faults": false,
//!   "endpoints": [
//!     {
//!       "path": "/tasks",
//!       "fixtures": { "inline": [{ "id": 1, "title": "A" }] },
//!       "min_time": 100,
//!       "max_time": 600,
//!       "triggers": [{ "equals": 1, "code": 404, "method": "get" }]
//!     }
//!   ]
//! }
//! ```
use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{event, Level};

use crate::{
    endpoint::{mock::MockEndpoint, Endpoint, EndpointOptions, FixtureSource},
    error::Result,
    fault::{catalog::FaultCatalog, trigger::MethodScope, FaultInjector},
    http::HttpClient,
    latency::LatencyOptions,
    namespace::Namespace,
    utils::loosely_equals,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Makes random error draws reproducible
    #[serde(default)]
    pub seed: Option<u64>,
    /// All endpoints share one fault injector (forced errors and triggers)
    #[serde(default)]
    pub shared_faults: bool,
    pub endpoints: Vec<EndpointConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EndpointConfig {
    pub path: String,
    pub fixtures: FixturesConfig,
    #[serde(flatten, default)]
    pub latency: LatencyOptions,
    #[serde(default)]
    pub disable_random_errors: bool,
    #[serde(default)]
    pub force_error: Option<Value>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixturesConfig {
    Inline(Vec<Value>),
    Remote(String),
}

impl From<FixturesConfig> for FixtureSource {
    fn from(fixtures: FixturesConfig) -> Self {
        match fixtures {
            FixturesConfig::Inline(records) => FixtureSource::Inline(records),
            FixturesConfig::Remote(path) => FixtureSource::Remote(path),
        }
    }
}

/// Declarative trigger: fires `code` when `data[key]` (or the data itself without a `key`)
/// loosely equals `equals`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriggerConfig {
    #[serde(default)]
    pub key: Option<String>,
    pub equals: Value,
    pub code: Value,
    #[serde(default)]
    pub method: Option<String>,
}

impl TriggerConfig {
    fn predicate(&self) -> impl Fn(&Value) -> bool + Send + Sync + 'static {
        let key = self.key.clone();
        let equals = self.equals.clone();
        move |data: &Value| {
            let candidate = match &key {
                Some(key) => data.get(key.as_str()),
                None => Some(data),
            };
            candidate
                .map(|candidate| loosely_equals(candidate, &equals))
                .unwrap_or(false)
        }
    }
}

impl Config {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let c = tokio::fs::read_to_string(path).await?;
        Self::from_json(&c)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn injector(&self, offset: u64) -> FaultInjector {
        match self.seed {
            Some(seed) => FaultInjector::with_seed(FaultCatalog::default(), seed.wrapping_add(offset)),
            None => FaultInjector::default(),
        }
    }

    /// Builds every configured endpoint.
    ///
    /// `http_client` is only needed by endpoints with remote fixtures.
    ///
    /// # Errors
    /// Any error the endpoint constructors, [`Endpoint::force_error`] or trigger registration
    /// return, as well as [`crate::error::Error::InvalidArgument`] for duplicated paths.
    pub fn build(&self, http_client: Option<Arc<dyn HttpClient>>) -> Result<Namespace> {
        let mut namespace = Namespace::new();
        if self.shared_faults {
            namespace = namespace.with_shared_faults(self.injector(0));
        }

        for (i, config) in self.endpoints.iter().enumerate() {
            let mut options = EndpointOptions::new().with_latency(config.latency);
            if let Some(http_client) = &http_client {
                options = options.with_http_client(http_client.clone());
            }
            if !self.shared_faults {
                options = options.with_faults(self.injector(i as u64));
            }
            let options = namespace.with_namespace_faults(options);

            let endpoint = MockEndpoint::new(config.fixtures.clone().into(), options)?;
            if config.disable_random_errors {
                endpoint.disable_random_errors(Some(true))?;
            }

            if let Some(code) = &config.force_error {
                let code = endpoint.faults().catalog().lookup_json(code)?.status_code;
                endpoint.force_error(Some(code))?;
            }

            for trigger in &config.triggers {
                let code = endpoint.faults().catalog().lookup_json(&trigger.code)?.status_code;
                let scope = trigger
                    .method
                    .as_deref()
                    .map(MethodScope::parse)
                    .transpose()?
                    .unwrap_or_default();
                let handle = endpoint
                    .faults()
                    .add_error_trigger(trigger.predicate(), code, scope)?;
                event!(
                    Level::DEBUG,
                    "Trigger {} registered on {} ({} on {})",
                    handle.id(),
                    config.path,
                    code,
                    scope
                );
            }

            namespace.add_endpoint(&config.path, Arc::new(endpoint))?;
        }

        Ok(namespace)
    }
}
