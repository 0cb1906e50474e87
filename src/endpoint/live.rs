//! An [`Endpoint`] wrapping a real origin.
//!
//! Requests go through the same fault and latency pipeline as [`super::mock::MockEndpoint`] before
//! reaching the origin. Every record read from the origin is deep merged with a mock record, which
//! fills in (or, with [`Priority::Fixture`], overrides) what the origin returns.
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{event, instrument, Level};

use super::{partially_matches, simulate, Endpoint, EndpointOptions, Transform};
use crate::{
    error::{Error, Result},
    fault::{trigger::Method, FaultInjector},
    http::{HttpClient, HttpResponse},
    latency::LatencyScheduler,
    response::{merge_fixture, ErrorEnvelope, Priority, SuccessEnvelope},
    utils::is_truthy,
};

pub struct LiveEndpoint {
    base_url: String,
    mock: Value,
    priority: Priority,
    transform: Option<Transform>,
    http_client: Arc<dyn HttpClient>,
    faults: FaultInjector,
    latency: LatencyScheduler,
}

impl std::fmt::Debug for LiveEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveEndpoint")
            .field("base_url", &self.base_url)
            .field("mock", &self.mock)
            .field("priority", &self.priority)
            .field("faults", &self.faults)
            .field("latency", &self.latency)
            .finish()
    }
}

fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
        .to_string()
}

fn id_segment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl LiveEndpoint {
    /// Builds a new wrapper around `base_url`.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `base_url` is empty, if `mock` isn't a JSON object or if no
    /// [`HttpClient`] was given in `options`.
    pub fn new(base_url: &str, mock: Value, options: EndpointOptions) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::invalid_argument("wrapper must be provided with a base url"));
        }

        match &mock {
            Value::Object(_) => {}
            Value::Array(_) => {
                return Err(Error::invalid_argument(
                    "mock data must be an object, not an array",
                ))
            }
            other => {
                return Err(Error::invalid_argument(format!(
                    "mock data must be an object, got {}",
                    other
                )))
            }
        }

        let http_client = options.http_client.clone().ok_or_else(|| {
            Error::invalid_argument(format!("an http client is required to reach {}", base_url))
        })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            mock,
            priority: options.priority,
            latency: options.latency_scheduler(),
            transform: options.transform,
            http_client,
            faults: options.faults.unwrap_or_default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, id: &Value) -> String {
        format!("{}/{}", self.base_url, id_segment(id))
    }

    fn merge(&self, record: &Value) -> Value {
        merge_fixture(record, &self.mock, self.priority)
    }

    fn outbound(&self, data: Value) -> Value {
        match &self.transform {
            Some(transform) => transform(data),
            None => data,
        }
    }

    /// Turns an origin response into an envelope, rejecting error statuses
    fn settle(response: HttpResponse, data: Value) -> Result<SuccessEnvelope> {
        if response.status == 0 || response.status >= 400 {
            event!(
                Level::WARN,
                "Origin answered with status {}",
                response.status
            );
            return Err(Error::Rejected(ErrorEnvelope {
                status_code: response.status,
                status_text: status_text(response.status),
                body: response.data,
            }));
        }

        Ok(SuccessEnvelope {
            status_code: response.status,
            status_text: status_text(response.status),
            data,
        })
    }

    async fn fetch_all(&self) -> Result<Vec<Value>> {
        let response = self.http_client.get(&self.base_url).await?;
        let data = match &response.data {
            Value::Array(records) => records.iter().map(|r| self.merge(r)).collect(),
            _ if !response.is_success() => Vec::new(),
            other => {
                return Err(Error::Http {
                    reason: format!(
                        "{} was expected to return an array of records, got {}",
                        self.base_url, other
                    ),
                })
            }
        };
        Self::settle(response, Value::Null)?;
        Ok(data)
    }
}

#[async_trait]
impl Endpoint for LiveEndpoint {
    fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn latency(&self) -> &LatencyScheduler {
        &self.latency
    }

    #[instrument(name = "endpoint::live::get", level = "info", skip(self))]
    async fn get(&self, id: Option<Value>) -> Result<SuccessEnvelope> {
        let Some(id) = id.filter(|id| !id.is_null()) else {
            return self.get_all().await;
        };

        simulate(&self.faults, &self.latency, Some(&id), Method::Get).await?;

        let response = self.http_client.get(&self.url_for(&id)).await?;
        let data = self.merge(&response.data);
        Self::settle(response, data)
    }

    #[instrument(name = "endpoint::live::get_all", level = "info", skip(self))]
    async fn get_all(&self) -> Result<SuccessEnvelope> {
        simulate(&self.faults, &self.latency, None, Method::Get).await?;

        let records = self.fetch_all().await?;
        Ok(SuccessEnvelope {
            status_code: 200,
            status_text: status_text(200),
            data: Value::Array(records),
        })
    }

    /// Merged origin records matching every key of `query`
    #[instrument(name = "endpoint::live::query", level = "info", skip(self))]
    async fn query(&self, query: Value) -> Result<SuccessEnvelope> {
        let Value::Object(keys) = &query else {
            return Err(Error::invalid_argument(format!(
                "query must be a JSON object, got {}",
                query
            )));
        };

        simulate(&self.faults, &self.latency, Some(&query), Method::Get).await?;

        let records = self
            .fetch_all()
            .await?
            .into_iter()
            .filter(|record| partially_matches(record, keys))
            .collect();
        Ok(SuccessEnvelope {
            status_code: 200,
            status_text: status_text(200),
            data: Value::Array(records),
        })
    }

    #[instrument(name = "endpoint::live::create", level = "info", skip(self))]
    async fn create(&self, data: Value) -> Result<SuccessEnvelope> {
        let data = self.outbound(data);
        simulate(&self.faults, &self.latency, Some(&data), Method::Post).await?;

        let response = self.http_client.post(&self.base_url, &data).await?;
        let location = response
            .header("location")
            .and_then(|location| location.rsplit('/').next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        match location {
            Some(id) if response.is_success() => {
                event!(Level::DEBUG, "Origin created {}, reading it back", id);
                self.get(Some(Value::String(id))).await
            }
            _ => {
                let data = response.data.clone();
                Self::settle(response, data)
            }
        }
    }

    #[instrument(name = "endpoint::live::update", level = "info", skip(self))]
    async fn update(&self, id: Value, data: Value) -> Result<SuccessEnvelope> {
        let data = self.outbound(data);
        simulate(&self.faults, &self.latency, Some(&data), Method::Post).await?;

        let response = self.http_client.post(&self.url_for(&id), &data).await?;
        let data = response.data.clone();
        Self::settle(response, data)
    }

    async fn save(&self, data: Value) -> Result<SuccessEnvelope> {
        match data.get("id").filter(|id| is_truthy(id)).cloned() {
            Some(id) => self.update(id, data).await,
            None => self.create(data).await,
        }
    }
}
