//! A set of mock endpoints addressed by path, reached through a single request entry point.
//!
//! [`Namespace`] routes a [`CloudRequest`] to the endpoint registered under its path and always
//! answers with a [`CloudResponse`], even when the endpoint rejects: the rejection envelope is then
//! carried as the response data. Paths nobody registered go to an optional fallback [`Backend`].
use std::{
    collections::BTreeMap,
    str::FromStr,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{event, instrument, Level};

use crate::{
    endpoint::{match_any, mock::MockEndpoint, Endpoint, EndpointOptions, FixtureSource},
    error::{Error, Result},
    fault::{trigger::Method, FaultInjector},
    utils::acquire_lock,
};

/// A request addressed to a [`Backend`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloudRequest {
    pub path: String,
    pub method: Method,
    pub data: Option<Value>,
}

impl CloudRequest {
    pub fn new(path: &str, method: Method, data: Value) -> Self {
        Self {
            path: path.to_string(),
            method,
            data: Some(data),
        }
    }

    /// Builds a request out of a textual method, which must be GET or POST (any case)
    pub fn parse(path: &str, method: &str, data: Option<Value>) -> Result<Self> {
        let method = Method::from_str(method).map_err(|_| {
            Error::invalid_argument(format!(
                "Unsupported method or method wasn't provided: {}",
                method
            ))
        })?;

        Ok(Self {
            path: path.to_string(),
            method,
            data,
        })
    }

    fn data(&self) -> Result<&Value> {
        self.data
            .as_ref()
            .ok_or_else(|| Error::invalid_argument(format!("no data provided for {}", self.path)))
    }
}

/// What a [`Backend`] answers. `status` is always "Ok", failures travel in `data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloudResponse {
    pub status: String,
    pub data: Value,
}

impl CloudResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            status: "Ok".to_string(),
            data,
        }
    }
}

/// Anything able to serve a [`CloudRequest`]
#[async_trait]
pub trait Backend: std::fmt::Debug + Send + Sync {
    async fn call(&self, request: CloudRequest) -> Result<CloudResponse>;
}

#[derive(Debug, Default)]
pub struct Namespace {
    endpoints: Mutex<BTreeMap<String, Arc<MockEndpoint>>>,
    fallback: Option<Arc<dyn Backend>>,
    shared_faults: Option<FaultInjector>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests for paths without an endpoint are delegated to `fallback`
    pub fn with_fallback(mut self, fallback: Arc<dyn Backend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Every endpoint added afterwards without its own injector shares `faults`
    pub fn with_shared_faults(mut self, faults: FaultInjector) -> Self {
        self.shared_faults = Some(faults);
        self
    }

    pub fn shared_faults(&self) -> Option<&FaultInjector> {
        self.shared_faults.as_ref()
    }

    /// Adds an endpoint over `fixtures` at `path`.
    ///
    /// Random errors are disabled on the new endpoint and, unless `options` says otherwise, `get`
    /// answers with the first record whatever the identifier.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if `fixtures` is empty or `path` is already taken.
    pub fn add_mock_endpoint(
        &self,
        path: &str,
        fixtures: Vec<Value>,
        mut options: EndpointOptions,
    ) -> Result<Arc<MockEndpoint>> {
        if fixtures.is_empty() {
            return Err(Error::invalid_argument(format!(
                "Expected fixtures of {} to be a non-empty array",
                path
            )));
        }

        if options.make_compare_fn.is_none() {
            options.make_compare_fn = Some(match_any());
        }
        let endpoint = Arc::new(MockEndpoint::new(
            FixtureSource::Inline(fixtures),
            self.with_namespace_faults(options),
        )?);
        endpoint.disable_random_errors(Some(true))?;

        self.add_endpoint(path, endpoint.clone())?;
        Ok(endpoint)
    }

    /// Registers an already built endpoint at `path`
    pub fn add_endpoint(&self, path: &str, endpoint: Arc<MockEndpoint>) -> Result<()> {
        let mut endpoints = acquire_lock(&self.endpoints, "Namespace")?;
        if endpoints.contains_key(path) {
            return Err(Error::invalid_argument(format!(
                "Endpoint already defined: {}",
                path
            )));
        }

        event!(Level::INFO, "Registering endpoint {}", path);
        endpoints.insert(path.to_string(), endpoint);
        Ok(())
    }

    /// Injects the shared injector into `options` unless they carry their own
    pub fn with_namespace_faults(&self, mut options: EndpointOptions) -> EndpointOptions {
        if options.faults.is_none() {
            options.faults = self.shared_faults.clone();
        }
        options
    }

    pub fn endpoint(&self, path: &str) -> Result<Option<Arc<MockEndpoint>>> {
        Ok(acquire_lock(&self.endpoints, "Namespace")?.get(path).cloned())
    }

    /// Registered paths, sorted
    pub fn list_endpoints(&self) -> Result<Vec<String>> {
        Ok(acquire_lock(&self.endpoints, "Namespace")?
            .keys()
            .cloned()
            .collect())
    }

    /// Returns a [`Backend`] forcing `code` on the addressed endpoint before every call.
    ///
    /// # Errors
    /// [`Error::UnsupportedCode`] if `code` is not part of the catalog.
    pub fn force_backend_error(self: &Arc<Self>, code: u16) -> Result<ForcedErrorBackend> {
        let catalog = self
            .shared_faults
            .as_ref()
            .map(|faults| faults.catalog().clone())
            .unwrap_or_default();
        catalog.lookup(code)?;

        Ok(ForcedErrorBackend {
            namespace: self.clone(),
            code,
        })
    }

    async fn serve(&self, endpoint: &MockEndpoint, request: CloudRequest) -> Result<CloudResponse> {
        let data = request.data()?.clone();

        if request.method == Method::Post {
            if let Err(err) = endpoint.save(data.clone()).await {
                match err {
                    Error::Rejected(envelope) => event!(
                        Level::DEBUG,
                        "Save on {} rejected with {}",
                        request.path,
                        envelope.status_code
                    ),
                    err => return Err(err),
                }
            }
        }

        let data = match endpoint.get(Some(data)).await {
            Ok(envelope) => envelope.data,
            Err(Error::Rejected(envelope)) => serde_json::to_value(&envelope)?,
            Err(err) => return Err(err),
        };
        Ok(CloudResponse::ok(data))
    }
}

#[async_trait]
impl Backend for Namespace {
    #[instrument(name = "namespace::call", level = "info", skip(self))]
    async fn call(&self, request: CloudRequest) -> Result<CloudResponse> {
        match self.endpoint(&request.path)? {
            Some(endpoint) => self.serve(&endpoint, request).await,
            None => match &self.fallback {
                Some(fallback) => {
                    event!(Level::DEBUG, "No endpoint at {}, using fallback", request.path);
                    fallback.call(request).await
                }
                None => Err(Error::invalid_argument(format!(
                    "This endpoint has not been defined: {}",
                    request.path
                ))),
            },
        }
    }
}

/// [`Backend`] decorator returned by [`Namespace::force_backend_error`].
///
/// The error is forced on the endpoint the request is addressed to and stays forced after the call.
/// Requests for paths without an endpoint are passed through untouched.
#[derive(Debug, Clone)]
pub struct ForcedErrorBackend {
    namespace: Arc<Namespace>,
    code: u16,
}

impl ForcedErrorBackend {
    pub fn code(&self) -> u16 {
        self.code
    }
}

#[async_trait]
impl Backend for ForcedErrorBackend {
    async fn call(&self, request: CloudRequest) -> Result<CloudResponse> {
        if let Some(endpoint) = self.namespace.endpoint(&request.path)? {
            request.data()?;
            endpoint.force_error(Some(self.code))?;
        }
        self.namespace.call(request).await
    }
}
