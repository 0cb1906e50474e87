//! Mock implementation for [`HttpClient`]
//!
//! Serves canned responses per url, records every call and can be told to fail through [`Fault`]s.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;

use super::{HttpClient, HttpResponse};
use crate::{
    error::{Error, Result},
    test_utils::fault::{Fault, When},
    utils::acquire_lock,
};

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub n_calls: usize,
}

#[derive(Debug, Default, Clone)]
pub struct MockHttpClientStats {
    pub get: Stats,
    pub post: Stats,
    /// Bodies received by `post`, in order, keyed by url
    pub posted: Vec<(String, Value)>,
}

#[derive(Debug, Clone, Default)]
pub struct MockHttpClientFaults {
    pub get: Fault,
    pub post: Fault,
}

#[derive(Debug, Default)]
struct Routes {
    get: HashMap<String, HttpResponse>,
    post: HashMap<String, HttpResponse>,
}

#[derive(Debug, Clone)]
pub struct MockHttpClient {
    faults: MockHttpClientFaults,
    routes: Arc<Mutex<Routes>>,
    stats: Arc<Mutex<MockHttpClientStats>>,
}

impl MockHttpClient {
    pub fn builder() -> MockHttpClientBuilder {
        MockHttpClientBuilder::default()
    }

    pub fn stats(&self) -> MockHttpClientStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Replaces (or adds) the canned response for `GET url`
    pub fn set_get(&self, url: &str, response: HttpResponse) -> Result<()> {
        acquire_lock(&self.routes, "MockHttpClient")?
            .get
            .insert(url.to_string(), response);
        Ok(())
    }
}

fn not_found() -> HttpResponse {
    HttpResponse::new(404, Value::String("Not found".to_string()))
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let n_call = {
            let mut stats = acquire_lock(&self.stats, "MockHttpClient")?;
            stats.get.n_calls += 1;
            stats.get.n_calls
        };

        if self.faults.get.fires(n_call) {
            return Err(Error::Http {
                reason: format!("Mocked error on GET {}", url),
            });
        }

        // yield so that concurrent callers really interleave with the request
        tokio::task::yield_now().await;

        let routes = acquire_lock(&self.routes, "MockHttpClient")?;
        Ok(routes.get.get(url).cloned().unwrap_or_else(not_found))
    }

    async fn post(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        let n_call = {
            let mut stats = acquire_lock(&self.stats, "MockHttpClient")?;
            stats.post.n_calls += 1;
            stats.posted.push((url.to_string(), body.clone()));
            stats.post.n_calls
        };

        if self.faults.post.fires(n_call) {
            return Err(Error::Http {
                reason: format!("Mocked error on POST {}", url),
            });
        }

        let routes = acquire_lock(&self.routes, "MockHttpClient")?;
        Ok(routes.post.get(url).cloned().unwrap_or_else(not_found))
    }
}

#[derive(Debug, Default)]
pub struct MockHttpClientBuilder {
    faults: MockHttpClientFaults,
    routes: Routes,
}

impl MockHttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_get(mut self, url: &str, response: HttpResponse) -> Self {
        self.routes.get.insert(url.to_string(), response);
        self
    }

    pub fn with_post(mut self, url: &str, response: HttpResponse) -> Self {
        self.routes.post.insert(url.to_string(), response);
        self
    }

    pub fn with_get_fault(mut self, when: When) -> Self {
        self.faults.get = Fault::new(when);
        self
    }

    pub fn with_post_fault(mut self, when: When) -> Self {
        self.faults.post = Fault::new(when);
        self
    }

    pub fn build(self) -> MockHttpClient {
        MockHttpClient {
            faults: self.faults,
            routes: Arc::new(Mutex::new(self.routes)),
            stats: Default::default(),
        }
    }
}
