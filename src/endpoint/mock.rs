//! An [`Endpoint`] serving an in-memory fixture set.
//!
//! Fixtures are either handed over at construction or fetched once from a `.json` resource through
//! an [`HttpClient`]. Operations issued before a remote load completes wait for it, and a failed
//! load leaves the endpoint uninitialized so that the next operation retries it.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{event, instrument, Level};

use super::{
    match_by_id, partially_matches, simulate, Endpoint, EndpointOptions, MakeCompareFn,
};
use crate::{
    error::{Error, Result},
    fault::{trigger::Method, FaultInjector},
    http::HttpClient,
    latency::LatencyScheduler,
    response::{created, success, ErrorEnvelope, SuccessEnvelope, GENERATED_BY},
    utils::{acquire_lock, is_truthy, next_numeric_id},
};

/// Extension a remote fixture resource must have
pub const FIXTURE_EXTENSION: &str = ".json";

/// Where the fixture set comes from
#[derive(Clone, Debug, PartialEq)]
pub enum FixtureSource {
    Inline(Vec<Value>),
    /// Path or url of a JSON document holding an array of records
    Remote(String),
}

type Fixtures = Mutex<Vec<Value>>;

pub struct MockEndpoint {
    remote: Option<(String, Arc<dyn HttpClient>)>,
    fixtures: OnceCell<Fixtures>,
    faults: FaultInjector,
    latency: LatencyScheduler,
    make_compare_fn: MakeCompareFn,
}

impl std::fmt::Debug for MockEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEndpoint")
            .field("remote", &self.remote.as_ref().map(|(path, _)| path))
            .field("ready", &self.is_ready())
            .field("faults", &self.faults)
            .field("latency", &self.latency)
            .finish()
    }
}

impl MockEndpoint {
    /// Builds a new endpoint.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if a remote source doesn't end in [`FIXTURE_EXTENSION`] or if no
    /// [`HttpClient`] was provided to load it.
    pub fn new(source: FixtureSource, options: EndpointOptions) -> Result<Self> {
        let latency = options.latency_scheduler();
        let (remote, fixtures) = match source {
            FixtureSource::Inline(records) => (None, OnceCell::new_with(Some(Mutex::new(records)))),
            FixtureSource::Remote(path) => {
                if !path.ends_with(FIXTURE_EXTENSION) {
                    return Err(Error::invalid_argument(format!(
                        "fixtures must be inline records or a {} path, got {}",
                        FIXTURE_EXTENSION, path
                    )));
                }

                let http_client = options.http_client.clone().ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "an http client is required to load fixtures from {}",
                        path
                    ))
                })?;

                (Some((path, http_client)), OnceCell::new())
            }
        };

        Ok(Self {
            remote,
            fixtures,
            faults: options.faults.unwrap_or_default(),
            latency,
            make_compare_fn: options.make_compare_fn.unwrap_or_else(match_by_id),
        })
    }

    /// False while a remote fixture set hasn't been loaded yet
    pub fn is_ready(&self) -> bool {
        self.fixtures.initialized()
    }

    /// Copy of the current fixture set, without any fault or latency
    pub async fn records(&self) -> Result<Vec<Value>> {
        let fixtures = self.fixtures().await?;
        Ok(acquire_lock(fixtures, "fixtures")?.clone())
    }

    async fn fixtures(&self) -> Result<&Fixtures> {
        self.fixtures.get_or_try_init(|| self.load()).await
    }

    #[instrument(name = "endpoint::mock::load", level = "info", skip(self))]
    async fn load(&self) -> Result<Fixtures> {
        let Some((path, http_client)) = &self.remote else {
            return Err(Error::Logic {
                reason: "Inline fixtures are never loaded".to_string(),
            });
        };

        let response = http_client.get(path).await?;
        if !response.is_success() {
            return Err(Error::Http {
                reason: format!(
                    "Unable to load fixtures from {}: status {}",
                    path, response.status
                ),
            });
        }

        match response.data {
            Value::Array(records) => {
                event!(
                    Level::INFO,
                    "Loaded {} fixtures from {}",
                    records.len(),
                    path
                );
                Ok(Mutex::new(records))
            }
            other => Err(Error::invalid_argument(format!(
                "{} must contain a JSON array of records, got {}",
                path, other
            ))),
        }
    }

    fn not_found(&self) -> Error {
        let envelope = match self.faults.catalog().lookup(404) {
            Ok(fault) => fault.into(),
            Err(_) => ErrorEnvelope {
                status_code: 404,
                status_text: "Not found".to_string(),
                body: Value::String(format!("Not found{}", GENERATED_BY)),
            },
        };
        Error::Rejected(envelope)
    }

    /// Creates `data`, assigning it an id produced by `id_generator` unless it carries a truthy one
    #[instrument(name = "endpoint::mock::create", level = "info", skip(self, id_generator))]
    pub async fn create_with<G>(&self, mut data: Value, id_generator: G) -> Result<SuccessEnvelope>
    where
        G: FnOnce(&[Value]) -> Value + Send,
    {
        if !data.is_object() {
            return Err(Error::invalid_argument(format!(
                "created records must be JSON objects, got {}",
                data
            )));
        }

        simulate(&self.faults, &self.latency, Some(&data), Method::Post).await?;

        let fixtures = self.fixtures().await?;
        let mut guard = acquire_lock(fixtures, "fixtures")?;
        if !data.get("id").map(is_truthy).unwrap_or(false) {
            data["id"] = id_generator(&guard);
        }
        event!(Level::DEBUG, "Creating record {}", data["id"]);
        guard.push(data);

        Ok(created())
    }

    /// Updates when `data` carries a truthy `id`, otherwise creates it with `id_generator`
    pub async fn save_with<G>(&self, data: Value, id_generator: G) -> Result<SuccessEnvelope>
    where
        G: FnOnce(&[Value]) -> Value + Send,
    {
        match data.get("id").filter(|id| is_truthy(id)).cloned() {
            Some(id) => self.update(id, data).await,
            None => self.create_with(data, id_generator).await,
        }
    }
}

#[async_trait]
impl Endpoint for MockEndpoint {
    fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    fn latency(&self) -> &LatencyScheduler {
        &self.latency
    }

    #[instrument(name = "endpoint::mock::get", level = "info", skip(self))]
    async fn get(&self, id: Option<Value>) -> Result<SuccessEnvelope> {
        let Some(id) = id.filter(|id| !id.is_null()) else {
            return self.get_all().await;
        };

        simulate(&self.faults, &self.latency, Some(&id), Method::Get).await?;

        let compare = (self.make_compare_fn)(&id);
        let fixtures = self.fixtures().await?;
        let guard = acquire_lock(fixtures, "fixtures")?;
        match guard.iter().find(|record| compare(record)) {
            Some(record) => Ok(success(record.clone())),
            None => Err(self.not_found()),
        }
    }

    #[instrument(name = "endpoint::mock::get_all", level = "info", skip(self))]
    async fn get_all(&self) -> Result<SuccessEnvelope> {
        simulate(&self.faults, &self.latency, None, Method::Get).await?;

        let fixtures = self.fixtures().await?;
        let guard = acquire_lock(fixtures, "fixtures")?;
        Ok(success(Value::Array(guard.clone())))
    }

    #[instrument(name = "endpoint::mock::query", level = "info", skip(self))]
    async fn query(&self, query: Value) -> Result<SuccessEnvelope> {
        let Value::Object(keys) = &query else {
            return Err(Error::invalid_argument(format!(
                "query must be a JSON object, got {}",
                query
            )));
        };

        simulate(&self.faults, &self.latency, Some(&query), Method::Get).await?;

        let fixtures = self.fixtures().await?;
        let guard = acquire_lock(fixtures, "fixtures")?;
        match guard.iter().find(|record| partially_matches(record, keys)) {
            Some(record) => Ok(success(record.clone())),
            None => Err(self.not_found()),
        }
    }

    async fn create(&self, data: Value) -> Result<SuccessEnvelope> {
        self.create_with(data, next_numeric_id).await
    }

    #[instrument(name = "endpoint::mock::update", level = "info", skip(self))]
    async fn update(&self, id: Value, data: Value) -> Result<SuccessEnvelope> {
        simulate(&self.faults, &self.latency, Some(&data), Method::Post).await?;

        let compare = (self.make_compare_fn)(&id);
        let fixtures = self.fixtures().await?;
        let mut guard = acquire_lock(fixtures, "fixtures")?;
        match guard.iter().position(|record| compare(record)) {
            Some(index) => {
                guard[index] = data;
                Ok(success(Value::Null))
            }
            None => Err(self.not_found()),
        }
    }

    async fn save(&self, data: Value) -> Result<SuccessEnvelope> {
        self.save_with(data, next_numeric_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};

    use super::{FixtureSource, MockEndpoint};
    use crate::{
        endpoint::{Endpoint, EndpointOptions},
        error::Error,
        fault::trigger::MethodScope,
        http::{mock::MockHttpClient, HttpResponse},
        latency::LatencyOptions,
        test_utils::fault::When,
        utils::{alphanumeric_id, generate_random_ascii_string},
    };

    fn endpoint(records: Vec<Value>) -> MockEndpoint {
        let endpoint = MockEndpoint::new(
            FixtureSource::Inline(records),
            EndpointOptions::new().with_latency(LatencyOptions::none()),
        )
        .unwrap();
        endpoint.disable_random_errors(Some(true)).unwrap();
        endpoint
    }

    fn tasks() -> Vec<Value> {
        vec![
            json!({"id": 1, "title": "A", "done": false}),
            json!({"id": 2, "title": "B", "done": true}),
        ]
    }

    #[tokio::test]
    async fn get_by_loosely_equal_id() {
        let endpoint = endpoint(tasks());
        let response = endpoint.get(Some(json!("2"))).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.data["title"], json!("B"));
    }

    #[tokio::test]
    async fn get_without_id_returns_everything_in_order() {
        let endpoint = endpoint(tasks());
        let response = endpoint.get(None).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.data, Value::Array(tasks()));
    }

    #[tokio::test]
    async fn get_missing_id_is_not_found() {
        let endpoint = endpoint(tasks());
        let err = endpoint.get(Some(json!(99))).await.err().unwrap();
        assert!(err.is_not_found());
        assert_eq!(err.envelope().unwrap().status_text, "Not found");
    }

    #[tokio::test]
    async fn returned_records_are_copies() {
        let endpoint = endpoint(tasks());
        let mut response = endpoint.get(Some(json!(1))).await.unwrap();
        response.data["title"] = json!("changed");

        let response = endpoint.get(Some(json!(1))).await.unwrap();
        assert_eq!(response.data["title"], json!("A"));
    }

    #[tokio::test]
    async fn query_is_a_partial_match() {
        let endpoint = endpoint(tasks());
        let response = endpoint.query(json!({"done": true})).await.unwrap();
        assert_eq!(response.data["id"], json!(2));

        let err = endpoint
            .query(json!({"done": true, "title": "A"}))
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());

        let err = endpoint.query(json!([1])).await.err().unwrap();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn create_assigns_next_id() {
        let endpoint = endpoint(vec![json!({"id": 1, "title": "A"})]);
        let response = endpoint.create(json!({"title": "B"})).await.unwrap();
        assert_eq!(response.status_code, 201);
        assert_eq!(response.status_text, "Created");

        let all = endpoint.get_all().await.unwrap();
        let records = all.data.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], json!({"id": 2, "title": "B"}));
    }

    #[tokio::test]
    async fn create_on_empty_set_starts_at_one() {
        let endpoint = endpoint(vec![]);
        endpoint.create(json!({"title": "first"})).await.unwrap();
        assert_eq!(endpoint.records().await.unwrap()[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn create_keeps_provided_id_and_custom_generator() {
        let endpoint = endpoint(vec![]);
        endpoint.create(json!({"id": 10})).await.unwrap();
        endpoint
            .create_with(json!({"title": "x"}), alphanumeric_id(8))
            .await
            .unwrap();

        let records = endpoint.records().await.unwrap();
        assert_eq!(records[0]["id"], json!(10));
        assert_eq!(records[1]["id"].as_str().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let endpoint = endpoint(tasks());
        let response = endpoint
            .update(json!(1), json!({"id": 1, "title": "A2"}))
            .await
            .unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.data.is_null());

        let records = endpoint.records().await.unwrap();
        assert_eq!(records[0], json!({"id": 1, "title": "A2"}));
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let endpoint = endpoint(tasks());
        let err = endpoint
            .update(json!(99), json!({"id": 99}))
            .await
            .err()
            .unwrap();
        assert_eq!(err.envelope().unwrap().status_code, 404);
    }

    #[tokio::test]
    async fn save_routes_on_truthy_id() {
        let endpoint = endpoint(tasks());
        let response = endpoint.save(json!({"id": 2, "title": "B2"})).await.unwrap();
        assert_eq!(response.status_code, 200);

        let response = endpoint.save(json!({"id": 0, "title": "C"})).await.unwrap();
        assert_eq!(response.status_code, 201);

        let records = endpoint.records().await.unwrap();
        assert_eq!(records[1]["title"], json!("B2"));
        assert_eq!(records[2], json!({"id": 3, "title": "C"}));
    }

    #[tokio::test]
    async fn falsy_ids_are_replaced_on_save() {
        let endpoint = endpoint(tasks());
        endpoint.save(json!({"id": 0, "title": "C"})).await.unwrap();
        endpoint.save(json!({"id": 0, "title": "D"})).await.unwrap();
        endpoint.save(json!({"id": "", "title": "E"})).await.unwrap();

        let ids: Vec<Value> = endpoint
            .records()
            .await
            .unwrap()
            .iter()
            .map(|record| record["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);

        let response = endpoint.get(Some(json!(4))).await.unwrap();
        assert_eq!(response.data["title"], json!("D"));
    }

    #[tokio::test]
    async fn trigger_beats_disabled_random_errors() {
        let endpoint = endpoint(tasks());
        let _handle = endpoint
            .add_error_trigger(Arc::new(|id: &Value| id == &json!(1)), 404, MethodScope::Get)
            .unwrap();

        let err = endpoint.get(Some(json!(1))).await.err().unwrap();
        assert_eq!(err.envelope().unwrap().status_code, 404);
        assert!(endpoint.get(Some(json!(2))).await.is_ok());
    }

    #[tokio::test]
    async fn post_trigger_inspects_payload() {
        let endpoint = endpoint(tasks());
        let handle = endpoint
            .add_error_trigger(
                Arc::new(|data: &Value| {
                    data.get("title")
                        .and_then(Value::as_str)
                        .map(|t| t.contains("bad"))
                        .unwrap_or(false)
                }),
                409,
                MethodScope::Post,
            )
            .unwrap();

        let err = endpoint.create(json!({"title": "bad"})).await.err().unwrap();
        assert_eq!(err.envelope().unwrap().status_code, 409);
        assert_eq!(endpoint.records().await.unwrap().len(), 2);

        assert!(handle.remove());
        endpoint.create(json!({"title": "bad"})).await.unwrap();
        assert_eq!(endpoint.records().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn forced_error_rejects_every_operation() {
        let endpoint = endpoint(tasks());
        endpoint.force_error(Some(500)).unwrap();

        let err = endpoint.get_all().await.err().unwrap();
        assert_eq!(err.envelope().unwrap().status_code, 500);
        let err = endpoint.create(json!({"title": "x"})).await.err().unwrap();
        assert_eq!(err.envelope().unwrap().status_code, 500);

        endpoint.force_error(None).unwrap();
        assert!(endpoint.get_all().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_applies_to_failures_too() {
        let endpoint = MockEndpoint::new(
            FixtureSource::Inline(tasks()),
            EndpointOptions::new().with_latency(LatencyOptions::absolute(800)),
        )
        .unwrap();
        endpoint.force_error(Some(503)).unwrap();

        let start = tokio::time::Instant::now();
        let err = endpoint.get(Some(json!(1))).await.err().unwrap();
        assert_eq!(err.envelope().unwrap().status_code, 503);
        assert!(start.elapsed() >= std::time::Duration::from_millis(800));

        endpoint.force_error(None).unwrap();
        endpoint.disable_random_errors(Some(true)).unwrap();
        let start = tokio::time::Instant::now();
        endpoint.get(Some(json!(1))).await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(800));
    }

    #[test]
    fn remote_source_validation() {
        let err = MockEndpoint::new(
            FixtureSource::Remote("tasks.csv".to_string()),
            EndpointOptions::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let err = MockEndpoint::new(
            FixtureSource::Remote("tasks.json".to_string()),
            EndpointOptions::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn remote_fixtures_are_loaded_once() {
        let http_client = Arc::new(
            MockHttpClient::builder()
                .with_get("/data/tasks.json", HttpResponse::new(200, Value::Array(tasks())))
                .build(),
        );
        let endpoint = Arc::new(
            MockEndpoint::new(
                FixtureSource::Remote("/data/tasks.json".to_string()),
                EndpointOptions::new()
                    .with_latency(LatencyOptions::none())
                    .with_http_client(http_client.clone()),
            )
            .unwrap(),
        );
        endpoint.disable_random_errors(Some(true)).unwrap();
        assert!(!endpoint.is_ready());

        let calls: Vec<_> = (0..8)
            .map(|i| {
                let endpoint = endpoint.clone();
                tokio::spawn(async move { endpoint.get(Some(json!(1 + i % 2))).await })
            })
            .collect();
        for call in futures::future::join_all(calls).await {
            assert_eq!(call.unwrap().unwrap().status_code, 200);
        }

        assert!(endpoint.is_ready());
        assert_eq!(http_client.stats().get.n_calls, 1);
    }

    #[tokio::test]
    async fn failed_load_is_retried() {
        let http_client = Arc::new(
            MockHttpClient::builder()
                .with_get_fault(When::FirstCalls(1))
                .with_get("tasks.json", HttpResponse::new(200, Value::Array(tasks())))
                .build(),
        );
        let endpoint = MockEndpoint::new(
            FixtureSource::Remote("tasks.json".to_string()),
            EndpointOptions::new()
                .with_latency(LatencyOptions::none())
                .with_http_client(http_client.clone()),
        )
        .unwrap();
        endpoint.disable_random_errors(Some(true)).unwrap();

        assert!(matches!(endpoint.get_all().await, Err(Error::Http { .. })));
        assert!(!endpoint.is_ready());

        let response = endpoint.get_all().await.unwrap();
        assert_eq!(response.data.as_array().unwrap().len(), 2);
        assert_eq!(http_client.stats().get.n_calls, 2);
    }

    #[tokio::test]
    async fn remote_resource_must_be_an_array() {
        let http_client = Arc::new(
            MockHttpClient::builder()
                .with_get("tasks.json", HttpResponse::new(200, json!({"id": 1})))
                .build(),
        );
        let endpoint = MockEndpoint::new(
            FixtureSource::Remote("tasks.json".to_string()),
            EndpointOptions::new()
                .with_latency(LatencyOptions::none())
                .with_http_client(http_client),
        )
        .unwrap();
        endpoint.disable_random_errors(Some(true)).unwrap();

        let err = endpoint.get_all().await.err().unwrap();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn concurrent_creates_get_unique_ids() {
        let endpoint = Arc::new(endpoint(vec![json!({"id": 1})]));
        let creates: Vec<_> = (0..20)
            .map(|i| {
                let endpoint = endpoint.clone();
                tokio::spawn(async move { endpoint.create(json!({ "n": i })).await })
            })
            .collect();
        for create in futures::future::join_all(creates).await {
            assert_eq!(create.unwrap().unwrap().status_code, 201);
        }

        let mut ids: Vec<i64> = endpoint
            .records()
            .await
            .unwrap()
            .iter()
            .map(|r| r["id"].as_i64().unwrap())
            .collect();
        ids.sort();
        assert_eq!(ids, (1..=21).collect::<Vec<_>>());
    }

    #[derive(Clone, Debug)]
    struct TestInput {
        titles_task_1: Vec<String>,
        titles_task_2: Vec<String>,
        titles_task_3: Vec<String>,
    }

    impl quickcheck::Arbitrary for TestInput {
        fn arbitrary(_: &mut quickcheck::Gen) -> Self {
            let titles = |n: usize| (0..n).map(|_| generate_random_ascii_string(12)).collect();
            Self {
                titles_task_1: titles(50),
                titles_task_2: titles(50),
                titles_task_3: titles(50),
            }
        }
    }

    async fn save_all(endpoint: Arc<MockEndpoint>, titles: Vec<String>) -> usize {
        let mut saved = 0;
        for title in titles {
            let response = endpoint.save(json!({ "title": title })).await.unwrap();
            assert_eq!(response.status_code, 201);
            saved += 1;
        }
        saved
    }

    // concurrent saves never hand out the same id twice and never lose a record
    #[quickcheck_async::tokio]
    async fn concurrent_saves_keep_every_record(input: TestInput) {
        let endpoint = Arc::new(endpoint(vec![]));
        let h1 = tokio::spawn(save_all(endpoint.clone(), input.titles_task_1.clone()));
        let h2 = tokio::spawn(save_all(endpoint.clone(), input.titles_task_2.clone()));
        let h3 = tokio::spawn(save_all(endpoint.clone(), input.titles_task_3.clone()));

        let (r1, r2, r3) = tokio::join!(h1, h2, h3);
        assert_eq!(r1.unwrap() + r2.unwrap() + r3.unwrap(), 150);

        let records = endpoint.records().await.unwrap();
        let mut ids: Vec<i64> = records.iter().map(|r| r["id"].as_i64().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 150);
    }
}
