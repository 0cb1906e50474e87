use std::sync::Arc;

use mockend::{
    config::Config,
    endpoint::{Endpoint, EndpointOptions},
    error::Error,
    fault::trigger::Method,
    http::{mock::MockHttpClient, HttpResponse},
    latency::LatencyOptions,
    namespace::{Backend, CloudRequest, Namespace},
    test_utils::fault::When,
};
use serde_json::{json, Value};

fn users() -> Value {
    json!([
        {"id": 1, "name": "ana"},
        {"id": 2, "name": "bob"}
    ])
}

async fn namespace(http_client: MockHttpClient) -> Namespace {
    Config::from_path("tests/conf/test_namespace.json")
        .await
        .expect("Unable to load config")
        .build(Some(Arc::new(http_client)))
        .expect("Unable to build namespace from config")
}

/// CRUD against an endpoint defined in the config
#[tokio::test]
async fn test_configured_endpoint_crud() {
    let namespace = namespace(MockHttpClient::builder().build()).await;
    assert_eq!(namespace.list_endpoints().unwrap(), vec!["/tasks", "/users"]);

    let tasks = namespace.endpoint("/tasks").unwrap().unwrap();
    let response = tasks.create(json!({"title": "C"})).await.unwrap();
    assert_eq!(response.status_code, 201);

    let response = tasks.get(Some(json!("3"))).await.unwrap();
    assert_eq!(response.data, json!({"id": 3, "title": "C"}));

    tasks
        .update(json!(3), json!({"id": 3, "title": "C", "done": true}))
        .await
        .unwrap();
    let response = tasks.query(json!({"title": "C"})).await.unwrap();
    assert_eq!(response.data["done"], json!(true));

    let err = tasks.create(json!({"title": "explode"})).await.err().unwrap();
    assert_eq!(err.envelope().unwrap().status_code, 500);
    assert_eq!(tasks.records().await.unwrap().len(), 3);
}

/// Remote fixtures are fetched through the http client on first use only
#[tokio::test]
async fn test_remote_fixtures_loaded_lazily() {
    let http_client = MockHttpClient::builder()
        .with_get("http://fixtures.test/users.json", HttpResponse::new(200, users()))
        .build();
    let namespace = namespace(http_client.clone()).await;
    assert_eq!(http_client.stats().get.n_calls, 0);

    let users = namespace.endpoint("/users").unwrap().unwrap();
    assert!(!users.is_ready());
    let response = users.get(Some(json!(2))).await.unwrap();
    assert_eq!(response.data["name"], json!("bob"));
    users.get_all().await.unwrap();

    assert!(users.is_ready());
    assert_eq!(http_client.stats().get.n_calls, 1);
}

/// A failing fixture server surfaces as an http error, and the next call retries
#[tokio::test]
async fn test_remote_fixtures_retry_after_failure() {
    let http_client = MockHttpClient::builder()
        .with_get_fault(When::FirstCalls(2))
        .with_get("http://fixtures.test/users.json", HttpResponse::new(200, users()))
        .build();
    let namespace = namespace(http_client.clone()).await;
    let endpoint = namespace.endpoint("/users").unwrap().unwrap();

    for _ in 0..2 {
        assert!(matches!(endpoint.get_all().await, Err(Error::Http { .. })));
    }
    let response = endpoint.get_all().await.unwrap();
    assert_eq!(response.data, users());
}

/// Requests routed by path, POST saving before reading
#[tokio::test]
async fn test_backend_call_round_trip() {
    let namespace = Arc::new(Namespace::new());
    let profile = namespace
        .add_mock_endpoint(
            "/profile",
            vec![json!({"id": 1, "name": "ana"})],
            EndpointOptions::new().with_latency(LatencyOptions::none()),
        )
        .unwrap();
    assert!(profile.disable_random_errors(None).unwrap());

    let response = namespace
        .call(CloudRequest::parse("/profile", "GET", Some(json!({}))).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status, "Ok");
    assert_eq!(response.data["name"], json!("ana"));

    let response = namespace
        .call(CloudRequest::new(
            "/profile",
            Method::Post,
            json!({"id": 1, "name": "ana maria"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.data["name"], json!("ana maria"));

    let forced = namespace.force_backend_error(401).unwrap();
    let response = forced
        .call(CloudRequest::new("/profile", Method::Get, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status, "Ok");
    assert_eq!(response.data["statusCode"], json!(401));
    assert_eq!(response.data["statusText"], json!("Not authorized"));
}
