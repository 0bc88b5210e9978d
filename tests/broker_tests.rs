//! # Broker HTTP Tests
//!
//! Drives the axum router end to end over the in-memory store, checking status codes and
//! response bodies of the Open Service Broker endpoints.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use brokernetes::broker::Broker;
use brokernetes::config::BrokerConfig;
use brokernetes::crd::{apply_outcome, OperationType};
use brokernetes::server::{router, ServerState};
use brokernetes::storage::{InstanceClient, InstanceStorage, MemoryInstanceClient};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const NAMESPACE: &str = "default";
const INSTANCE_PATH: &str = "/v2/service_instances/a";

struct TestApp {
    router: Router,
    memory: Arc<MemoryInstanceClient>,
    storage: InstanceStorage,
    server_state: Arc<ServerState>,
}

fn app() -> TestApp {
    app_with(BrokerConfig::default())
}

fn app_with(config: BrokerConfig) -> TestApp {
    let memory = Arc::new(MemoryInstanceClient::new(NAMESPACE));
    let storage = InstanceStorage::new(memory.clone(), NAMESPACE);
    let server_state = Arc::new(ServerState::default());
    let broker = Arc::new(Broker::new(storage.clone(), config).unwrap());
    TestApp {
        router: router(broker, Arc::clone(&server_state)),
        memory,
        storage,
        server_state,
    }
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    respond(router, request).await
}

/// Send `body` verbatim as JSON
async fn send_text(router: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    respond(router, request).await
}

async fn respond(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn create_body(parameters: Value) -> Value {
    json!({
        "service_id": "uuid1",
        "plan_id": "uuid2",
        "organization_guid": "org",
        "space_guid": "space",
        "parameters": parameters
    })
}

/// Finish the pending operation on `id` the way the controller would
async fn complete_operation(
    app: &TestApp,
    id: &str,
    operation: OperationType,
    error: Option<&str>,
) {
    let mut instance = app.memory.get(id).await.unwrap().unwrap();
    apply_outcome(&mut instance.status, operation, error);
    app.storage.write(&instance).await.unwrap();
}

#[tokio::test]
async fn test_catalog() {
    let app = app();
    let (status, body) = send(&app.router, "GET", "/v2/catalog", None).await;

    assert_eq!(status, StatusCode::OK);
    let service = &body["services"][0];
    assert_eq!(service["id"], "uuid1");
    assert_eq!(service["name"], "my-service");
    assert_eq!(service["bindable"], true);
    assert_eq!(service["plans"][0]["id"], "uuid2");
    assert_eq!(service["plans"][0]["name"], "default");
    assert!(service["plans"][0].get("schemas").is_none());
}

fn size_schema() -> Value {
    json!({
        "type": "object",
        "properties": {"size": {"enum": ["small", "large"]}},
        "required": ["size"]
    })
}

#[tokio::test]
async fn test_catalog_publishes_schema() {
    let app = app_with(BrokerConfig {
        parameters_schema: Some(size_schema()),
        ..Default::default()
    });
    let (_, body) = send(&app.router, "GET", "/v2/catalog", None).await;

    let schemas = &body["services"][0]["plans"][0]["schemas"]["service_instance"];
    assert_eq!(schemas["create"]["parameters"], size_schema());
    assert_eq!(schemas["update"]["parameters"], size_schema());
}

#[tokio::test]
async fn test_parameters_violating_schema_are_rejected() {
    let app = app_with(BrokerConfig {
        parameters_schema: Some(size_schema()),
        ..Default::default()
    });
    let uri = format!("{INSTANCE_PATH}?accepts_incomplete=true");

    let (status, body) =
        send(&app.router, "PUT", &uri, Some(create_body(json!({"size": "huge"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("could not validate parameters"));
    assert!(app.memory.is_empty());

    let (status, _) =
        send(&app.router, "PUT", &uri, Some(create_body(json!({"size": "small"})))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    complete_operation(&app, "a", OperationType::Create, None).await;

    let (status, _) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(json!({"service_id": "uuid1", "parameters": {"color": "red"}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_parameters_are_rejected() {
    let app = app();
    let uri = format!("{INSTANCE_PATH}?accepts_incomplete=true");
    let (status, body) = send(
        &app.router,
        "PUT",
        &uri,
        Some(json!({"service_id": "uuid1", "plan_id": "uuid2"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parameters is required");
    assert!(app.memory.is_empty());

    send(&app.router, "PUT", &uri, Some(create_body(json!({})))).await;
    complete_operation(&app, "a", OperationType::Create, None).await;
    let (status, body) =
        send(&app.router, "PATCH", &uri, Some(json!({"service_id": "uuid1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "parameters is required");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app();
    let uri = format!("{INSTANCE_PATH}?accepts_incomplete=true");

    let (status, body) = send_text(&app.router, "PUT", &uri, "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send_text(&app.router, "PATCH", &uri, r#"{"plan_id": 7}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&app.router, "PUT", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "missing JSON content type");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_bind_and_unbind() {
    let app = app();
    let binding = format!("{INSTANCE_PATH}/service_bindings/b");

    let (status, body) = send(
        &app.router,
        "PUT",
        &binding,
        Some(json!({"service_id": "uuid1", "plan_id": "uuid2", "app_guid": "app"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"credentials": {}}));

    let (status, _) = send(
        &app.router,
        "PUT",
        &binding,
        Some(json!({"service_id": "uuid1", "plan_id": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        "DELETE",
        &format!("{binding}?service_id=uuid1&plan_id=uuid2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _) = send(&app.router, "DELETE", &binding, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_accepted_then_polled() {
    let app = app();
    let (status, body) = send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(create_body(json!({"size": "small"}))),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"operation": "create"}));

    let poll = format!("{INSTANCE_PATH}/last_operation?operation=create");
    let (status, body) = send(&app.router, "GET", &poll, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "in progress");

    complete_operation(&app, "a", OperationType::Create, None).await;
    let (_, body) = send(&app.router, "GET", &poll, None).await;
    assert_eq!(body["state"], "succeeded");
}

#[tokio::test]
async fn test_failed_operation_reports_backend_error() {
    let app = app();
    send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(create_body(json!({}))),
    )
    .await;
    complete_operation(&app, "a", OperationType::Create, Some("quota exceeded")).await;

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("{INSTANCE_PATH}/last_operation?operation=create"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "failed");
    assert_eq!(body["description"], "quota exceeded");
}

#[tokio::test]
async fn test_create_without_accepts_incomplete_is_rejected() {
    let app = app();
    let (status, body) =
        send(&app.router, "PUT", INSTANCE_PATH, Some(create_body(json!({})))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "AsyncRequired");
    assert!(app.memory.is_empty());
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let app = app();
    let uri = format!("{INSTANCE_PATH}?accepts_incomplete=true");
    send(&app.router, "PUT", &uri, Some(create_body(json!({})))).await;

    let (status, _) = send(&app.router, "PUT", &uri, Some(create_body(json!({})))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_plan_is_bad_request() {
    let app = app();
    let mut body = create_body(json!({}));
    body["plan_id"] = json!("nope");

    let (status, _) = send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_during_create_is_concurrency_error() {
    let app = app();
    send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(create_body(json!({}))),
    )
    .await;

    let (status, body) = send(
        &app.router,
        "PATCH",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(json!({"service_id": "uuid1", "parameters": {"size": "large"}})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "ConcurrencyError");
}

#[tokio::test]
async fn test_update_after_create_is_accepted() {
    let app = app();
    send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(create_body(json!({"size": "small"}))),
    )
    .await;
    complete_operation(&app, "a", OperationType::Create, None).await;

    let uri = format!("{INSTANCE_PATH}?accepts_incomplete=true");
    let (status, body) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(json!({"service_id": "uuid1", "parameters": {"size": "large"}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"operation": "update"}));

    complete_operation(&app, "a", OperationType::Update, None).await;
    let (status, body) = send(
        &app.router,
        "PATCH",
        &uri,
        Some(json!({"service_id": "uuid1", "parameters": {"size": "large"}})),
    )
    .await;
    assert_eq!(
        status,
        StatusCode::OK,
        "unchanged parameters complete synchronously"
    );
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_delete_flow() {
    let app = app();
    send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(create_body(json!({}))),
    )
    .await;
    complete_operation(&app, "a", OperationType::Create, None).await;

    let (status, body) = send(
        &app.router,
        "DELETE",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true&service_id=uuid1&plan_id=uuid2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"operation": "delete"}));

    let (_, body) = send(
        &app.router,
        "GET",
        &format!("{INSTANCE_PATH}/last_operation?operation=delete"),
        None,
    )
    .await;
    assert_eq!(body["state"], "in progress");
}

#[tokio::test]
async fn test_missing_instance_is_gone() {
    let app = app();
    let (status, _) = send(
        &app.router,
        "DELETE",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true&service_id=uuid1&plan_id=uuid2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send(
        &app.router,
        "GET",
        &format!("{INSTANCE_PATH}/last_operation?operation=delete"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn test_last_operation_requires_operation() {
    let app = app();
    let (status, _) = send(
        &app.router,
        "GET",
        &format!("{INSTANCE_PATH}/last_operation"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_last_operation_rejects_foreign_ids() {
    let app = app();
    send(
        &app.router,
        "PUT",
        &format!("{INSTANCE_PATH}?accepts_incomplete=true"),
        Some(create_body(json!({}))),
    )
    .await;

    let poll = format!("{INSTANCE_PATH}/last_operation?operation=create");
    let (status, _) = send(&app.router, "GET", &format!("{poll}&service_id=other"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, "GET", &format!("{poll}&plan_id=other"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app.router,
        "GET",
        &format!("{poll}&service_id=uuid1&plan_id=uuid2"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "in progress");
}

#[tokio::test]
async fn test_probes_and_metrics() {
    let app = app();
    let (status, _) = send(&app.router, "GET", "/healthz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    app.server_state.mark_ready();
    let (status, _) = send(&app.router, "GET", "/readyz", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app.router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
}
