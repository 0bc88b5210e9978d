//! # HTTP Server
//!
//! axum server exposing the broker API, Prometheus metrics and health probes.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `GET /v2/catalog` | catalog |
//! | `PUT /v2/service_instances/{instance_id}` | create |
//! | `PATCH /v2/service_instances/{instance_id}` | update |
//! | `DELETE /v2/service_instances/{instance_id}` | delete |
//! | `GET /v2/service_instances/{instance_id}/last_operation` | last operation |
//! | `PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}` | bind |
//! | `DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}` | unbind |
//! | `GET /metrics` | Prometheus text format |
//! | `GET /healthz`, `GET /readyz` | liveness, readiness (watch cache synced) |

use crate::broker::{
    BindRequest, Broker, BrokerError, CreateServiceInstanceRequest, OperationResponse,
    UpdateServiceInstanceRequest,
};
use crate::observability;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Probe state shared between the server and the controller
#[derive(Debug, Default)]
pub struct ServerState {
    /// Set once the listener is bound
    pub is_listening: AtomicBool,
    /// Set once the watch cache has synced
    pub is_ready: AtomicBool,
}

impl ServerState {
    pub fn mark_ready(&self) {
        self.is_ready.store(true, Ordering::Relaxed);
    }
}

#[derive(Clone)]
struct AppState {
    broker: Arc<Broker>,
    server_state: Arc<ServerState>,
}

/// OSB v2 query parameters
#[derive(Debug, Default, Deserialize)]
struct InstanceQuery {
    #[serde(default)]
    accepts_incomplete: bool,
    service_id: Option<String>,
    plan_id: Option<String>,
    operation: Option<String>,
}

pub fn router(broker: Arc<Broker>, server_state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/v2/catalog", get(catalog))
        .route(
            "/v2/service_instances/{instance_id}",
            axum::routing::put(create_instance)
                .patch(update_instance)
                .delete(delete_instance),
        )
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(last_operation),
        )
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            axum::routing::put(bind).delete(unbind),
        )
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(AppState {
            broker,
            server_state,
        })
}

/// Serve `router` on `port` until `shutdown` resolves
pub async fn start_server<F>(
    port: u16,
    router: Router,
    server_state: Arc<ServerState>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;
    server_state.is_listening.store(true, Ordering::Relaxed);
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
}

fn operation_response(result: Result<OperationResponse, BrokerError>) -> Response {
    match result {
        Ok(response) => {
            let status = if response.is_async {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            };
            (status, Json(response)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Malformed bodies are answered in the broker error format
fn request_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, BrokerError> {
    body.map(|Json(request)| request)
        .map_err(|rejection| BrokerError::BadRequest(rejection.body_text()))
}

async fn catalog(State(state): State<AppState>) -> Response {
    Json(state.broker.catalog()).into_response()
}

async fn create_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    body: Result<Json<CreateServiceInstanceRequest>, JsonRejection>,
) -> Response {
    let request = match request_body(body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    operation_response(
        state
            .broker
            .create_service_instance(&instance_id, query.accepts_incomplete, request)
            .await,
    )
}

async fn update_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    body: Result<Json<UpdateServiceInstanceRequest>, JsonRejection>,
) -> Response {
    let request = match request_body(body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    operation_response(
        state
            .broker
            .update_service_instance(&instance_id, query.accepts_incomplete, request)
            .await,
    )
}

async fn delete_instance(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> Response {
    operation_response(
        state
            .broker
            .remove_service_instance(
                &instance_id,
                query.service_id.as_deref().unwrap_or_default(),
                query.plan_id.as_deref().unwrap_or_default(),
                query.accepts_incomplete,
            )
            .await,
    )
}

async fn last_operation(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
) -> Response {
    match state
        .broker
        .last_operation(
            &instance_id,
            query.service_id.as_deref(),
            query.plan_id.as_deref(),
            query.operation.as_deref().unwrap_or_default(),
        )
        .await
    {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn bind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    body: Result<Json<BindRequest>, JsonRejection>,
) -> Response {
    let result = request_body(body)
        .and_then(|request| state.broker.bind(&instance_id, &binding_id, &request));
    match result {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn unbind(
    State(state): State<AppState>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
) -> Response {
    match state.broker.unbind(
        &instance_id,
        &binding_id,
        query.service_id.as_deref().unwrap_or_default(),
        query.plan_id.as_deref().unwrap_or_default(),
    ) {
        Ok(()) => Json(serde_json::json!({})).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn metrics() -> Response {
    match observability::metrics::gather_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz(State(state): State<AppState>) -> Response {
    if state.server_state.is_ready.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "watch cache not synced").into_response()
    }
}
