use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use enrollment::callbacks::{callback_router, CallbackStore};
use enrollment::gateway::{gateway_router, GatewayForwarder};
use serde_json::json;
use std::sync::Arc;

/// Callback endpoints under `/api`, the gateway relay, and the service probes.
pub(crate) fn with_service_routes<S>(store: Arc<S>, forwarder: Arc<GatewayForwarder>) -> Router
where
    S: CallbackStore + 'static,
{
    Router::new()
        .nest("/api", callback_router(store))
        .merge(gateway_router(forwarder))
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
