use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info, warn};

use super::store::{CallbackNotification, CallbackStore, CallbackStoreError};
use crate::jobs::domain::JobId;

/// Inbound notification endpoint plus the lookup/delete interface used by pollers.
///
/// Paths are relative; the server nests this router under `/api`.
pub fn callback_router<S>(store: Arc<S>) -> Router
where
    S: CallbackStore + 'static,
{
    Router::new()
        .route(
            "/callbacks/{job_id}",
            post(receive_handler::<S>)
                .get(lookup_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .with_state(store)
}

pub(crate) async fn receive_handler<S>(
    State(store): State<Arc<S>>,
    Path(job_id): Path<String>,
    payload: Result<Json<CallbackNotification>, JsonRejection>,
) -> Response
where
    S: CallbackStore + 'static,
{
    let notification = match payload {
        Ok(Json(notification)) => notification,
        Err(rejection) => {
            warn!(%job_id, error = %rejection.body_text(), "rejected malformed callback");
            let payload = json!({
                "error": "invalid callback payload",
                "details": rejection.body_text(),
            });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    let status = notification.status;
    let has_result = notification.result.is_some();
    let failure = notification.error_message();

    match store.put(JobId(job_id.clone()), notification) {
        Ok(_) => {
            info!(%job_id, status = status.label(), has_result, "callback received");
            if let Some(message) = failure {
                error!(%job_id, %message, "job reported failure");
            }
            let payload = json!({
                "message": "callback received",
                "jobId": job_id,
                "status": status,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn lookup_handler<S>(
    State(store): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Response
where
    S: CallbackStore + 'static,
{
    match store.get(&JobId(job_id.clone())) {
        Ok(Some(stored)) => (StatusCode::OK, Json(stored)).into_response(),
        Ok(None) => {
            let payload = json!({
                "error": "job not found in callbacks",
                "jobId": job_id,
                "message": "the callback has not arrived yet or the job id is invalid",
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(err) => store_failure(err),
    }
}

pub(crate) async fn delete_handler<S>(
    State(store): State<Arc<S>>,
    Path(job_id): Path<String>,
) -> Response
where
    S: CallbackStore + 'static,
{
    match store.delete(&JobId(job_id.clone())) {
        Ok(existed) => {
            let message = if existed {
                "callback deleted"
            } else {
                "callback not found"
            };
            let payload = json!({ "message": message, "jobId": job_id });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => store_failure(err),
    }
}

fn store_failure(err: CallbackStoreError) -> Response {
    error!(error = %err, "callback store failure");
    let payload = json!({ "error": err.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
