use crate::config::ConfigError;
use crate::enrollment::{BackendError, WorkflowError};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Backend(BackendError),
    Workflow(WorkflowError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Backend(err) => write!(f, "backend error: {}", err),
            AppError::Workflow(err) => write!(f, "enrollment error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Backend(err) => Some(err),
            AppError::Workflow(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Workflow(WorkflowError::Validation(_))
            | AppError::Workflow(WorkflowError::ScheduleConflict { .. }) => StatusCode::BAD_REQUEST,
            AppError::Workflow(WorkflowError::JobTimedOut { .. }) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Backend(BackendError::Authentication(_))
            | AppError::Workflow(WorkflowError::Backend(BackendError::Authentication(_))) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Backend(_) | AppError::Workflow(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<BackendError> for AppError {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

impl From<WorkflowError> for AppError {
    fn from(value: WorkflowError) -> Self {
        Self::Workflow(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SectionId;

    #[test]
    fn conflicts_map_to_bad_request_with_readable_message() {
        let err = AppError::from(WorkflowError::ScheduleConflict {
            sections: vec![SectionId(3), SectionId(8)],
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "enrollment error: selected sections overlap in schedule: 3, 8"
        );
    }

    #[test]
    fn authentication_failures_are_unauthorized() {
        let err = AppError::from(BackendError::Authentication("bad password".to_string()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        let timed_out = AppError::from(WorkflowError::JobTimedOut { attempts: 30 });
        assert_eq!(timed_out.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
