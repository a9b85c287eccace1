use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque identifier handed out by the backend for asynchronous work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wire status of a job as pushed to the callback endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatusKind {
    /// In-flight states the backend reports under other names are folded into pending.
    #[serde(alias = "processing", alias = "queued", alias = "active", alias = "waiting")]
    Pending,
    Completed,
    Failed,
}

impl JobStatusKind {
    pub fn label(self) -> &'static str {
        match self {
            JobStatusKind::Pending => "pending",
            JobStatusKind::Completed => "completed",
            JobStatusKind::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatusKind::Pending)
    }
}

/// Validated reading of a job, decoded once at the network boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum JobUpdate {
    Pending { progress: u8 },
    Completed { result: Value },
    Failed { message: String },
}

pub const GENERIC_JOB_FAILURE: &str = "the request could not be processed";

/// Best-effort human message from an `error`/`result` field of arbitrary shape.
pub fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => match map.get("message").or_else(|| map.get("error")) {
            Some(Value::String(text)) => Some(text.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

pub(crate) fn clamp_progress(raw: Option<f64>) -> u8 {
    match raw {
        Some(value) if value.is_finite() => value.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

/// Body of `GET /tareas/status/{jobId}`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteStatusBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// What the remote status endpoint told us on one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Reported(JobUpdate),
    /// Status missing or unrecognised; handled as "not ready" but logged apart from pending.
    Indeterminate { raw: Option<String> },
    /// Non-2xx reply from the status endpoint.
    Unavailable { status: u16 },
}

impl RemoteStatusBody {
    pub fn into_status(self) -> RemoteStatus {
        let Some(raw) = self.status else {
            return RemoteStatus::Indeterminate { raw: None };
        };

        match raw.trim().to_ascii_lowercase().as_str() {
            "completed" => RemoteStatus::Reported(JobUpdate::Completed {
                result: self.result.unwrap_or(Value::Null),
            }),
            "failed" => {
                let message = self
                    .result
                    .as_ref()
                    .and_then(message_from_value)
                    .or_else(|| self.error.as_ref().and_then(message_from_value))
                    .unwrap_or_else(|| GENERIC_JOB_FAILURE.to_string());
                RemoteStatus::Reported(JobUpdate::Failed { message })
            }
            "pending" | "processing" | "queued" | "active" | "waiting" => {
                RemoteStatus::Reported(JobUpdate::Pending {
                    progress: clamp_progress(self.progress),
                })
            }
            _ => RemoteStatus::Indeterminate { raw: Some(raw) },
        }
    }
}
