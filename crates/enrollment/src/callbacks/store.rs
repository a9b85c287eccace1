use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::domain::{message_from_value, JobId, JobStatusKind, JobUpdate, GENERIC_JOB_FAILURE};

/// Push notification body posted by the backend when a job changes state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackNotification {
    pub status: JobStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl CallbackNotification {
    pub fn completed(result: Value) -> Self {
        Self {
            status: JobStatusKind::Completed,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: JobStatusKind::Failed,
            result: None,
            error: Some(Value::String(error.into())),
        }
    }

    pub fn pending() -> Self {
        Self {
            status: JobStatusKind::Pending,
            result: None,
            error: None,
        }
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().and_then(message_from_value)
    }

    /// Terminal reading of this notification, if it has one.
    ///
    /// A `completed` push without a result is not trusted yet; the poller falls through to
    /// the remote status endpoint for it.
    pub fn terminal_update(&self) -> Option<JobUpdate> {
        match (self.status, &self.result) {
            (JobStatusKind::Completed, Some(result)) if !result.is_null() => {
                Some(JobUpdate::Completed {
                    result: result.clone(),
                })
            }
            (JobStatusKind::Failed, _) => Some(JobUpdate::Failed {
                message: self
                    .error_message()
                    .unwrap_or_else(|| GENERIC_JOB_FAILURE.to_string()),
            }),
            _ => None,
        }
    }
}

/// Stored notification plus the time it reached us.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCallback {
    #[serde(flatten)]
    pub notification: CallbackNotification,
    pub received_at: DateTime<Utc>,
}

/// Storage abstraction for job results pushed by the backend.
pub trait CallbackStore: Send + Sync {
    /// Overwrites any previous entry for `job_id`.
    fn put(
        &self,
        job_id: JobId,
        notification: CallbackNotification,
    ) -> Result<StoredCallback, CallbackStoreError>;
    /// `Ok(None)` means the callback has not arrived; that is not an error.
    fn get(&self, job_id: &JobId) -> Result<Option<StoredCallback>, CallbackStoreError>;
    fn delete(&self, job_id: &JobId) -> Result<bool, CallbackStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CallbackStoreError {
    #[error("callback store unavailable: {0}")]
    Unavailable(String),
}

/// Process-wide map of job results. Entries live until deleted unless a TTL is set.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCallbackStore {
    entries: Arc<RwLock<HashMap<JobId, StoredCallback>>>,
    ttl: Option<Duration>,
}

impl InMemoryCallbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        Self {
            entries: Arc::default(),
            ttl,
        }
    }

    pub fn len(&self) -> Result<usize, CallbackStoreError> {
        let guard = self.entries.read().map_err(poisoned)?;
        Ok(guard.len())
    }

    pub fn is_empty(&self) -> Result<bool, CallbackStoreError> {
        Ok(self.len()? == 0)
    }

    pub(crate) fn put_received_at(
        &self,
        job_id: JobId,
        notification: CallbackNotification,
        received_at: DateTime<Utc>,
    ) -> Result<StoredCallback, CallbackStoreError> {
        let stored = StoredCallback {
            notification,
            received_at,
        };
        let mut guard = self.entries.write().map_err(poisoned)?;
        if self.ttl.is_some() {
            let now = Utc::now();
            guard.retain(|_, entry| !self.is_expired(entry, now));
        }
        guard.insert(job_id, stored.clone());
        Ok(stored)
    }

    fn is_expired(&self, entry: &StoredCallback, now: DateTime<Utc>) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match now.signed_duration_since(entry.received_at).to_std() {
            Ok(elapsed) => elapsed >= ttl,
            // received in the future relative to `now`; clock skew, keep it
            Err(_) => false,
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> CallbackStoreError {
    CallbackStoreError::Unavailable("callback store lock poisoned".to_string())
}

impl CallbackStore for InMemoryCallbackStore {
    fn put(
        &self,
        job_id: JobId,
        notification: CallbackNotification,
    ) -> Result<StoredCallback, CallbackStoreError> {
        self.put_received_at(job_id, notification, Utc::now())
    }

    fn get(&self, job_id: &JobId) -> Result<Option<StoredCallback>, CallbackStoreError> {
        let now = Utc::now();
        {
            let guard = self.entries.read().map_err(poisoned)?;
            match guard.get(job_id) {
                None => return Ok(None),
                Some(entry) if !self.is_expired(entry, now) => return Ok(Some(entry.clone())),
                Some(_) => {}
            }
        }

        let mut guard = self.entries.write().map_err(poisoned)?;
        guard.remove(job_id);
        Ok(None)
    }

    fn delete(&self, job_id: &JobId) -> Result<bool, CallbackStoreError> {
        let mut guard = self.entries.write().map_err(poisoned)?;
        Ok(guard.remove(job_id).is_some())
    }
}
