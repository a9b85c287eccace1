use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, instrument};

use super::domain::{JobId, RemoteStatus};
use crate::callbacks::{CallbackNotification, CallbackStore};

/// First tier of status resolution: results pushed to our callback endpoint.
#[async_trait]
pub trait CallbackSource: Send + Sync {
    /// `Ok(None)` means nothing has arrived for this job yet.
    async fn lookup(&self, job_id: &JobId) -> Result<Option<CallbackNotification>, JobPollError>;
}

/// Second tier: the backend's own job-status endpoint.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn job_status(&self, job_id: &JobId) -> Result<RemoteStatus, JobPollError>;
}

#[async_trait]
impl<T> CallbackSource for Arc<T>
where
    T: CallbackSource + ?Sized,
{
    async fn lookup(&self, job_id: &JobId) -> Result<Option<CallbackNotification>, JobPollError> {
        (**self).lookup(job_id).await
    }
}

#[async_trait]
impl<T> StatusSource for Arc<T>
where
    T: StatusSource + ?Sized,
{
    async fn job_status(&self, job_id: &JobId) -> Result<RemoteStatus, JobPollError> {
        (**self).job_status(job_id).await
    }
}

/// Reads the callback store living in this process.
#[derive(Debug)]
pub struct LocalCallbacks<S> {
    store: Arc<S>,
}

impl<S> LocalCallbacks<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

impl<S> Clone for LocalCallbacks<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

#[async_trait]
impl<S> CallbackSource for LocalCallbacks<S>
where
    S: CallbackStore + 'static,
{
    async fn lookup(&self, job_id: &JobId) -> Result<Option<CallbackNotification>, JobPollError> {
        let stored = self
            .store
            .get(job_id)
            .map_err(|err| JobPollError::Callback(err.to_string()))?;
        Ok(stored.map(|entry| entry.notification))
    }
}

/// Reads callbacks held by a server in another process via `GET {base}/{jobId}`.
#[derive(Clone)]
pub struct HttpCallbackSource {
    http: Client,
    base_url: String,
}

impl HttpCallbackSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, JobPollError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CallbackSource for HttpCallbackSource {
    #[instrument(skip(self), fields(job_id = %job_id), level = "debug")]
    async fn lookup(&self, job_id: &JobId) -> Result<Option<CallbackNotification>, JobPollError> {
        let url = job_url(&self.base_url, &[], job_id)?;
        let resp = self.http.get(url).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            debug!(status = resp.status().as_u16(), "callback lookup not available");
            return Ok(None);
        }

        let notification = resp
            .json::<CallbackNotification>()
            .await
            .map_err(|err| JobPollError::Decode(err.to_string()))?;
        Ok(Some(notification))
    }
}

/// `{base}/{segments..}/{job_id}`, with the job id escaped as a single path segment.
pub(crate) fn job_url(base: &str, segments: &[&str], job_id: &JobId) -> Result<Url, JobPollError> {
    let mut url =
        Url::parse(base).map_err(|err| JobPollError::InvalidUrl(format!("{base}: {err}")))?;
    url.path_segments_mut()
        .map_err(|()| JobPollError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments)
        .push(job_id.as_str());
    Ok(url)
}

/// Failures that end a polling sequence immediately; ticks are never retried on these.
#[derive(Debug, thiserror::Error)]
pub enum JobPollError {
    #[error("job status request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unreadable job status payload: {0}")]
    Decode(String),
    #[error("callback lookup failed: {0}")]
    Callback(String),
    #[error("cannot build job url from '{0}'")]
    InvalidUrl(String),
}
