use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use super::domain::{BackendReply, CourseCatalog, EnrollmentOutcome, SeatRequest};
use super::history::EnrollmentHistory;
use crate::config::BackendConfig;
use crate::jobs::domain::{JobId, RemoteStatus, RemoteStatusBody};
use crate::jobs::source::{job_url, JobPollError, StatusSource};
use crate::schedule::Section;

const CALLBACK_HEADER: &str = "x-callback-url";

/// Enrollment operations offered by the backend. Each answers with its payload or a job ticket.
#[async_trait]
pub trait EnrollmentBackend: Send + Sync {
    async fn available_courses(&self) -> Result<BackendReply<CourseCatalog>, BackendError>;
    async fn available_sections(&self) -> Result<BackendReply<Vec<Section>>, BackendError>;
    async fn request_seat(
        &self,
        request: &SeatRequest,
    ) -> Result<BackendReply<EnrollmentOutcome>, BackendError>;
    async fn enrollment_history(&self) -> Result<BackendReply<EnrollmentHistory>, BackendError>;
}

#[async_trait]
impl<T> EnrollmentBackend for Arc<T>
where
    T: EnrollmentBackend + ?Sized,
{
    async fn available_courses(&self) -> Result<BackendReply<CourseCatalog>, BackendError> {
        (**self).available_courses().await
    }

    async fn available_sections(&self) -> Result<BackendReply<Vec<Section>>, BackendError> {
        (**self).available_sections().await
    }

    async fn request_seat(
        &self,
        request: &SeatRequest,
    ) -> Result<BackendReply<EnrollmentOutcome>, BackendError> {
        (**self).request_seat(request).await
    }

    async fn enrollment_history(&self) -> Result<BackendReply<EnrollmentHistory>, BackendError> {
        (**self).enrollment_history().await
    }
}

/// Authenticated HTTP client for the enrollment backend.
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    callback_base_url: String,
    token: String,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .field("callback_base_url", &self.callback_base_url)
            .finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(config: &BackendConfig, token: impl Into<String>) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            callback_base_url: config.callback_base_url.clone(),
            token: token.into(),
        })
    }

    /// Exchanges student credentials for a bearer token and returns a client carrying it.
    #[instrument(skip(config, password))]
    pub async fn login(
        config: &BackendConfig,
        registro: i64,
        password: &str,
    ) -> Result<Self, BackendError> {
        let client = Self::new(config, String::new())?;
        let url = client.url("/auth/login/estudiante-docente");
        let resp = client
            .http
            .post(&url)
            .json(&json!({ "registro": registro, "contraseña": password }))
            .send()
            .await?;

        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() || body.get("error").is_some_and(|err| !err.is_null()) {
            let message = upstream_message(&body).unwrap_or_else(|| "invalid credentials".to_string());
            warn!(status = status.as_u16(), %message, "login rejected");
            return Err(BackendError::Authentication(message));
        }

        let token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                BackendError::Authentication("login response carried no access token".to_string())
            })?;

        info!("student authenticated");
        Ok(Self {
            token: token.to_string(),
            ..client
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(CALLBACK_HEADER, &self.callback_base_url)
    }

    async fn reply<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        fallback: &str,
    ) -> Result<BackendReply<T>, BackendError> {
        let resp = self.authorized(builder).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let body: Option<Value> = serde_json::from_slice(&bytes).ok();

        if !status.is_success() {
            let message = body
                .as_ref()
                .and_then(upstream_message)
                .unwrap_or_else(|| fallback.to_string());
            return Err(BackendError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body = body.ok_or_else(|| BackendError::Decode("response body is not JSON".to_string()))?;
        let reply = BackendReply::from_value(body).map_err(|err| BackendError::Decode(err.to_string()))?;
        if let BackendReply::Queued(ticket) = &reply {
            debug!(job_id = %ticket.job_id, "backend queued the request");
        }
        Ok(reply)
    }
}

#[async_trait]
impl EnrollmentBackend for BackendClient {
    #[instrument(skip(self), level = "debug")]
    async fn available_courses(&self) -> Result<BackendReply<CourseCatalog>, BackendError> {
        let url = self.url("/estudiantes/materias-disponibles");
        self.reply(self.http.get(&url), "could not load available courses")
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn available_sections(&self) -> Result<BackendReply<Vec<Section>>, BackendError> {
        let url = self.url("/grupo-materias");
        self.reply(self.http.get(&url), "could not load sections")
            .await
    }

    #[instrument(skip(self, request), fields(sections = request.section_ids.len()))]
    async fn request_seat(
        &self,
        request: &SeatRequest,
    ) -> Result<BackendReply<EnrollmentOutcome>, BackendError> {
        let url = self.url("/inscripcions/request-seat");
        self.reply(self.http.post(&url).json(request), "could not process enrollment")
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn enrollment_history(&self) -> Result<BackendReply<EnrollmentHistory>, BackendError> {
        let url = self.url("/inscripcions/historial");
        self.reply(self.http.get(&url), "could not load enrollment history")
            .await
    }
}

#[async_trait]
impl StatusSource for BackendClient {
    #[instrument(skip(self), fields(job_id = %job_id), level = "debug")]
    async fn job_status(&self, job_id: &JobId) -> Result<RemoteStatus, JobPollError> {
        let url = job_url(&self.base_url, &["tareas", "status"], job_id)?;
        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Ok(RemoteStatus::Unavailable {
                status: status.as_u16(),
            });
        }

        let body: RemoteStatusBody = resp
            .json()
            .await
            .map_err(|err| JobPollError::Decode(err.to_string()))?;
        Ok(body.into_status())
    }
}

/// Human message from an error body: `message` as a string, or a list of strings.
fn upstream_message(body: &Value) -> Option<String> {
    match body.get("message") {
        Some(Value::String(message)) if !message.trim().is_empty() => Some(message.clone()),
        Some(Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => match body.get("error") {
            Some(Value::String(message)) if !message.trim().is_empty() => Some(message.clone()),
            _ => None,
        },
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("unexpected backend payload: {0}")]
    Decode(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
}

impl BackendError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            BackendError::Upstream { status, .. } => StatusCode::from_u16(*status).ok(),
            BackendError::Authentication(_) => Some(StatusCode::UNAUTHORIZED),
            BackendError::Transport(_) | BackendError::Decode(_) => None,
        }
    }
}
