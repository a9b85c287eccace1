use enrollment::callbacks::InMemoryCallbackStore;
use enrollment::enrollment::WorkflowError;
use enrollment::error::AppError;
use enrollment::jobs::{CallbackSource, HttpCallbackSource, LocalCallbacks};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Where a terminal session looks for pushed job results.
///
/// A CLI process receives no pushes itself, so without a callback server URL it polls an
/// empty local store and relies on the backend's status endpoint alone.
pub(crate) fn callback_source(
    server_url: Option<String>,
    timeout: Duration,
) -> Result<Arc<dyn CallbackSource>, AppError> {
    match server_url {
        Some(url) => {
            let source = HttpCallbackSource::new(url, timeout).map_err(WorkflowError::from)?;
            Ok(Arc::new(source))
        }
        None => Ok(Arc::new(LocalCallbacks::new(Arc::new(
            InMemoryCallbackStore::new(),
        )))),
    }
}
