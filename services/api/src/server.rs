use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use enrollment::callbacks::InMemoryCallbackStore;
use enrollment::config::AppConfig;
use enrollment::enrollment::BackendError;
use enrollment::error::AppError;
use enrollment::gateway::GatewayForwarder;
use enrollment::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryCallbackStore::with_ttl(config.callbacks.ttl));
    let forwarder = GatewayForwarder::new(
        config.backend.gateway_upstream_url.clone(),
        config.backend.request_timeout,
    )
    .map_err(BackendError::from)?;

    let app = with_service_routes(store, Arc::new(forwarder))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        callback_base = %config.backend.callback_base_url,
        gateway_upstream = %config.backend.gateway_upstream_url,
        callback_ttl = ?config.callbacks.ttl,
        "enrollment orchestrator ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
