use crate::cli::ServeArgs;
use crate::infra::{AppState, WatchServices};
use crate::routes::with_watch_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hebelwatch::config::AppConfig;
use hebelwatch::error::AppError;
use hebelwatch::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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

    let services = WatchServices::from_config(&config.monitor)?;
    let poller = services.monitor.spawn()?;
    let monitor = services.monitor.clone();

    let app = with_watch_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        underlying = %config.monitor.underlying,
        refresh_secs = config.monitor.refresh_secs,
        "hebelwatch ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    monitor.stop();
    if let Err(err) = poller.await {
        warn!(error = %err, "monitor task ended abnormally");
    }
    info!("hebelwatch stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}
