use crate::infra::{AppState, WatchServices};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use hebelwatch::error::AppError;
use hebelwatch::market::{berlin_now, MarketRegion, Underlying};
use hebelwatch::monitor::MonitorState;
use hebelwatch::signals::{Assessment, ChartFrame};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UnderlyingQuery {
    #[serde(default)]
    pub(crate) underlying: Option<String>,
    /// Include the volatility column in the chart axis range.
    #[serde(default)]
    pub(crate) volatility: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SelectUnderlyingRequest {
    pub(crate) underlying: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IntervalRequest {
    pub(crate) seconds: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SoundRequest {
    pub(crate) enabled: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct UnderlyingView {
    pub(crate) label: &'static str,
    pub(crate) ticker: &'static str,
    pub(crate) volatility_index: &'static str,
    pub(crate) region: MarketRegion,
    pub(crate) hours: String,
}

pub(crate) fn with_watch_routes(services: WatchServices) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/underlyings", get(underlyings_endpoint))
        .route("/api/v1/assessment", get(assessment_endpoint))
        .route("/api/v1/history", get(history_endpoint))
        .route("/api/v1/monitor", get(monitor_state_endpoint))
        .route("/api/v1/monitor/underlying", put(select_underlying_endpoint))
        .route("/api/v1/monitor/interval", put(interval_endpoint))
        .route("/api/v1/monitor/sound", put(sound_endpoint))
        .route("/api/v1/monitor/reset", post(reset_endpoint))
        .with_state(services)
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

pub(crate) async fn underlyings_endpoint() -> Json<Vec<UnderlyingView>> {
    Json(
        Underlying::ALL
            .iter()
            .map(|underlying| UnderlyingView {
                label: underlying.label(),
                ticker: underlying.ticker(),
                volatility_index: underlying.volatility_index().label,
                region: underlying.region(),
                hours: underlying.region().hours_label(),
            })
            .collect(),
    )
}

async fn resolve_underlying(services: &WatchServices, raw: Option<&str>) -> Result<Underlying, AppError> {
    match raw {
        Some(raw) => Underlying::parse(raw).ok_or_else(|| AppError::UnknownUnderlying(raw.to_string())),
        None => Ok(services.monitor.snapshot().await.underlying),
    }
}

pub(crate) async fn assessment_endpoint(
    State(services): State<WatchServices>,
    Query(query): Query<UnderlyingQuery>,
) -> Result<Json<Assessment>, AppError> {
    let underlying = resolve_underlying(&services, query.underlying.as_deref()).await?;
    let state = services.monitor.snapshot().await;
    let last_fetch = (state.underlying == underlying)
        .then_some(state.last_fetch)
        .flatten();

    let assessment = services
        .dashboard
        .assess(underlying, berlin_now(), last_fetch, state.sound_enabled)
        .await?;
    Ok(Json(assessment))
}

pub(crate) async fn history_endpoint(
    State(services): State<WatchServices>,
    Query(query): Query<UnderlyingQuery>,
) -> Result<Response, AppError> {
    let underlying = resolve_underlying(&services, query.underlying.as_deref()).await?;
    let history = services.dashboard.history(underlying)?;
    let frame = ChartFrame::new(underlying, &history, query.volatility);
    Ok(Json(frame).into_response())
}

pub(crate) async fn monitor_state_endpoint(State(services): State<WatchServices>) -> Json<MonitorState> {
    Json(services.monitor.snapshot().await)
}

pub(crate) async fn select_underlying_endpoint(
    State(services): State<WatchServices>,
    Json(request): Json<SelectUnderlyingRequest>,
) -> Result<Json<MonitorState>, AppError> {
    let underlying = Underlying::parse(&request.underlying)
        .ok_or_else(|| AppError::UnknownUnderlying(request.underlying.clone()))?;
    services.monitor.select_underlying(underlying).await;
    Ok(Json(services.monitor.snapshot().await))
}

pub(crate) async fn interval_endpoint(
    State(services): State<WatchServices>,
    Json(request): Json<IntervalRequest>,
) -> Result<Json<MonitorState>, AppError> {
    services.monitor.set_refresh_secs(request.seconds).await?;
    Ok(Json(services.monitor.snapshot().await))
}

pub(crate) async fn sound_endpoint(
    State(services): State<WatchServices>,
    Json(request): Json<SoundRequest>,
) -> Json<MonitorState> {
    services.monitor.set_sound(request.enabled).await;
    Json(services.monitor.snapshot().await)
}

pub(crate) async fn reset_endpoint(
    State(services): State<WatchServices>,
) -> Result<Json<serde_json::Value>, AppError> {
    services.monitor.reset().await?;
    services.dashboard.reset().await;
    Ok(Json(json!({ "status": "reset" })))
}
