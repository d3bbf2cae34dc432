//! Dashboard HTTP API.
//!
//! - `GET /` and `GET /health`
//! - `GET /api/status`, `POST /api/update`, `GET /api/history`
//! - `GET /api/scheduler`, `GET /api/settings`, `PUT /api/settings/threshold`

use super::AppState;
use crate::config::{engine_snapshot, update_threshold};
use crate::service::StatusSnapshot;
use crate::store::HistoryRecord;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

const DASHBOARD_HTML: &str = include_str!("../../assets/dashboard.html");

/// History window bounds in hours (90 days max)
const MIN_HISTORY_HOURS: i64 = 1;
const MAX_HISTORY_HOURS: i64 = 2160;
const DEFAULT_HISTORY_HOURS: i64 = 24;

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Handler failures, rendered as `{"error": "..."}`
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    mock_mode: bool,
    scheduler_running: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    #[serde(flatten)]
    snapshot: StatusSnapshot,
    last_updated: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct UpdateResponse {
    status: &'static str,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    /// Window size in hours (default 24, clamped to 1..=2160)
    pub hours: Option<i64>,
    /// Restrict to one vehicle id
    pub vehicle: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    readings: Vec<HistoryRecord>,
    count: usize,
    hours: i64,
    vehicle: Option<String>,
}

#[derive(Serialize)]
struct SettingsResponse {
    charge_threshold: f64,
    minimum_charge: f64,
    update_interval_minutes: u64,
    mock_mode: bool,
}

#[derive(Deserialize)]
pub struct ThresholdParams {
    pub threshold: Option<f64>,
}

#[derive(Serialize)]
struct ThresholdResponse {
    status: &'static str,
    charge_threshold: f64,
    message: String,
}

/// Create dashboard API router
pub fn create_dashboard_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/update", post(trigger_update))
        .route("/api/history", get(get_history))
        .route("/api/scheduler", get(get_scheduler))
        .route("/api/settings", get(get_settings))
        .route("/api/settings/threshold", put(put_threshold))
        .with_state(state)
}

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        mock_mode: state.service.is_mock(),
        scheduler_running: state.scheduler.is_running(),
    })
}

/// GET /api/status - evaluate both vehicles now
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let snapshot = state.service.current_status().await.map_err(|e| {
        error!(error = %e, "Failed to get status");
        AppError::Internal(e.to_string())
    })?;

    Ok(Json(StatusResponse {
        snapshot,
        last_updated: Utc::now(),
        next_update: state.scheduler.next_run_time(),
    }))
}

/// POST /api/update - run one update cycle outside the schedule
async fn trigger_update(State(state): State<Arc<AppState>>) -> Result<Json<UpdateResponse>, AppError> {
    info!("Manual update triggered via API");

    state.scheduler.trigger_manual_update().await.map_err(|e| {
        error!(error = %e, "Manual update failed");
        AppError::Internal(e.to_string())
    })?;

    Ok(Json(UpdateResponse {
        status: "success",
        message: "Update completed".to_string(),
        timestamp: Utc::now(),
    }))
}

/// GET /api/history?hours=N&vehicle=X
async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let hours = params
        .hours
        .unwrap_or(DEFAULT_HISTORY_HOURS)
        .clamp(MIN_HISTORY_HOURS, MAX_HISTORY_HOURS);
    let vehicle = params.vehicle.filter(|v| !v.is_empty());

    let readings = state.service.history(vehicle.as_deref(), hours).map_err(|e| {
        error!(error = %e, "Failed to get history");
        AppError::Internal(format!("{:#}", e))
    })?;

    Ok(Json(HistoryResponse {
        count: readings.len(),
        readings,
        hours,
        vehicle,
    }))
}

async fn get_scheduler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.scheduler.status()).into_response()
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SettingsResponse> {
    let engine = engine_snapshot(state.service.engine_config());
    Json(SettingsResponse {
        charge_threshold: engine.charge_threshold,
        minimum_charge: engine.minimum_charge,
        update_interval_minutes: state.scheduler.status().update_interval_minutes,
        mock_mode: state.service.is_mock(),
    })
}

/// PUT /api/settings/threshold?threshold=X
async fn put_threshold(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ThresholdParams>,
) -> Result<Json<ThresholdResponse>, AppError> {
    let threshold = params
        .threshold
        .ok_or_else(|| AppError::BadRequest("threshold parameter is required".to_string()))?;

    let updated = update_threshold(state.service.engine_config(), threshold)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(ThresholdResponse {
        status: "success",
        charge_threshold: updated.charge_threshold,
        message: format!("Threshold updated to {}%", threshold),
    }))
}
