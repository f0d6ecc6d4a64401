use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::error;

use crate::models::HealthSummary;
use crate::monitor::PositionHealthMonitor;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    running: bool,
    fallback_streak: u32,
}

#[derive(Serialize)]
struct RunningResponse {
    running: bool,
}

#[derive(Serialize)]
struct CheckResponse {
    scanned: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Admin routes over the shared monitor.
pub fn router(monitor: Arc<PositionHealthMonitor>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/monitor/summary", get(summary_handler))
        .route("/monitor/status", get(status_handler))
        .route("/monitor/start", post(start_handler))
        .route("/monitor/stop", post(stop_handler))
        .route("/monitor/check", post(check_handler))
        .with_state(monitor)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn summary_handler(
    State(monitor): State<Arc<PositionHealthMonitor>>,
) -> Result<Json<HealthSummary>, Response> {
    monitor.get_health_summary().await.map(Json).map_err(|e| {
        error!(error = %e, "Failed to build health summary");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse { error: e.to_string() }),
        )
            .into_response()
    })
}

async fn status_handler(State(monitor): State<Arc<PositionHealthMonitor>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        running: monitor.is_running(),
        fallback_streak: monitor.fallback_streak(),
    })
}

async fn start_handler(State(monitor): State<Arc<PositionHealthMonitor>>) -> Json<RunningResponse> {
    monitor.start();
    Json(RunningResponse { running: monitor.is_running() })
}

async fn stop_handler(State(monitor): State<Arc<PositionHealthMonitor>>) -> Json<RunningResponse> {
    monitor.stop();
    Json(RunningResponse { running: monitor.is_running() })
}

async fn check_handler(State(monitor): State<Arc<PositionHealthMonitor>>) -> Json<CheckResponse> {
    Json(CheckResponse {
        scanned: monitor.check_now().await,
    })
}
