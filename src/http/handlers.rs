use super::state::AppState;
use crate::session::{SessionState, SessionStats};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Interval as typed by an operator (`"30"`) or sent as a number (`30`)
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum IntervalValue {
    Seconds(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct SetIntervalRequest {
    /// New flush interval in seconds
    pub interval: IntervalValue,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: Option<Uuid>,
    pub status: SessionState,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub status: SessionState,
    pub message: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct SetIntervalResponse {
    pub interval_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /record/start
/// Start a new recording session
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    if !state.controller.start().await {
        return error_response(StatusCode::CONFLICT, "Already recording".to_string());
    }

    let stats = state.controller.stats();
    info!("Recording started via HTTP: {:?}", stats.session_id);

    (
        StatusCode::OK,
        Json(StartRecordingResponse {
            session_id: stats.session_id,
            status: stats.state,
            message: stats.status,
        }),
    )
        .into_response()
}

/// POST /record/stop
/// Stop the current session; responds once the final record is written
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    if !state.controller.stop().await {
        return error_response(StatusCode::CONFLICT, "Recording not active".to_string());
    }

    let stats = state.controller.stats();
    info!(
        "Recording stopped via HTTP: {} records, {} readings",
        stats.records_written, stats.readings_persisted
    );

    (
        StatusCode::OK,
        Json(StopRecordingResponse {
            status: stats.state,
            message: stats.status.clone(),
            stats,
        }),
    )
        .into_response()
}

/// PUT /record/interval
/// Change the flush interval; invalid values leave it unchanged
pub async fn set_interval(
    State(state): State<AppState>,
    Json(req): Json<SetIntervalRequest>,
) -> impl IntoResponse {
    let result = match &req.interval {
        IntervalValue::Seconds(secs) => state.controller.set_interval_secs(*secs),
        IntervalValue::Text(text) => state.controller.set_interval_str(text),
    };

    match result {
        Ok(interval) => (
            StatusCode::OK,
            Json(SetIntervalResponse {
                interval_secs: interval.as_secs_f64(),
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("Rejected flush interval {:?}: {}", req.interval, e);
            error_response(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
        }
    }
}

/// GET /record/status
/// Get statistics for the current (or last) session
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.controller.stats()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
