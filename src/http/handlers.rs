use super::state::AppState;
use crate::relay::LiveStreamInfo;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{debug, error};

#[derive(Debug, Serialize)]
pub struct LiveStreamsResponse {
    pub streams: Vec<LiveStreamInfo>,
}

#[derive(Debug, Serialize)]
pub struct RecordingsResponse {
    pub recordings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> axum::response::Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /live-streams
/// Streams currently live, oldest first
pub async fn list_live_streams(State(state): State<AppState>) -> impl IntoResponse {
    let streams = state.registry.list().await;
    debug!("{} live streams", streams.len());

    Json(LiveStreamsResponse { streams })
}

/// GET /recordings
pub async fn list_recordings(State(state): State<AppState>) -> impl IntoResponse {
    match state.archive.list().await {
        Ok(recordings) => (StatusCode::OK, Json(RecordingsResponse { recordings })).into_response(),
        Err(e) => {
            error!("Failed to list recordings: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list recordings".to_string(),
            )
        }
    }
}

/// GET /recordings/:filename
pub async fn get_recording(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> impl IntoResponse {
    let Some(path) = state.archive.path_for(&filename) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Invalid recording name: {}", filename),
        );
    };

    match tokio::fs::read(&path).await {
        Ok(data) => (StatusCode::OK, [(header::CONTENT_TYPE, "video/webm")], data).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => error_response(
            StatusCode::NOT_FOUND,
            format!("Recording {} not found", filename),
        ),
        Err(e) => {
            error!("Failed to read recording {:?}: {}", path, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to read recording {}", filename),
            )
        }
    }
}
