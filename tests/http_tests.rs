use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chunkcast::http::{create_router, AppState};
use chunkcast::relay::{ArchiveStore, StreamRegistry};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

async fn get(state: AppState, uri: &str) -> Result<(StatusCode, Vec<u8>)> {
    let response = create_router(state)
        .oneshot(Request::builder().uri(uri).body(Body::empty())?)
        .await?;

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, body.to_vec()))
}

fn state(dir: &TempDir) -> AppState {
    AppState::new(
        StreamRegistry::new(),
        Arc::new(ArchiveStore::new(dir.path())),
    )
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let dir = TempDir::new()?;
    let (status, body) = get(state(&dir), "/health").await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
    Ok(())
}

#[tokio::test]
async fn test_live_streams_lists_only_live() -> Result<()> {
    let dir = TempDir::new()?;
    let state = state(&dir);

    state.registry.start("cam-1").await;
    state.registry.start("cam-2").await;
    state.registry.finish("cam-2").await;

    let (status, body) = get(state, "/live-streams").await?;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body)?;
    let streams = json["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["socketId"], "cam-1");
    assert!(streams[0]["startedAt"].as_i64().unwrap() > 0);
    Ok(())
}

#[tokio::test]
async fn test_recordings_listing_and_download() -> Result<()> {
    let dir = TempDir::new()?;
    let state = state(&dir);

    state.archive.write("cam-1", b"webm-bytes").await?;
    let saved = state.archive.finish("cam-1").await?;
    std::fs::write(dir.path().join("notes.txt"), b"ignored")?;

    let (status, body) = get(state.clone(), "/recordings").await?;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body)?;
    assert_eq!(json["recordings"], serde_json::json!([saved.filename.clone()]));

    let response = create_router(state)
        .oneshot(
            Request::builder()
                .uri(format!("/recordings/{}", saved.filename))
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "video/webm");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"webm-bytes");
    Ok(())
}

#[tokio::test]
async fn test_missing_recording_is_404() -> Result<()> {
    let dir = TempDir::new()?;
    let (status, _) = get(state(&dir), "/recordings/recording_x_1.webm").await?;

    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_recording_name_must_be_plain_webm() -> Result<()> {
    let dir = TempDir::new()?;

    let (status, _) = get(state(&dir), "/recordings/..%2Fsecret.webm").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(state(&dir), "/recordings/notes.txt").await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_empty_recordings_dir() -> Result<()> {
    let dir = TempDir::new()?;
    let state = AppState::new(
        StreamRegistry::new(),
        Arc::new(ArchiveStore::new(dir.path().join("not-created-yet"))),
    );

    let (status, body) = get(state, "/recordings").await?;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body)?;
    assert_eq!(json["recordings"], serde_json::json!([]));
    Ok(())
}
