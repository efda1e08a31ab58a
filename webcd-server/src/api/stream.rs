//! Chunked MP3 stream endpoint

use crate::error::ApiResult;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

/// GET /api/stream/:track
///
/// Starts a fresh pipeline for the track. Any earlier stream or controlled
/// playback on the same drive is cancelled. Closing the connection stops the
/// pipeline.
pub async fn stream_track(
    State(state): State<AppState>,
    Path(track): Path<i64>,
) -> ApiResult<Response> {
    let device = state.disc.require_device().await?;
    let track = state.disc.track(track).await?.number;
    let profile = state.profile.get().await;

    let session = state.sessions.prepare(&device);
    let stream = state.pipeline.stream_track(&device, track, &profile, session)?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::ACCEPT_RANGES, "none"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Build stream routes
pub fn stream_routes() -> Router<AppState> {
    Router::new().route("/api/stream/:track", get(stream_track))
}
