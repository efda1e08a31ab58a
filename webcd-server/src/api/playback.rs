//! Server-side playback control endpoints

use crate::error::ApiResult;
use crate::playback::{PlaybackStatus, SkipOutcome};
use crate::AppState;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use webcd_common::api::Ack;

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    #[serde(default)]
    pub track: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub success: bool,
    pub track: u32,
}

/// Body of next/previous: either the new track or a refusal
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SkipResponse {
    Playing(PlayResponse),
    Refused(Ack),
}

impl From<SkipOutcome> for SkipResponse {
    fn from(outcome: SkipOutcome) -> Self {
        match outcome {
            SkipOutcome::Playing(track) => SkipResponse::Playing(PlayResponse {
                success: true,
                track,
            }),
            SkipOutcome::AtBoundary(reason) => SkipResponse::Refused(Ack::refused(reason)),
        }
    }
}

/// POST /api/play
///
/// **Request:** `{"track": 3}` or an empty body to play the current track
pub async fn play(
    State(state): State<AppState>,
    payload: Option<Json<PlayRequest>>,
) -> ApiResult<Json<PlayResponse>> {
    let request = payload.map(|Json(p)| p).unwrap_or_default();
    let profile = state.profile.get().await;
    let track = state.playback.play(&state.disc, &profile, request.track).await?;
    Ok(Json(PlayResponse {
        success: true,
        track,
    }))
}

/// POST /api/stop
pub async fn stop(State(state): State<AppState>) -> Json<Ack> {
    state.playback.stop().await;
    Json(Ack::ok())
}

/// POST /api/next
pub async fn next(State(state): State<AppState>) -> ApiResult<Json<SkipResponse>> {
    let profile = state.profile.get().await;
    let outcome = state.playback.next(&state.disc, &profile).await?;
    Ok(Json(outcome.into()))
}

/// POST /api/previous
pub async fn previous(State(state): State<AppState>) -> ApiResult<Json<SkipResponse>> {
    let profile = state.profile.get().await;
    let outcome = state.playback.previous(&state.disc, &profile).await?;
    Ok(Json(outcome.into()))
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> Json<PlaybackStatus> {
    Json(state.playback.status(&state.disc).await)
}

/// Build playback control routes
pub fn playback_routes() -> Router<AppState> {
    Router::new()
        .route("/api/play", post(play))
        .route("/api/stop", post(stop))
        .route("/api/next", post(next))
        .route("/api/previous", post(previous))
        .route("/api/status", get(status))
}
