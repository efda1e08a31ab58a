//! Manual album search and attribution

use crate::error::{ApiError, ApiResult};
use crate::metadata::AlbumCandidate;
use crate::AppState;
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use webcd_common::{AlbumInfo, MetadataSource, Track};

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub albums: Vec<AlbumCandidate>,
}

#[derive(Debug, Deserialize)]
pub struct SetAlbumRequest {
    #[serde(default)]
    pub release_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SetAlbumResponse {
    pub success: bool,
    pub album: AlbumInfo,
    pub tracks: Vec<Track>,
}

/// POST /api/search-album
///
/// **Request:** `{"query": "album or artist text"}`
pub async fn search_album(
    State(state): State<AppState>,
    Json(payload): Json<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    let query = payload
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No search query provided".to_string()))?;

    let releases = state.releases.search_releases(&query).await?;
    Ok(Json(SearchResponse {
        success: true,
        albums: releases.iter().map(AlbumCandidate::from).collect(),
    }))
}

/// POST /api/set-album
///
/// **Request:** `{"release_id": "<MusicBrainz release id>"}`
///
/// Titles come from the release's first medium, bounded by the local track list.
pub async fn set_album(
    State(state): State<AppState>,
    Json(payload): Json<SetAlbumRequest>,
) -> ApiResult<Json<SetAlbumResponse>> {
    let release_id = payload
        .release_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No release ID provided".to_string()))?;

    // Pin the disc the release is meant for before the lookup
    let ticket = state.disc.begin_read().await?;
    let release = state.releases.release(&release_id).await?;
    let album = release.album_info(MetadataSource::Manual);
    let titles: Vec<(usize, String)> = release
        .media
        .first()
        .map(|medium| {
            medium
                .tracks
                .iter()
                .enumerate()
                .map(|(i, t)| (i, t.title.clone()))
                .collect()
        })
        .unwrap_or_default();

    info!(release_id = %release_id, "Applying manually selected release");
    let snapshot = state.disc.set_album(&ticket, album.clone(), titles).await?;

    Ok(Json(SetAlbumResponse {
        success: true,
        album,
        tracks: snapshot.tracks,
    }))
}

/// Build album routes
pub fn album_routes() -> Router<AppState> {
    Router::new()
        .route("/api/search-album", post(search_album))
        .route("/api/set-album", post(set_album))
}
