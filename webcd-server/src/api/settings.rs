//! Stream profile endpoint

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use serde_json::Value;
use webcd_common::StreamProfile;

/// Current profile, plus the fields an update dropped
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    #[serde(flatten)]
    pub profile: StreamProfile,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<String>,
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        profile: state.profile.get().await,
        rejected: Vec::new(),
    })
}

/// POST /api/settings
///
/// **Request:** any subset of `{"bitrate": "192k", "buffer_size": "256k",
/// "robustness_mode": "fast", "preload_seconds": 1}`
///
/// Invalid fields are dropped individually; the rest of the update applies.
pub async fn update_settings(
    State(state): State<AppState>,
    payload: Option<Json<Value>>,
) -> ApiResult<Json<SettingsResponse>> {
    let Some(Json(body)) = payload else {
        return Ok(get_settings(State(state)).await);
    };

    let update = match body {
        Value::Object(map) => map,
        Value::Null => return Ok(get_settings(State(state)).await),
        _ => {
            return Err(ApiError::BadRequest(
                "Settings update must be a JSON object".to_string(),
            ))
        }
    };

    let (profile, rejected) = state.profile.update(&update).await;
    Ok(Json(SettingsResponse {
        profile,
        rejected: rejected
            .iter()
            .filter_map(|e| match e {
                webcd_common::Error::ConfigValueRejected { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect(),
    }))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).post(update_settings))
}
