//! HTTP error mapping
//!
//! Handler failures render as `{"success": false, "error": {code, message, stage}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use webcd_common::api::ErrorEnvelope;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed request body (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// webcd-common error, status chosen by kind
    #[error(transparent)]
    Common(#[from] webcd_common::Error),
}

impl From<crate::metadata::MbError> for ApiError {
    fn from(err: crate::metadata::MbError) -> Self {
        ApiError::Common(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use webcd_common::Error as E;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Common(err) => match err {
                E::InvalidTrackNumber { .. } | E::ConfigValueRejected { .. } => StatusCode::BAD_REQUEST,
                E::DeviceNotFound(_) => StatusCode::NOT_FOUND,
                E::NoDeviceSelected | E::DiscChanged => StatusCode::CONFLICT,
                E::NoMediaDetected => StatusCode::UNPROCESSABLE_ENTITY,
                E::NetworkLookupFailure(_) => StatusCode::BAD_GATEWAY,
                E::StreamStageLaunchFailure { .. } => StatusCode::SERVICE_UNAVAILABLE,
                E::ReaderToolFailure(_) | E::EjectFailed(_) | E::Config(_) | E::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn envelope(&self) -> ErrorEnvelope {
        match self {
            ApiError::BadRequest(msg) => ErrorEnvelope::new("BAD_REQUEST", msg.as_str(), "request"),
            ApiError::Internal(msg) => ErrorEnvelope::new("INTERNAL_ERROR", msg.as_str(), "server"),
            ApiError::Common(err) => ErrorEnvelope::from(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = %status, "Request failed: {}", self);
        } else {
            tracing::debug!(status = %status, "Request rejected: {}", self);
        }
        (status, Json(self.envelope())).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
