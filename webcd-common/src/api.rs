//! Shared API response envelope types
//!
//! Every mutating endpoint answers with a `{success: bool, ...}` envelope. Failures
//! carry a machine-readable code and the name of the stage that failed.

use crate::Error;
use serde::{Deserialize, Serialize};

/// Failure description inside an error envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub stage: String,
}

/// `{"success": false, "error": {...}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorDetail,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                stage: stage.into(),
            },
        }
    }
}

impl From<&Error> for ErrorEnvelope {
    fn from(err: &Error) -> Self {
        Self::new(err.code(), err.to_string(), err.stage())
    }
}

/// Plain acknowledgement for control endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
        }
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Soft failure that is not an error condition (e.g. "Last track")
    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(reason.into()),
        }
    }
}
