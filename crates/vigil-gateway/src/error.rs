//! Admission server error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use vigil_kernel::gateway::GatewayError;

/// Server-level errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("validator spec could not be applied: {0}")]
    Spec(#[from] vigil_validator::ConfigError),

    #[error(transparent)]
    Gate(#[from] vigil_validator::GateError),

    #[error("spec watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    #[error("pipeline failure: {0}")]
    Pipeline(#[from] GatewayError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::Pipeline(GatewayError::FilterReleased(_))
            | ServerError::Gate(vigil_validator::GateError::Released) => {
                (StatusCode::SERVICE_UNAVAILABLE, "GATE_RELEASED")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        // Details go to the log only.
        tracing::error!(error = %self, "admission request failed");
        let body = Json(json!({
            "error": {
                "code": code,
                "message": status.canonical_reason().unwrap_or("Error"),
            }
        }));

        (status, body).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
