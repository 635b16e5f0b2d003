//! Error types and stable error codes for the demo server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::store::LookupError;

/// Error codes carried in JSON error bodies.
pub mod error_codes {
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const USER_NOT_FOUND: &str = "user_not_found";
    pub const LOOKUP_FAILED: &str = "lookup_failed";
    pub const CONFIG_ERROR: &str = "config_error";
}

/// All errors that can occur in the server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("User not found: {0}")]
    UserNotFound(u32),

    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub fn code(&self) -> &'static str {
        use error_codes::*;
        match self {
            ServerError::InvalidParams(_) => INVALID_PARAMS,
            ServerError::UserNotFound(_) => USER_NOT_FOUND,
            ServerError::Lookup(_) => LOOKUP_FAILED,
            ServerError::Config(_) => CONFIG_ERROR,
            ServerError::Transport(_) | ServerError::Io(_) | ServerError::Json(_) => INTERNAL_ERROR,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidParams(_) => StatusCode::BAD_REQUEST,
            ServerError::UserNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Lookup(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!("{self}");
        }
        let body = serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
