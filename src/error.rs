use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Malformed or out-of-range client input
    InvalidParameter(String),
    /// Tail delay_for above the allowed maximum
    DelayTooLarge(u32),
    /// Query execution failure (treated as caller-attributable)
    Engine(String),
    /// Response serialization failure
    Encode(String),
    /// Internal server error
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
            Self::DelayTooLarge(max) => write!(f, "delay_for can't be greater than {}", max),
            Self::Engine(msg) => write!(f, "query execution error: {}", msg),
            Self::Encode(msg) => write!(f, "encoding error: {}", msg),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::DelayTooLarge(_) => StatusCode::BAD_REQUEST,
            // Evaluation failures mean a bad query, not a server fault
            Self::Engine(_) => StatusCode::BAD_REQUEST,
            Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::InvalidParameter(_) => "invalid_parameter",
        AppError::DelayTooLarge(_) => "delay_too_large",
        AppError::Engine(_) => "engine_error",
        AppError::Encode(_) => "encode_error",
        AppError::Internal(_) => "internal_error",
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
