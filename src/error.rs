//! Error handling

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use tracing::info;

/// JSON body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable description of what went wrong.
    pub error: String,
}

/// definitions for the thumbsmith application.
#[derive(Debug)]
pub enum ThumbsmithError {
    /// When the caller didn't send what we need
    BadRequest(String),
    /// When the instruction service fails or keeps refusing us
    Instruction(String),
    /// When the instruction service replies with something we can't use
    InvalidInstruction(String),
    /// When composing or encoding the thumbnail fails
    Render(String),
    /// When handing the finished thumbnail to storage fails
    Upload(String),
    /// When a requested thumbnail is not found
    NotFound(String),
    /// When an internal server error occurs
    InternalServerError(String),
}

impl ThumbsmithError {
    /// True when the failure matches the transient-overload signature and
    /// is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Instruction(message) => {
                message.contains("503")
                    || message.contains("Service Unavailable")
                    || message.contains("overloaded")
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for ThumbsmithError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "Bad request: {message}"),
            Self::Instruction(message) => write!(f, "Instruction service error: {message}"),
            Self::InvalidInstruction(message) => {
                write!(f, "Invalid instruction reply: {message}")
            }
            Self::Render(message) => write!(f, "Thumbnail rendering failed: {message}"),
            Self::Upload(message) => write!(f, "Thumbnail upload failed: {message}"),
            Self::NotFound(name) => write!(f, "Not found: {name}"),
            Self::InternalServerError(message) => write!(f, "Internal server error: {message}"),
        }
    }
}

impl std::error::Error for ThumbsmithError {}

impl From<image::ImageError> for ThumbsmithError {
    fn from(err: image::ImageError) -> Self {
        ThumbsmithError::Render(err.to_string())
    }
}

impl From<std::io::Error> for ThumbsmithError {
    fn from(err: std::io::Error) -> Self {
        ThumbsmithError::InternalServerError(err.to_string())
    }
}

impl From<axum::http::Error> for ThumbsmithError {
    fn from(err: axum::http::Error) -> Self {
        ThumbsmithError::InternalServerError(err.to_string())
    }
}

impl From<url::ParseError> for ThumbsmithError {
    fn from(err: url::ParseError) -> Self {
        ThumbsmithError::InternalServerError(err.to_string())
    }
}

fn error_response(status: StatusCode, message: String) -> axum::response::Response {
    (status, Json(ErrorBody { error: message })).into_response()
}

impl IntoResponse for ThumbsmithError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ThumbsmithError::BadRequest(message) => {
                info!("Bad request received: {}", message);
                error_response(StatusCode::BAD_REQUEST, message)
            }
            ThumbsmithError::Instruction(message) => {
                tracing::error!("Instruction service error: {}", message);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ThumbsmithError::InvalidInstruction(message) => {
                tracing::error!("Invalid instruction reply: {}", message);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ThumbsmithError::Render(message) => {
                tracing::error!("Rendering error: {}", message);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ThumbsmithError::Upload(message) => {
                tracing::error!("Upload error: {}", message);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ThumbsmithError::NotFound(name) => {
                info!("404 {name}");
                error_response(StatusCode::NOT_FOUND, "Not Found".to_string())
            }
            ThumbsmithError::InternalServerError(message) => {
                tracing::error!("Internal server error: {}", message);
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}
