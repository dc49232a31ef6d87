//! API error handling for the Imagebox HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::ImageboxError;

/// API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request (400).
    BadRequest,
    /// No files in the upload (400).
    EmptyBatch,
    /// Image limit reached (400).
    CapacityExceeded,
    /// Unusable file name (400).
    InvalidName,
    /// Extension not allowed (400).
    UnsupportedExtension,
    /// Same name twice in one upload (400).
    DuplicateInBatch,
    /// Name already stored (400).
    NameCollision,
    /// File over the size limit (400).
    FileTooLarge,
    /// Not a decodable PNG, JPEG or GIF (400).
    UnsupportedOrCorruptImage,
    /// Decode would exceed memory limits (400).
    ResourceLimitExceeded,
    /// Not found (404).
    NotFound,
    /// Request body over the configured limit (413).
    PayloadTooLarge,
    /// Internal server error (500).
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Extra details, e.g. `{"file": ["cat.png"]}` for per-file errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<HashMap<String, Vec<String>>>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error naming the offending file.
    pub fn for_file(code: ErrorCode, message: impl Into<String>, file: impl Into<String>) -> Self {
        let mut details = HashMap::new();
        details.insert("file".to_string(), vec![file.into()]);
        Self {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Create a payload too large error.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PayloadTooLarge, message)
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ImageboxError> for ApiError {
    fn from(err: ImageboxError) -> Self {
        let code = match &err {
            ImageboxError::EmptyBatch => ErrorCode::EmptyBatch,
            ImageboxError::CapacityExceeded { .. } => ErrorCode::CapacityExceeded,
            ImageboxError::InvalidName(_) => ErrorCode::InvalidName,
            ImageboxError::UnsupportedExtension(_) => ErrorCode::UnsupportedExtension,
            ImageboxError::DuplicateInBatch(_) => ErrorCode::DuplicateInBatch,
            ImageboxError::NameCollision(_) => ErrorCode::NameCollision,
            ImageboxError::FileTooLarge { .. } => ErrorCode::FileTooLarge,
            ImageboxError::UnsupportedOrCorruptImage(_) => ErrorCode::UnsupportedOrCorruptImage,
            ImageboxError::ResourceLimitExceeded(_) => ErrorCode::ResourceLimitExceeded,
            ImageboxError::NotFound(_) => ErrorCode::NotFound,
            _ => {
                tracing::error!("Internal error: {}", err);
                return match err.file_name() {
                    Some(file) => ApiError::for_file(
                        ErrorCode::InternalError,
                        "An internal error occurred",
                        file,
                    ),
                    None => ApiError::internal("An internal error occurred"),
                };
            }
        };

        match err.file_name() {
            Some(file) => ApiError::for_file(code, err.to_string(), file),
            None => ApiError::new(code, err.to_string()),
        }
    }
}
