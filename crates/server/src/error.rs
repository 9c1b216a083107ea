//! API error types.

use crate::coordinator::UploadError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use stash_coordination::CoordinationError;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Missing chunk indices, present only on merge completeness failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_chunks: Option<Vec<u32>>,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upload already completed")]
    UploadAlreadyCompleted,

    #[error("upload was cancelled")]
    UploadCancelled,

    #[error("missing {} chunks", .0.len())]
    MissingChunks(Vec<u32>),

    #[error("lock contended: {0}")]
    LockContended(String),

    #[error("invalid range: {0}")]
    RangeInvalid(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] stash_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] stash_metadata::MetadataError),

    #[error("coordination error: {0}")]
    Coordination(#[from] CoordinationError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::UploadAlreadyCompleted => "upload_already_completed",
            Self::UploadCancelled => "upload_cancelled",
            Self::MissingChunks(_) => "missing_chunks",
            Self::LockContended(_) => "lock_contended",
            Self::RangeInvalid(_) => "range_invalid",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Coordination(_) => "coordination_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UploadAlreadyCompleted => StatusCode::CONFLICT,
            Self::UploadCancelled => StatusCode::GONE,
            Self::MissingChunks(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::LockContended(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RangeInvalid(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                stash_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                stash_storage::StorageError::EmptyChunk => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                stash_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                stash_metadata::MetadataError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Coordination(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::AlreadyCompleted => Self::UploadAlreadyCompleted,
            UploadError::Cancelled => Self::UploadCancelled,
            UploadError::MissingChunks(missing) => Self::MissingChunks(missing),
            UploadError::NotFound(what) => Self::NotFound(what),
            UploadError::Storage(e) => Self::Storage(e),
            UploadError::Metadata(e) => Self::Metadata(e),
            UploadError::Coordination(CoordinationError::LockContended(key)) => {
                Self::LockContended(key)
            }
            UploadError::Coordination(e) => Self::Coordination(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let missing_chunks = match &self {
            Self::MissingChunks(missing) => Some(missing.clone()),
            _ => None,
        };
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
            missing_chunks,
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
