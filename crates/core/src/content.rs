//! Upload lifecycle states and wire DTOs.

use serde::{Deserialize, Serialize};

/// Status of a user's upload session, as persisted in the metadata store.
///
/// The numeric mapping is part of the storage schema and the API surface
/// (`GET /files` reports the raw value), so it is fixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadStatus {
    /// Session is open and accepting chunks.
    Uploading,
    /// Upload finished; the blob is referenced by this user.
    Completed,
    /// A derived version is being produced (reserved; no transition targets it here).
    Transcoding,
    /// Session was explicitly cancelled.
    Cancelled,
}

impl UploadStatus {
    /// The stored integer value.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Uploading => 0,
            Self::Completed => 1,
            Self::Transcoding => 2,
            Self::Cancelled => -1,
        }
    }

    /// Parse from the stored integer value.
    pub fn from_i64(value: i64) -> crate::Result<Self> {
        match value {
            0 => Ok(Self::Uploading),
            1 => Ok(Self::Completed),
            2 => Ok(Self::Transcoding),
            -1 => Ok(Self::Cancelled),
            other => Err(crate::Error::InvalidStatus(other)),
        }
    }

    /// Check if the session reached a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Terminal outcome recorded in a coordination-store tombstone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TombstoneStatus {
    /// Upload finished; fast upload may serve this (user, hash) forever.
    Completed,
    /// Upload was cancelled; stragglers are rejected until the entry expires.
    Cancelled,
}

impl TombstoneStatus {
    /// Wire representation used in the coordination store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::InvalidTombstoneStatus(other.to_string())),
        }
    }
}

/// Outcome of an upload init call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    /// No chunks on disk; start from index 0.
    New,
    /// Some chunks already staged; `uploaded_chunks` lists them.
    Resumable,
    /// Identical content already exists; no bytes need to be transferred.
    FastUpload,
}

// =============================================================================
// Wire DTOs (shared between server handlers and the CLI client)
// =============================================================================

/// Request body for `POST /api/v1/upload/init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadRequest {
    pub file_name: String,
    pub file_hash: String,
    pub file_size: u64,
}

/// Response body for `POST /api/v1/upload/init`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitUploadResponse {
    pub status: InitStatus,
    pub content_id: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uploaded_chunks: Vec<u32>,
}

/// Response body for `POST /api/v1/upload/chunk`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadChunkResponse {
    /// `chunk_uploaded` for a fresh write, `chunk_exists` for an idempotent replay.
    pub status: String,
    pub chunk_index: u32,
}

/// Request body for `POST /api/v1/upload/merge`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeRequest {
    pub content_id: i64,
    pub file_hash: String,
    pub file_name: String,
    pub total_chunks: u32,
    pub file_size: u64,
}

/// Response body for `POST /api/v1/upload/merge`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeResponse {
    pub status: String,
    pub content_id: i64,
    pub file_path: String,
    pub file_size: u64,
}

/// Request body for `POST /api/v1/upload/fast`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FastUploadRequest {
    pub content_id: i64,
    pub file_name: String,
    pub file_hash: String,
}

/// Response body for `POST /api/v1/upload/fast`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FastUploadResponse {
    pub status: String,
    pub content_id: i64,
}

/// Request body for `DELETE /api/v1/upload/cancel`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CancelUploadRequest {
    pub content_id: i64,
    pub file_hash: String,
}

/// A user-visible file record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: i64,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: u64,
    pub status: i64,
    pub created_at: String,
}

/// A user-visible content record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentInfo {
    pub id: i64,
    pub title: String,
    pub source_hash: String,
    pub created_at: String,
}

/// Response body for `GET /api/v1/files`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
}

/// Response body for `GET /api/v1/contents`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentListResponse {
    pub contents: Vec<ContentInfo>,
}

/// Request body for `POST /api/v1/auth/register` and `/auth/login`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Response body for `POST /api/v1/auth/login`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}
