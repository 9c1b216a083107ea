//! File listing, deletion, and download handlers.

use crate::auth::AuthenticatedUser;
use crate::download::{content_type_for, parse_range};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{format_timestamp, parse_hash};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::{Extension, Json};
use serde_json::{json, Value};
use stash_core::content::{FileInfo, FileListResponse};
use stash_metadata::{FileMetaRepo as _, UserContentRepo as _};
use stash_storage::BlobStore as _;

/// GET /api/v1/files - list the caller's files.
pub async fn list_files(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<FileListResponse>> {
    let user_contents = state.metadata.list_user_contents(user.user_id).await?;

    let mut files = Vec::with_capacity(user_contents.len());
    for uc in user_contents {
        let file_size = match state.metadata.get_file_meta(&uc.file_hash).await? {
            Some(meta) => meta.file_size as u64,
            None => 0,
        };
        files.push(FileInfo {
            id: uc.id,
            file_name: uc.file_name,
            file_hash: uc.file_hash,
            file_size,
            status: uc.status,
            created_at: format_timestamp(uc.created_at),
        });
    }

    Ok(Json(FileListResponse { files }))
}

/// GET /api/v1/files/{hash} - a single file record.
pub async fn get_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(hash): Path<String>,
) -> ApiResult<Json<FileInfo>> {
    let hash = parse_hash(&hash)?;

    let uc = state
        .metadata
        .get_user_content_by_hash(user.user_id, hash.as_str())
        .await?
        .ok_or_else(|| ApiError::NotFound("file not found".to_string()))?;

    let file_size = match state.metadata.get_file_meta(hash.as_str()).await? {
        Some(meta) => meta.file_size as u64,
        None => 0,
    };

    Ok(Json(FileInfo {
        id: uc.id,
        file_name: uc.file_name,
        file_hash: uc.file_hash,
        file_size,
        status: uc.status,
        created_at: format_timestamp(uc.created_at),
    }))
}

/// DELETE /api/v1/files/{hash} - drop the caller's reference.
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(hash): Path<String>,
) -> ApiResult<Json<Value>> {
    let hash = parse_hash(&hash)?;
    state.coordinator.delete(user.user_id, &hash).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

/// GET /api/v1/files/{hash}/download - full or ranged download.
pub async fn download_file(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(hash): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let hash = parse_hash(&hash)?;

    // Ownership check. Not-found and forbidden are deliberately conflated so
    // other users' hashes cannot be probed.
    let not_found = || ApiError::NotFound("file not found or access denied".to_string());

    let uc = state
        .metadata
        .get_user_content_by_hash(user.user_id, hash.as_str())
        .await?
        .ok_or_else(not_found)?;

    let meta = state
        .metadata
        .get_file_meta(hash.as_str())
        .await?
        .ok_or_else(not_found)?;

    if !state.storage.exists(&hash).await? {
        return Err(not_found());
    }

    let file_size = meta.file_size as u64;
    let content_type = content_type_for(&uc.file_name);
    let disposition = format!("attachment; filename=\"{}\"", uc.file_name.replace('"', ""));

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let builder = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_DISPOSITION, disposition);

    let response = match range_header {
        Some(range_header) => {
            let range = parse_range(range_header, file_size)?;
            let stream = state
                .storage
                .get_range_stream(&hash, range.start, range.end)
                .await?;
            builder
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", range.start, range.end, file_size),
                )
                .header(header::CONTENT_LENGTH, range.len())
                .body(Body::from_stream(stream))
        }
        None => {
            let stream = state.storage.get_stream(&hash).await?;
            builder
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, file_size)
                .body(Body::from_stream(stream))
        }
    };

    response.map_err(|e| ApiError::Internal(format!("failed to build response: {e}")))
}
