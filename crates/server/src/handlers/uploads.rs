//! Upload control plane handlers.

use crate::auth::AuthenticatedUser;
use crate::coordinator::ChunkOutcome;
use crate::error::{ApiError, ApiResult};
use crate::handlers::parse_hash;
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use bytes::Bytes;
use serde_json::{json, Value};
use stash_core::content::{
    CancelUploadRequest, FastUploadRequest, FastUploadResponse, InitUploadRequest,
    InitUploadResponse, MergeRequest, MergeResponse, UploadChunkResponse,
};

/// POST /api/v1/upload/init - negotiate an upload session.
pub async fn init_upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<InitUploadRequest>,
) -> ApiResult<Json<InitUploadResponse>> {
    if req.file_name.is_empty() {
        return Err(ApiError::BadRequest("file_name is required".to_string()));
    }
    let hash = parse_hash(&req.file_hash)?;

    let response = state
        .coordinator
        .init(user.user_id, &req.file_name, &hash)
        .await?;
    Ok(Json(response))
}

/// Parsed multipart form of a chunk upload.
struct ChunkForm {
    file_hash: String,
    chunk_index: u32,
    data: Bytes,
}

async fn read_chunk_form(mut multipart: Multipart) -> ApiResult<ChunkForm> {
    let mut file_hash = None;
    let mut chunk_index = None;
    let mut data = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file_hash" => {
                file_hash = Some(text_field(field, "file_hash").await?);
            }
            "chunk_index" => {
                let text = text_field(field, "chunk_index").await?;
                chunk_index = Some(text.trim().parse::<u32>().map_err(|_| {
                    ApiError::BadRequest(format!("invalid chunk_index: {text}"))
                })?);
            }
            "chunk" => {
                data = Some(field.bytes().await.map_err(|e| {
                    ApiError::BadRequest(format!("failed to read chunk payload: {e}"))
                })?);
            }
            // content_id and total_chunks accompany the form but the chunk
            // path keys everything by (user, hash, index).
            _ => {
                let _ = field.bytes().await;
            }
        }
    }

    Ok(ChunkForm {
        file_hash: file_hash
            .ok_or_else(|| ApiError::BadRequest("missing field: file_hash".to_string()))?,
        chunk_index: chunk_index
            .ok_or_else(|| ApiError::BadRequest("missing field: chunk_index".to_string()))?,
        data: data.ok_or_else(|| ApiError::BadRequest("missing file part: chunk".to_string()))?,
    })
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid field {name}: {e}")))
}

/// POST /api/v1/upload/chunk - stage one chunk (multipart).
pub async fn upload_chunk(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    multipart: Multipart,
) -> ApiResult<Json<UploadChunkResponse>> {
    let form = read_chunk_form(multipart).await?;
    let hash = parse_hash(&form.file_hash)?;

    if form.data.len() as u64 > state.config.server.max_chunk_size {
        return Err(ApiError::BadRequest(format!(
            "chunk exceeds maximum size {}",
            state.config.server.max_chunk_size
        )));
    }

    let outcome = state
        .coordinator
        .upload_chunk(user.user_id, &hash, form.chunk_index, form.data)
        .await?;

    let status = match outcome {
        ChunkOutcome::Uploaded => "chunk_uploaded",
        ChunkOutcome::AlreadyUploaded => "chunk_exists",
    };

    Ok(Json(UploadChunkResponse {
        status: status.to_string(),
        chunk_index: form.chunk_index,
    }))
}

/// POST /api/v1/upload/merge - assemble staged chunks into the final blob.
pub async fn merge_chunks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<Json<MergeResponse>> {
    let hash = parse_hash(&req.file_hash)?;
    if req.total_chunks == 0 {
        return Err(ApiError::BadRequest(
            "total_chunks must be positive".to_string(),
        ));
    }

    let merged = state
        .coordinator
        .merge(
            user.user_id,
            req.content_id,
            &req.file_name,
            &hash,
            req.total_chunks,
        )
        .await?;

    Ok(Json(MergeResponse {
        status: "completed".to_string(),
        content_id: req.content_id,
        file_path: merged.path,
        file_size: merged.size,
    }))
}

/// POST /api/v1/upload/fast - complete by reference without transferring bytes.
pub async fn fast_upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<FastUploadRequest>,
) -> ApiResult<Json<FastUploadResponse>> {
    let hash = parse_hash(&req.file_hash)?;

    let content_id = state
        .coordinator
        .fast_upload(user.user_id, req.content_id, &req.file_name, &hash)
        .await?;

    Ok(Json(FastUploadResponse {
        status: "fast_upload_completed".to_string(),
        content_id,
    }))
}

/// DELETE /api/v1/upload/cancel - abandon an in-flight session.
pub async fn cancel_upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<CancelUploadRequest>,
) -> ApiResult<Json<Value>> {
    let hash = parse_hash(&req.file_hash)?;

    state
        .coordinator
        .cancel(user.user_id, req.content_id, &hash)
        .await?;

    Ok(Json(json!({ "status": "cancelled" })))
}
