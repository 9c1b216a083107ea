//! Content listing handlers.

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, ApiResult};
use crate::handlers::format_timestamp;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use stash_core::content::{ContentInfo, ContentListResponse};
use stash_metadata::ContentRepo as _;

/// GET /api/v1/contents - list the caller's contents.
pub async fn list_contents(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> ApiResult<Json<ContentListResponse>> {
    let contents = state.metadata.list_contents(user.user_id).await?;

    let contents = contents
        .into_iter()
        .map(|c| ContentInfo {
            id: c.content_id,
            title: c.title,
            source_hash: c.source_hash,
            created_at: format_timestamp(c.created_at),
        })
        .collect();

    Ok(Json(ContentListResponse { contents }))
}

/// GET /api/v1/contents/{id} - a single content record.
pub async fn get_content(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(content_id): Path<i64>,
) -> ApiResult<Json<ContentInfo>> {
    let content = state
        .metadata
        .get_content(user.user_id, content_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("content not found".to_string()))?;

    Ok(Json(ContentInfo {
        id: content.content_id,
        title: content.title,
        source_hash: content.source_hash,
        created_at: format_timestamp(content.created_at),
    }))
}
