//! HTTP request handlers.

pub mod auth;
pub mod contents;
pub mod files;
pub mod uploads;

pub use auth::{login, register};
pub use contents::{get_content, list_contents};
pub use files::{delete_file, download_file, get_file, list_files};
pub use uploads::{cancel_upload, fast_upload, init_upload, merge_chunks, upload_chunk};

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use stash_coordination::CoordinationStore as _;
use stash_core::ContentHash;
use stash_metadata::MetadataStore as _;
use stash_storage::BlobStore as _;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

const TIMESTAMP_FORMAT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Render a timestamp the way the API reports them.
pub(crate) fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| ts.to_string())
}

/// Parse and validate a content hash from request input.
pub(crate) fn parse_hash(raw: &str) -> ApiResult<ContentHash> {
    ContentHash::parse(raw)
        .map_err(|e| crate::error::ApiError::BadRequest(format!("invalid file_hash: {e}")))
}

/// GET /health - readiness probe reporting store connectivity.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;
    state.coordination.health_check().await?;
    Ok(Json(json!({ "status": "ok" })))
}
