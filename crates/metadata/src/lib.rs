//! Durable metadata store for stash.
//!
//! User-visible state lives here and only here: users, contents, the
//! reference-counted `file_metas` table keyed by content hash, and the
//! per-user `user_contents` rows whose status drives the upload state
//! machine. The coordination store is derived from these tables; the blob
//! store holds the bytes the `file_metas` rows describe.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{ContentRow, DeleteOutcome, FileMetaRow, ReconcileRow, UserContentRow, UserRow};
pub use repos::{ContentRepo, FileMetaRepo, ReconcileRepo, UploadRepo, UserContentRepo, UserRepo};
pub use store::{MetadataStore, SqliteStore};

use stash_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    match config {
        MetadataConfig::Sqlite { path } => {
            let store = SqliteStore::new(path).await?;
            Ok(Arc::new(store))
        }
    }
}
