//! Startup reconciler.
//!
//! The coordination store is ephemeral; after a restart its tombstones are
//! rebuilt from the metadata store so fast upload keeps working and stale
//! in-flight sessions are fenced off.

use crate::coordinator::UploadError;
use stash_coordination::{CoordinationStore, Tombstone, TOMBSTONE_TTL};
use stash_core::{ContentHash, TombstoneStatus, UploadStatus};
use stash_metadata::{FileMetaRepo, MetadataStore, ReconcileRepo};
use stash_storage::BlobStore;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Rebuild tombstones from the metadata store. Returns the number published.
///
/// - COMPLETED rows become `completed` tombstones, but only when the hash is
///   still present in `file_metas` and the blob store actually holds the
///   object; inconsistent rows are skipped (downgraded to "no tombstone").
/// - CANCELLED rows become `cancelled` tombstones with the bounded TTL.
/// - UPLOADING rows (in flight at shutdown) also become `cancelled`: a stale
///   session must re-init rather than resume blindly across a restart.
pub async fn rebuild_tombstones(
    metadata: &Arc<dyn MetadataStore>,
    storage: &Arc<dyn BlobStore>,
    coordination: &Arc<dyn CoordinationStore>,
) -> Result<usize, UploadError> {
    let rows = metadata.reconciliation_rows().await?;
    if rows.is_empty() {
        tracing::info!("no upload records, skipping tombstone rebuild");
        return Ok(0);
    }

    let known_hashes: HashSet<String> = metadata.file_meta_hashes().await?.into_iter().collect();

    let mut batch: Vec<(Tombstone, Option<Duration>)> = Vec::with_capacity(rows.len());
    for row in rows {
        let hash = match ContentHash::parse(&row.file_hash) {
            Ok(hash) => hash,
            Err(e) => {
                tracing::warn!(user_id = row.user_id, hash = %row.file_hash, error = %e,
                    "skipping row with malformed hash");
                continue;
            }
        };

        let status = match UploadStatus::from_i64(row.status) {
            Ok(status) => status,
            Err(_) => continue,
        };

        let (tombstone_status, ttl) = match status {
            UploadStatus::Completed => {
                if !known_hashes.contains(hash.as_str()) {
                    tracing::warn!(user_id = row.user_id, hash = %hash,
                        "completed row without file meta, skipping");
                    continue;
                }
                match storage.exists(&hash).await {
                    Ok(true) => (TombstoneStatus::Completed, None),
                    Ok(false) => {
                        tracing::warn!(user_id = row.user_id, hash = %hash,
                            "completed row without blob, skipping");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(hash = %hash, error = %e, "blob check failed, skipping");
                        continue;
                    }
                }
            }
            UploadStatus::Cancelled => (TombstoneStatus::Cancelled, Some(TOMBSTONE_TTL)),
            UploadStatus::Uploading => (TombstoneStatus::Cancelled, Some(TOMBSTONE_TTL)),
            UploadStatus::Transcoding => continue,
        };

        batch.push((
            Tombstone::new(row.user_id, hash, row.content_id, tombstone_status),
            ttl,
        ));
    }

    coordination.publish_tombstones(&batch).await?;
    tracing::info!(count = batch.len(), "tombstones rebuilt from metadata");
    Ok(batch.len())
}
