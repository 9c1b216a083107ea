//! Reconciliation repository trait.

use crate::error::MetadataResult;
use crate::models::ReconcileRow;
use async_trait::async_trait;

/// Read surface for the startup reconciler.
#[async_trait]
pub trait ReconcileRepo: Send + Sync {
    /// All `user_contents` rows carrying a nonempty file hash, projected to
    /// the fields a tombstone needs.
    async fn reconciliation_rows(&self) -> MetadataResult<Vec<ReconcileRow>>;
}
