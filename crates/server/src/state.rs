//! Application state shared across handlers.

use crate::auth::TokenIssuer;
use crate::coordinator::UploadCoordinator;
use stash_coordination::CoordinationStore;
use stash_core::config::AppConfig;
use stash_metadata::MetadataStore;
use stash_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob store backend.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Coordination store.
    pub coordination: Arc<dyn CoordinationStore>,
    /// The upload coordination engine.
    pub coordinator: Arc<UploadCoordinator>,
    /// Bearer token issuer.
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    /// Create a new application state. Fails fast on invalid auth config.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        coordination: Arc<dyn CoordinationStore>,
    ) -> stash_core::Result<Self> {
        let tokens = Arc::new(TokenIssuer::new(config.auth()?)?);
        let coordinator = Arc::new(UploadCoordinator::new(
            storage.clone(),
            metadata.clone(),
            coordination.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            storage,
            metadata,
            coordination,
            coordinator,
            tokens,
        })
    }
}
