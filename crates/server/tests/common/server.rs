//! Server test utilities.

use axum::http::StatusCode;
use serde_json::json;
use stash_coordination::{CoordinationStore, MemoryCoordination};
use stash_core::config::AppConfig;
use stash_metadata::{MetadataStore, SqliteStore};
use stash_server::{create_router, AppState};
use stash_storage::{BlobStore, FilesystemStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and in-memory
    /// coordination.
    pub async fn new() -> Self {
        let temp_dir = tempfile::tempdir().expect("failed to create temp directory");
        let config = AppConfig::for_testing(temp_dir.path());

        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemStore::new(&config.storage.base_path, &config.storage.temp_path)
                .await
                .expect("failed to create blob store"),
        );

        let db_path = temp_dir.path().join("stash.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("failed to create metadata store"),
        );

        let coordination: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordination::new());

        let state = AppState::new(config, storage, metadata, coordination)
            .expect("failed to build app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Access the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Access the underlying blob store.
    pub fn storage(&self) -> Arc<dyn BlobStore> {
        self.state.storage.clone()
    }

    /// Access the underlying coordination store.
    pub fn coordination(&self) -> Arc<dyn CoordinationStore> {
        self.state.coordination.clone()
    }

    /// Register a user and return a bearer token for them.
    pub async fn register_and_login(&self, username: &str) -> String {
        let (status, _) = super::json_request(
            &self.router,
            "POST",
            "/api/v1/auth/register",
            Some(json!({ "username": username, "password": "hunter2hunter2" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "register failed for {username}");

        let (status, body) = super::json_request(
            &self.router,
            "POST",
            "/api/v1/auth/login",
            Some(json!({ "username": username, "password": "hunter2hunter2" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login failed for {username}");

        body.get("token")
            .and_then(|t| t.as_str())
            .expect("login response missing token")
            .to_string()
    }
}
