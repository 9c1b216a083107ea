//! HTTP API server and upload coordination engine for stash.
//!
//! This crate provides:
//! - The upload coordinator: the init/chunk/merge/cancel/fast/delete state
//!   machine over the blob, metadata, and coordination stores
//! - Range-capable download serialization
//! - The startup reconciler that rebuilds tombstones from the metadata store
//! - The HTTP control plane under `/api/v1`

pub mod auth;
pub mod coordinator;
pub mod download;
pub mod error;
pub mod handlers;
pub mod reconcile;
pub mod routes;
pub mod state;

pub use coordinator::{ChunkOutcome, UploadCoordinator, UploadError};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
