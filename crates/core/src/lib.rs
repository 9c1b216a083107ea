//! Core domain types and shared logic for the stash upload service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content hashes (the content-addressed key for blobs)
//! - Upload lifecycle states and wire DTOs
//! - Application configuration

pub mod config;
pub mod content;
pub mod error;
pub mod hash;

pub use config::AppConfig;
pub use content::{InitStatus, TombstoneStatus, UploadStatus};
pub use error::{Error, Result};
pub use hash::ContentHash;

/// Default chunk size: 5 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum accepted chunk size: 32 MiB
pub const MAX_CHUNK_SIZE: u64 = 32 * 1024 * 1024;
