//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Default chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub default_chunk_size: u64,
    /// Maximum accepted chunk size in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
    /// Grace window for draining connections on shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_chunk_size: default_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Blob store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding published blobs, named by content hash.
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
    /// Directory holding per-user scratch chunk areas.
    #[serde(default = "default_temp_path")]
    pub temp_path: PathBuf,
}

fn default_base_path() -> PathBuf {
    PathBuf::from("./data/blobs")
}

fn default_temp_path() -> PathBuf {
    PathBuf::from("./data/tmp")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            temp_path: default_temp_path(),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/stash.db"),
        }
    }
}

/// Coordination store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CoordinationConfig {
    /// Redis-backed coordination (production).
    Redis {
        /// Redis address, host:port.
        addr: String,
        /// Optional password.
        #[serde(default)]
        password: Option<String>,
        /// Database index.
        #[serde(default)]
        db: i64,
    },
    /// In-process coordination (single node, tests).
    Memory,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self::Memory
    }
}

/// Authentication configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for signing bearer tokens. Must be at least 32 bytes.
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

fn default_token_ttl_secs() -> u64 {
    86400 // 24 hours
}

impl AuthConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.jwt_secret.len() < 32 {
            return Err(crate::Error::Config(
                "auth.jwt_secret must be at least 32 characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Token lifetime as a Duration.
    pub fn token_ttl(&self) -> Duration {
        let secs = i64::try_from(self.token_ttl_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub coordination: CoordinationConfig,
    pub auth: Option<AuthConfig>,
}

impl AppConfig {
    /// Create a test configuration rooted in the given directory.
    ///
    /// **For testing only.** Uses the in-memory coordination backend and a
    /// fixed JWT secret.
    pub fn for_testing(root: &std::path::Path) -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig {
                base_path: root.join("blobs"),
                temp_path: root.join("tmp"),
            },
            metadata: MetadataConfig::Sqlite {
                path: root.join("stash.db"),
            },
            coordination: CoordinationConfig::Memory,
            auth: Some(AuthConfig {
                jwt_secret: "test-secret-that-is-at-least-32-characters".to_string(),
                token_ttl_secs: 3600,
            }),
        }
    }

    /// The auth section, or an error if it is missing.
    pub fn auth(&self) -> crate::Result<&AuthConfig> {
        self.auth
            .as_ref()
            .ok_or_else(|| crate::Error::Config("missing [auth] configuration".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.default_chunk_size, crate::DEFAULT_CHUNK_SIZE);
        assert!(matches!(config.metadata, MetadataConfig::Sqlite { .. }));
        assert!(matches!(config.coordination, CoordinationConfig::Memory));
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_auth_secret_validation() {
        let auth = AuthConfig {
            jwt_secret: "short".to_string(),
            token_ttl_secs: 60,
        };
        assert!(auth.validate().is_err());

        let auth = AuthConfig {
            jwt_secret: "a-secret-that-is-definitely-32-chars-long".to_string(),
            token_ttl_secs: 60,
        };
        assert!(auth.validate().is_ok());
    }

    #[test]
    fn test_for_testing_has_auth() {
        let config = AppConfig::for_testing(std::path::Path::new("/tmp/x"));
        assert!(config.auth().is_ok());
        config.auth().unwrap().validate().unwrap();
    }
}
