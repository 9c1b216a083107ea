//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{
    ContentRepo, FileMetaRepo, ReconcileRepo, UploadRepo, UserContentRepo, UserRepo,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    UserRepo + ContentRepo + FileMetaRepo + UserContentRepo + UploadRepo + ReconcileRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    user_id        INTEGER PRIMARY KEY AUTOINCREMENT,
    username       TEXT NOT NULL UNIQUE,
    password_hash  TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contents (
    content_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id     INTEGER NOT NULL REFERENCES users(user_id),
    source_hash  TEXT NOT NULL DEFAULT '',
    title        TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_contents_owner ON contents(owner_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_contents_owner_hash
    ON contents(owner_id, source_hash) WHERE source_hash != '';

CREATE TABLE IF NOT EXISTS file_metas (
    file_hash    TEXT PRIMARY KEY,
    content_id   INTEGER NOT NULL,
    file_path    TEXT NOT NULL,
    file_size    INTEGER NOT NULL,
    format       TEXT,
    video_codec  TEXT,
    audio_codec  TEXT,
    ref_count    INTEGER NOT NULL DEFAULT 0,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS user_contents (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES users(user_id),
    content_id  INTEGER NOT NULL REFERENCES contents(content_id),
    file_name   TEXT NOT NULL,
    file_hash   TEXT NOT NULL DEFAULT '',
    status      INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE(user_id, content_id)
);
CREATE INDEX IF NOT EXISTS idx_user_contents_user ON user_contents(user_id);
CREATE INDEX IF NOT EXISTS idx_user_contents_hash ON user_contents(user_id, file_hash);
"#;

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // avoids persistent "database is locked" failures under axum
            // concurrency, and gives the transactions below their row-lock
            // semantics: a transaction holds the sole writer.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn is_unique_violation(e: &sqlx::Error) -> bool {
        match e {
            sqlx::Error::Database(db) => db.message().contains("UNIQUE constraint"),
            _ => false,
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(e: std::io::Error) -> Self {
        MetadataError::Internal(format!("filesystem error: {e}"))
    }
}

mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;

    #[async_trait]
    impl UserRepo for SqliteStore {
        async fn create_user(
            &self,
            username: &str,
            password_hash: &str,
            created_at: OffsetDateTime,
        ) -> MetadataResult<UserRow> {
            let result = sqlx::query(
                "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
            )
            .bind(username)
            .bind(password_hash)
            .bind(created_at)
            .execute(&self.pool)
            .await;

            let result = match result {
                Ok(result) => result,
                Err(e) if Self::is_unique_violation(&e) => {
                    return Err(MetadataError::AlreadyExists(format!(
                        "username '{username}' already exists"
                    )));
                }
                Err(e) => return Err(e.into()),
            };

            Ok(UserRow {
                user_id: result.last_insert_rowid(),
                username: username.to_string(),
                password_hash: password_hash.to_string(),
                created_at,
            })
        }

        async fn get_user_by_username(&self, username: &str) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_user(&self, user_id: i64) -> MetadataResult<Option<UserRow>> {
            let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl ContentRepo for SqliteStore {
        async fn get_content(
            &self,
            owner_id: i64,
            content_id: i64,
        ) -> MetadataResult<Option<ContentRow>> {
            let row = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM contents WHERE content_id = ? AND owner_id = ?",
            )
            .bind(content_id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_contents(&self, owner_id: i64) -> MetadataResult<Vec<ContentRow>> {
            let rows = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM contents WHERE owner_id = ? ORDER BY created_at DESC, content_id DESC",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl FileMetaRepo for SqliteStore {
        async fn get_file_meta(&self, file_hash: &str) -> MetadataResult<Option<FileMetaRow>> {
            let row =
                sqlx::query_as::<_, FileMetaRow>("SELECT * FROM file_metas WHERE file_hash = ?")
                    .bind(file_hash)
                    .fetch_optional(&self.pool)
                    .await?;
            Ok(row)
        }

        async fn file_meta_hashes(&self) -> MetadataResult<Vec<String>> {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT file_hash FROM file_metas")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows.into_iter().map(|(h,)| h).collect())
        }
    }

    #[async_trait]
    impl UserContentRepo for SqliteStore {
        async fn get_user_content_by_hash(
            &self,
            user_id: i64,
            file_hash: &str,
        ) -> MetadataResult<Option<UserContentRow>> {
            // Pick the most recent row deterministically if a user somehow
            // holds several contents for the same hash.
            let row = sqlx::query_as::<_, UserContentRow>(
                "SELECT * FROM user_contents WHERE user_id = ? AND file_hash = ? \
                 ORDER BY created_at DESC, id DESC LIMIT 1",
            )
            .bind(user_id)
            .bind(file_hash)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn get_user_content(
            &self,
            user_id: i64,
            content_id: i64,
        ) -> MetadataResult<Option<UserContentRow>> {
            let row = sqlx::query_as::<_, UserContentRow>(
                "SELECT * FROM user_contents WHERE user_id = ? AND content_id = ?",
            )
            .bind(user_id)
            .bind(content_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn list_user_contents(&self, user_id: i64) -> MetadataResult<Vec<UserContentRow>> {
            let rows = sqlx::query_as::<_, UserContentRow>(
                "SELECT * FROM user_contents WHERE user_id = ? ORDER BY created_at DESC, id DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn cancel_uploading(
            &self,
            user_id: i64,
            content_id: i64,
            updated_at: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let result = sqlx::query(
                "UPDATE user_contents SET status = -1, updated_at = ? \
                 WHERE user_id = ? AND content_id = ? AND status = 0",
            )
            .bind(updated_at)
            .bind(user_id)
            .bind(content_id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }
    }

    #[async_trait]
    impl ReconcileRepo for SqliteStore {
        async fn reconciliation_rows(&self) -> MetadataResult<Vec<ReconcileRow>> {
            let rows = sqlx::query_as::<_, ReconcileRow>(
                "SELECT user_id, file_hash, content_id, status FROM user_contents \
                 WHERE file_hash != ''",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn begin_upload(
            &self,
            user_id: i64,
            file_name: &str,
            file_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;

            let content = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM contents WHERE owner_id = ? AND source_hash = ?",
            )
            .bind(user_id)
            .bind(file_hash)
            .fetch_optional(&mut *tx)
            .await?;

            let content_id = match content {
                Some(content) => content.content_id,
                None => {
                    let result = sqlx::query(
                        "INSERT INTO contents (owner_id, source_hash, title, created_at) \
                         VALUES (?, ?, ?, ?)",
                    )
                    .bind(user_id)
                    .bind(file_hash)
                    .bind(file_name)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    result.last_insert_rowid()
                }
            };

            let existing = sqlx::query_as::<_, UserContentRow>(
                "SELECT * FROM user_contents WHERE user_id = ? AND content_id = ?",
            )
            .bind(user_id)
            .bind(content_id)
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                Some(_) => {
                    // Re-init clears a previous CANCELLED (or stale) state.
                    sqlx::query(
                        "UPDATE user_contents SET status = 0, file_name = ?, file_hash = ?, \
                         updated_at = ? WHERE user_id = ? AND content_id = ?",
                    )
                    .bind(file_name)
                    .bind(file_hash)
                    .bind(now)
                    .bind(user_id)
                    .bind(content_id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO user_contents \
                         (user_id, content_id, file_name, file_hash, status, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, 0, ?, ?)",
                    )
                    .bind(user_id)
                    .bind(content_id)
                    .bind(file_name)
                    .bind(file_hash)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            tx.commit().await?;
            Ok(content_id)
        }

        async fn finish_merge(
            &self,
            user_id: i64,
            content_id: i64,
            file_name: &str,
            file_hash: &str,
            file_path: &str,
            file_size: i64,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            let session = sqlx::query_as::<_, UserContentRow>(
                "SELECT * FROM user_contents WHERE user_id = ? AND content_id = ?",
            )
            .bind(user_id)
            .bind(content_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                MetadataError::NotFound(format!(
                    "no upload session for user {user_id}, content {content_id}"
                ))
            })?;

            // Repeated merges for an already-COMPLETED session must not bump
            // the refcount again.
            let already_counted = session.status == 1 && session.file_hash == file_hash;

            let meta = sqlx::query_as::<_, FileMetaRow>(
                "SELECT * FROM file_metas WHERE file_hash = ?",
            )
            .bind(file_hash)
            .fetch_optional(&mut *tx)
            .await?;

            match meta {
                None => {
                    sqlx::query(
                        "INSERT INTO file_metas \
                         (file_hash, content_id, file_path, file_size, ref_count, created_at) \
                         VALUES (?, ?, ?, ?, 1, ?)",
                    )
                    .bind(file_hash)
                    .bind(content_id)
                    .bind(file_path)
                    .bind(file_size)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(_) if !already_counted => {
                    sqlx::query(
                        "UPDATE file_metas SET ref_count = ref_count + 1 WHERE file_hash = ?",
                    )
                    .bind(file_hash)
                    .execute(&mut *tx)
                    .await?;
                }
                Some(_) => {}
            }

            sqlx::query(
                "UPDATE user_contents SET status = 1, file_name = ?, file_hash = ?, updated_at = ? \
                 WHERE user_id = ? AND content_id = ?",
            )
            .bind(file_name)
            .bind(file_hash)
            .bind(now)
            .bind(user_id)
            .bind(content_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn adopt_for_fast_upload(
            &self,
            user_id: i64,
            content_id: i64,
            file_name: &str,
            file_hash: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;

            // Fast upload only completes by reference; the physical file must
            // already be recorded.
            sqlx::query_as::<_, FileMetaRow>("SELECT * FROM file_metas WHERE file_hash = ?")
                .bind(file_hash)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    MetadataError::NotFound(format!("no file meta for hash {file_hash}"))
                })?;

            // Resolve the content: the caller's own row if the id checks out,
            // otherwise a caller-owned content for this hash. Contents are
            // never shared across users; only file_metas are.
            let owned = sqlx::query_as::<_, ContentRow>(
                "SELECT * FROM contents WHERE content_id = ? AND owner_id = ?",
            )
            .bind(content_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

            let content_id = match owned {
                Some(content) => content.content_id,
                None => {
                    let existing = sqlx::query_as::<_, ContentRow>(
                        "SELECT * FROM contents WHERE owner_id = ? AND source_hash = ?",
                    )
                    .bind(user_id)
                    .bind(file_hash)
                    .fetch_optional(&mut *tx)
                    .await?;
                    match existing {
                        Some(content) => content.content_id,
                        None => {
                            let result = sqlx::query(
                                "INSERT INTO contents (owner_id, source_hash, title, created_at) \
                                 VALUES (?, ?, ?, ?)",
                            )
                            .bind(user_id)
                            .bind(file_hash)
                            .bind(file_name)
                            .bind(now)
                            .execute(&mut *tx)
                            .await?;
                            result.last_insert_rowid()
                        }
                    }
                }
            };

            let existing = sqlx::query_as::<_, UserContentRow>(
                "SELECT * FROM user_contents WHERE user_id = ? AND content_id = ?",
            )
            .bind(user_id)
            .bind(content_id)
            .fetch_optional(&mut *tx)
            .await?;

            let already_counted = existing
                .as_ref()
                .is_some_and(|uc| uc.status == 1 && uc.file_hash == file_hash);

            if !already_counted {
                sqlx::query("UPDATE file_metas SET ref_count = ref_count + 1 WHERE file_hash = ?")
                    .bind(file_hash)
                    .execute(&mut *tx)
                    .await?;
            }

            match existing {
                Some(_) => {
                    sqlx::query(
                        "UPDATE user_contents SET status = 1, file_name = ?, file_hash = ?, \
                         updated_at = ? WHERE user_id = ? AND content_id = ?",
                    )
                    .bind(file_name)
                    .bind(file_hash)
                    .bind(now)
                    .bind(user_id)
                    .bind(content_id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        "INSERT INTO user_contents \
                         (user_id, content_id, file_name, file_hash, status, created_at, updated_at) \
                         VALUES (?, ?, ?, ?, 1, ?, ?)",
                    )
                    .bind(user_id)
                    .bind(content_id)
                    .bind(file_name)
                    .bind(file_hash)
                    .bind(now)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                }
            }

            tx.commit().await?;
            Ok(content_id)
        }

        async fn delete_user_file(
            &self,
            user_id: i64,
            file_hash: &str,
        ) -> MetadataResult<DeleteOutcome> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query("DELETE FROM user_contents WHERE user_id = ? AND file_hash = ?")
                .bind(user_id)
                .bind(file_hash)
                .execute(&mut *tx)
                .await?;
            let rows_deleted = result.rows_affected();

            let meta = sqlx::query_as::<_, FileMetaRow>(
                "SELECT * FROM file_metas WHERE file_hash = ?",
            )
            .bind(file_hash)
            .fetch_optional(&mut *tx)
            .await?;

            if meta.is_none() {
                tx.commit().await?;
                return Ok(DeleteOutcome {
                    rows_deleted,
                    blob_released: false,
                });
            }

            sqlx::query(
                "UPDATE file_metas SET ref_count = MAX(0, ref_count - 1) WHERE file_hash = ?",
            )
            .bind(file_hash)
            .execute(&mut *tx)
            .await?;

            let ref_count: i64 =
                sqlx::query_scalar("SELECT ref_count FROM file_metas WHERE file_hash = ?")
                    .bind(file_hash)
                    .fetch_one(&mut *tx)
                    .await?;

            let blob_released = ref_count <= 0;
            if blob_released {
                sqlx::query("DELETE FROM file_metas WHERE file_hash = ?")
                    .bind(file_hash)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(DeleteOutcome {
                rows_deleted,
                blob_released,
            })
        }
    }
}
