//! Local filesystem blob store.
//!
//! Layout:
//! - published blobs: `base/{hash}`
//! - staged chunks:   `temp/{user_id}/{hash}/{index}.part`
//!
//! Keys are validated `ContentHash` values and numeric user ids, so paths are
//! always a single safe component below the roots.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, ByteStream, MergedBlob};
use async_trait::async_trait;
use bytes::Bytes;
use stash_core::ContentHash;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Filename suffix of a fully staged chunk.
const PART_SUFFIX: &str = ".part";

/// Local filesystem blob store.
pub struct FilesystemStore {
    base: PathBuf,
    temp: PathBuf,
}

impl FilesystemStore {
    /// Create a new filesystem store, creating both roots if needed.
    pub async fn new(base: impl AsRef<Path>, temp: impl AsRef<Path>) -> StorageResult<Self> {
        let base = base.as_ref().to_path_buf();
        let temp = temp.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        fs::create_dir_all(&temp).await?;
        Ok(Self { base, temp })
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.base.join(hash.as_str())
    }

    fn scratch_dir(&self, user_id: i64, hash: &ContentHash) -> PathBuf {
        self.temp.join(user_id.to_string()).join(hash.as_str())
    }

    fn chunk_path(&self, user_id: i64, hash: &ContentHash, index: u32) -> PathBuf {
        self.scratch_dir(user_id, hash)
            .join(format!("{index}{PART_SUFFIX}"))
    }

    async fn open_blob(&self, hash: &ContentHash) -> StorageResult<fs::File> {
        fs::File::open(self.blob_path(hash)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(hash.to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }
}

#[async_trait]
impl BlobStore for FilesystemStore {
    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn write_chunk(
        &self,
        user_id: i64,
        hash: &ContentHash,
        index: u32,
        data: Bytes,
    ) -> StorageResult<()> {
        if data.is_empty() {
            return Err(StorageError::EmptyChunk);
        }

        let dir = self.scratch_dir(user_id, hash);
        fs::create_dir_all(&dir).await?;

        let final_path = self.chunk_path(user_id, hash, index);
        let temp_path = final_path.with_extension("part.tmp");

        // Write to temp, fsync, then rename so a crash never leaves a
        // half-written chunk under the final name.
        {
            let mut file = fs::File::create(&temp_path).await?;
            if let Err(e) = file.write_all(&data).await {
                drop(file);
                let _ = fs::remove_file(&temp_path).await;
                return Err(StorageError::Io(e));
            }
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &final_path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list_chunks(&self, user_id: i64, hash: &ContentHash) -> StorageResult<Vec<u32>> {
        let dir = self.scratch_dir(user_id, hash);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(PART_SUFFIX) {
                if let Ok(index) = stem.parse::<u32>() {
                    chunks.push(index);
                }
            }
        }

        chunks.sort_unstable();
        Ok(chunks)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn merge_chunks(
        &self,
        user_id: i64,
        hash: &ContentHash,
        total_chunks: u32,
    ) -> StorageResult<MergedBlob> {
        let dest = self.blob_path(hash);
        let temp_dest = dest.with_extension("tmp");

        let result: StorageResult<u64> = async {
            let mut out = fs::File::create(&temp_dest).await?;
            let mut total_size: u64 = 0;

            for index in 0..total_chunks {
                let chunk_path = self.chunk_path(user_id, hash, index);
                let mut part = match fs::File::open(&chunk_path).await {
                    Ok(file) => file,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        return Err(StorageError::ChunkMissing {
                            hash: hash.to_string(),
                            index,
                        });
                    }
                    Err(e) => return Err(StorageError::Io(e)),
                };
                total_size += tokio::io::copy(&mut part, &mut out).await?;
            }

            out.sync_all().await?;
            Ok(total_size)
        }
        .await;

        let total_size = match result {
            Ok(size) => size,
            Err(e) => {
                // The interrupted `.tmp` is never visible via the final name;
                // remove it so the next attempt starts clean.
                let _ = fs::remove_file(&temp_dest).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_dest, &dest).await {
            let _ = fs::remove_file(&temp_dest).await;
            return Err(StorageError::Io(e));
        }

        self.cleanup_chunks(user_id, hash).await?;

        Ok(MergedBlob {
            path: dest.to_string_lossy().into_owned(),
            size: total_size,
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn cleanup_chunks(&self, user_id: i64, hash: &ContentHash) -> StorageResult<()> {
        let dir = self.scratch_dir(user_id, hash);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn blob_size(&self, hash: &ContentHash) -> StorageResult<u64> {
        let metadata = fs::metadata(self.blob_path(hash)).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(hash.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(metadata.len())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, hash: &ContentHash) -> StorageResult<ByteStream> {
        let file = self.open_blob(hash).await?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_range_stream(
        &self,
        hash: &ContentHash,
        start: u64,
        end: u64,
    ) -> StorageResult<ByteStream> {
        if end < start {
            return Err(StorageError::InvalidRange(format!(
                "end ({end}) < start ({start})"
            )));
        }

        let mut file = self.open_blob(hash).await?;
        file.seek(std::io::SeekFrom::Start(start)).await?;
        let mut remaining = end - start + 1;

        let stream = async_stream::try_stream! {
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            while remaining > 0 {
                let want = remaining.min(STREAM_CHUNK_SIZE as u64) as usize;
                let n = file.read(&mut buf[..want]).await?;
                if n == 0 {
                    break;
                }
                remaining -= n as u64;
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, hash: &ContentHash) -> StorageResult<bool> {
        fs::try_exists(self.blob_path(hash))
            .await
            .map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, hash: &ContentHash) -> StorageResult<()> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        fs::metadata(&self.base).await?;
        fs::metadata(&self.temp).await?;
        Ok(())
    }
}
