//! Engine-level tests for the upload coordinator and startup reconciler.

use bytes::Bytes;
use stash_coordination::{CoordinationStore, MemoryCoordination, Tombstone};
use stash_core::content::InitStatus;
use stash_core::{ContentHash, TombstoneStatus};
use stash_metadata::{
    FileMetaRepo as _, MetadataStore, SqliteStore, UserContentRepo as _, UserRepo as _,
};
use stash_server::reconcile::rebuild_tombstones;
use stash_server::{ChunkOutcome, UploadCoordinator, UploadError};
use stash_storage::{BlobStore, FilesystemStore};
use std::sync::Arc;

struct Engine {
    storage: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    coordination: Arc<dyn CoordinationStore>,
    coordinator: Arc<UploadCoordinator>,
    _temp: tempfile::TempDir,
}

impl Engine {
    async fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemStore::new(temp.path().join("blobs"), temp.path().join("tmp"))
                .await
                .unwrap(),
        );
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(temp.path().join("stash.db")).await.unwrap(),
        );
        let coordination: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordination::new());
        let coordinator = Arc::new(UploadCoordinator::new(
            storage.clone(),
            metadata.clone(),
            coordination.clone(),
        ));
        Self {
            storage,
            metadata,
            coordination,
            coordinator,
            _temp: temp,
        }
    }

    /// Swap in a fresh, empty coordination store, as after a restart.
    fn restart_coordination(&mut self) {
        let coordination: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordination::new());
        self.coordination = coordination.clone();
        self.coordinator = Arc::new(UploadCoordinator::new(
            self.storage.clone(),
            self.metadata.clone(),
            coordination,
        ));
    }

    async fn user(&self, name: &str) -> i64 {
        self.metadata
            .create_user(name, "hash", time::OffsetDateTime::now_utc())
            .await
            .unwrap()
            .user_id
    }

    /// Refcount invariant: `file_metas.ref_count` equals the number of
    /// COMPLETED rows for the hash, and the blob exists iff it is positive.
    async fn assert_refcount_invariant(&self, hash: &ContentHash, users: &[i64]) {
        let mut completed = 0i64;
        for &user in users {
            if let Some(uc) = self
                .metadata
                .get_user_content_by_hash(user, hash.as_str())
                .await
                .unwrap()
            {
                if uc.status == 1 {
                    completed += 1;
                }
            }
        }

        let ref_count = self
            .metadata
            .get_file_meta(hash.as_str())
            .await
            .unwrap()
            .map(|meta| meta.ref_count)
            .unwrap_or(0);
        assert_eq!(ref_count, completed, "refcount diverged from COMPLETED rows");

        let blob_exists = self.storage.exists(hash).await.unwrap();
        assert_eq!(blob_exists, ref_count > 0, "blob presence diverged from refcount");
    }
}

async fn stage_all(engine: &Engine, user: i64, hash: &ContentHash, data: &[u8], chunks: usize) {
    let chunk_size = data.len().div_ceil(chunks);
    for (index, chunk) in data.chunks(chunk_size).enumerate() {
        let outcome = engine
            .coordinator
            .upload_chunk(user, hash, index as u32, Bytes::copy_from_slice(chunk))
            .await
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::Uploaded);
    }
}

#[tokio::test]
async fn concurrent_merges_have_one_effect() {
    let engine = Engine::new().await;
    let user = engine.user("alice").await;
    let data = b"contended merge payload".to_vec();
    let hash = ContentHash::compute(&data);

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    stage_all(&engine, user, &hash, &data, 2).await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let coordinator = engine.coordinator.clone();
        let hash = hash.clone();
        let content_id = init.content_id;
        handles.push(tokio::spawn(async move {
            coordinator.merge(user, content_id, "a.mp4", &hash, 2).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(merged) => {
                successes += 1;
                assert_eq!(merged.size, data.len() as u64);
            }
            // Losers that ran after the scratch dir was cleared but before
            // the tombstone landed fail cleanly.
            Err(UploadError::MissingChunks(_)) => {}
            Err(other) => panic!("unexpected merge error: {other}"),
        }
    }
    assert!(successes >= 1);

    // Exactly one COMPLETED transition, one refcount.
    engine.assert_refcount_invariant(&hash, &[user]).await;
    let meta = engine
        .metadata
        .get_file_meta(hash.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.ref_count, 1);
}

#[tokio::test]
async fn merge_after_completion_is_idempotent() {
    let engine = Engine::new().await;
    let user = engine.user("alice").await;
    let data = b"merge twice".to_vec();
    let hash = ContentHash::compute(&data);

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    stage_all(&engine, user, &hash, &data, 1).await;

    let first = engine
        .coordinator
        .merge(user, init.content_id, "a.mp4", &hash, 1)
        .await
        .unwrap();
    let second = engine
        .coordinator
        .merge(user, init.content_id, "a.mp4", &hash, 1)
        .await
        .unwrap();
    assert_eq!(first.size, second.size);

    engine.assert_refcount_invariant(&hash, &[user]).await;
}

#[tokio::test]
async fn completed_tombstone_rejects_chunks() {
    let engine = Engine::new().await;
    let user = engine.user("alice").await;
    let data = b"sealed".to_vec();
    let hash = ContentHash::compute(&data);

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    stage_all(&engine, user, &hash, &data, 1).await;
    engine
        .coordinator
        .merge(user, init.content_id, "a.mp4", &hash, 1)
        .await
        .unwrap();

    let err = engine
        .coordinator
        .upload_chunk(user, &hash, 5, Bytes::from_static(b"straggler"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::AlreadyCompleted));
}

#[tokio::test]
async fn stale_completed_tombstone_is_repaired() {
    let engine = Engine::new().await;
    let user = engine.user("alice").await;
    let hash = ContentHash::compute(b"phantom blob");

    // A completed tombstone with no blob behind it.
    let tombstone = Tombstone::new(user, hash.clone(), 42, TombstoneStatus::Completed);
    engine
        .coordination
        .put_tombstone(&tombstone, None)
        .await
        .unwrap();

    // Init repairs: the stale tombstone is dropped and a session opens.
    let response = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    assert_eq!(response.status, InitStatus::New);
    assert!(engine
        .coordination
        .get_tombstone(user, &hash)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn restart_fences_inflight_sessions() {
    let mut engine = Engine::new().await;
    let user = engine.user("alice").await;
    let data = b"interrupted by restart".to_vec();
    let hash = ContentHash::compute(&data);

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    assert_eq!(init.status, InitStatus::New);
    engine
        .coordinator
        .upload_chunk(user, &hash, 0, Bytes::from_static(b"partial"))
        .await
        .unwrap();

    // Restart: the coordination store is wiped, then rebuilt from metadata.
    engine.restart_coordination();
    let published = rebuild_tombstones(&engine.metadata, &engine.storage, &engine.coordination)
        .await
        .unwrap();
    assert_eq!(published, 1);

    // The stale in-flight session is fenced off.
    let err = engine
        .coordinator
        .upload_chunk(user, &hash, 1, Bytes::from_static(b"more"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Cancelled));

    // A fresh init clears the fence; the staged chunk is still there, so the
    // session resumes rather than restarting from zero.
    let response = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    assert_eq!(response.status, InitStatus::Resumable);
    assert_eq!(response.uploaded_chunks, vec![0]);

    let outcome = engine
        .coordinator
        .upload_chunk(user, &hash, 1, Bytes::from_static(b"more"))
        .await
        .unwrap();
    assert_eq!(outcome, ChunkOutcome::Uploaded);
}

#[tokio::test]
async fn restart_preserves_fast_upload() {
    let mut engine = Engine::new().await;
    let user = engine.user("alice").await;
    let data = b"survives restarts".to_vec();
    let hash = ContentHash::compute(&data);

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    stage_all(&engine, user, &hash, &data, 1).await;
    engine
        .coordinator
        .merge(user, init.content_id, "a.mp4", &hash, 1)
        .await
        .unwrap();

    engine.restart_coordination();
    rebuild_tombstones(&engine.metadata, &engine.storage, &engine.coordination)
        .await
        .unwrap();

    let response = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    assert_eq!(response.status, InitStatus::FastUpload);
    assert_eq!(response.content_id, init.content_id);
}

#[tokio::test]
async fn reconciler_skips_completed_rows_without_blob() {
    let engine = Engine::new().await;
    let user = engine.user("alice").await;
    let data = b"blob that will vanish".to_vec();
    let hash = ContentHash::compute(&data);

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    stage_all(&engine, user, &hash, &data, 1).await;
    engine
        .coordinator
        .merge(user, init.content_id, "a.mp4", &hash, 1)
        .await
        .unwrap();

    // The blob disappears out from under the metadata.
    engine.storage.delete(&hash).await.unwrap();

    let fresh: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordination::new());
    let published = rebuild_tombstones(&engine.metadata, &engine.storage, &fresh)
        .await
        .unwrap();
    assert_eq!(published, 0);
    assert!(fresh.get_tombstone(user, &hash).await.unwrap().is_none());
}

#[tokio::test]
async fn mixed_operations_keep_refcount_invariant() {
    let engine = Engine::new().await;
    let alice = engine.user("alice").await;
    let bob = engine.user("bob").await;
    let users = [alice, bob];

    let data = b"dedup invariant workload".to_vec();
    let hash = ContentHash::compute(&data);

    // Alice uploads.
    let init = engine.coordinator.init(alice, "a.mp4", &hash).await.unwrap();
    stage_all(&engine, alice, &hash, &data, 2).await;
    engine
        .coordinator
        .merge(alice, init.content_id, "a.mp4", &hash, 2)
        .await
        .unwrap();
    engine.assert_refcount_invariant(&hash, &users).await;

    // Bob adopts via init-side dedup.
    let response = engine.coordinator.init(bob, "b.mp4", &hash).await.unwrap();
    assert_eq!(response.status, InitStatus::FastUpload);
    engine.assert_refcount_invariant(&hash, &users).await;

    // Repeated fast upload does not inflate the count.
    engine
        .coordinator
        .fast_upload(bob, response.content_id, "b.mp4", &hash)
        .await
        .unwrap();
    engine.assert_refcount_invariant(&hash, &users).await;

    // Deletes walk the count down and finally release the blob.
    engine.coordinator.delete(alice, &hash).await.unwrap();
    engine.assert_refcount_invariant(&hash, &users).await;

    engine.coordinator.delete(bob, &hash).await.unwrap();
    engine.assert_refcount_invariant(&hash, &users).await;
    assert!(!engine.storage.exists(&hash).await.unwrap());

    // The hash is uploadable again from scratch.
    let response = engine.coordinator.init(alice, "a.mp4", &hash).await.unwrap();
    assert_eq!(response.status, InitStatus::New);
}

#[tokio::test]
async fn cancel_without_chunks_is_clean() {
    let engine = Engine::new().await;
    let user = engine.user("alice").await;
    let hash = ContentHash::compute(b"never uploaded");

    let init = engine.coordinator.init(user, "a.mp4", &hash).await.unwrap();
    engine
        .coordinator
        .cancel(user, init.content_id, &hash)
        .await
        .unwrap();

    let tombstone = engine
        .coordination
        .get_tombstone(user, &hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tombstone.status, TombstoneStatus::Cancelled);

    let uc = engine
        .metadata
        .get_user_content(user, init.content_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(uc.status, -1);
}
