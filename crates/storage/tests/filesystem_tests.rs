//! Filesystem blob store tests.

use bytes::Bytes;
use futures::StreamExt;
use stash_core::ContentHash;
use stash_storage::{BlobStore, ByteStream, FilesystemStore, StorageError};
use tempfile::tempdir;

async fn collect(mut stream: ByteStream) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

async fn new_store(temp: &tempfile::TempDir) -> FilesystemStore {
    FilesystemStore::new(temp.path().join("blobs"), temp.path().join("tmp"))
        .await
        .unwrap()
}

fn hash_of(data: &[u8]) -> ContentHash {
    ContentHash::compute(data)
}

#[tokio::test]
async fn write_and_list_chunks() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"abc");

    store
        .write_chunk(1, &hash, 2, Bytes::from_static(b"cc"))
        .await
        .unwrap();
    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"aa"))
        .await
        .unwrap();

    let chunks = store.list_chunks(1, &hash).await.unwrap();
    assert_eq!(chunks, vec![0, 2]);
}

#[tokio::test]
async fn list_chunks_empty_session() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let chunks = store.list_chunks(42, &hash_of(b"nothing")).await.unwrap();
    assert!(chunks.is_empty());
}

#[tokio::test]
async fn empty_chunk_rejected() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let err = store
        .write_chunk(1, &hash_of(b"x"), 0, Bytes::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::EmptyChunk));
}

#[tokio::test]
async fn chunk_rewrite_is_idempotent() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"dup");

    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"payload"))
        .await
        .unwrap();
    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"payload"))
        .await
        .unwrap();

    assert_eq!(store.list_chunks(1, &hash).await.unwrap(), vec![0]);
}

#[tokio::test]
async fn merge_concatenates_in_index_order() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let data = b"aaabbbccc";
    let hash = hash_of(data);

    // Written out of order; merge must still produce 0,1,2.
    store
        .write_chunk(7, &hash, 1, Bytes::from_static(b"bbb"))
        .await
        .unwrap();
    store
        .write_chunk(7, &hash, 0, Bytes::from_static(b"aaa"))
        .await
        .unwrap();
    store
        .write_chunk(7, &hash, 2, Bytes::from_static(b"ccc"))
        .await
        .unwrap();

    let merged = store.merge_chunks(7, &hash, 3).await.unwrap();
    assert_eq!(merged.size, data.len() as u64);

    assert!(store.exists(&hash).await.unwrap());
    assert_eq!(store.blob_size(&hash).await.unwrap(), data.len() as u64);
    let body = collect(store.get_stream(&hash).await.unwrap()).await;
    assert_eq!(body, data);

    // Scratch area is gone after a successful merge.
    assert!(store.list_chunks(7, &hash).await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_missing_chunk_fails_and_keeps_scratch() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"partial");

    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"aa"))
        .await
        .unwrap();
    store
        .write_chunk(1, &hash, 2, Bytes::from_static(b"cc"))
        .await
        .unwrap();

    let err = store.merge_chunks(1, &hash, 3).await.unwrap_err();
    match err {
        StorageError::ChunkMissing { index, .. } => assert_eq!(index, 1),
        other => panic!("unexpected error: {other:?}"),
    }

    // Nothing published, staged chunks still there for a retry.
    assert!(!store.exists(&hash).await.unwrap());
    assert_eq!(store.list_chunks(1, &hash).await.unwrap(), vec![0, 2]);
}

#[tokio::test]
async fn scratch_areas_are_per_user() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"shared");

    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"user1"))
        .await
        .unwrap();
    store
        .write_chunk(2, &hash, 1, Bytes::from_static(b"user2"))
        .await
        .unwrap();

    assert_eq!(store.list_chunks(1, &hash).await.unwrap(), vec![0]);
    assert_eq!(store.list_chunks(2, &hash).await.unwrap(), vec![1]);
}

#[tokio::test]
async fn range_stream_returns_exact_bytes() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let data: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    let hash = hash_of(&data);

    store
        .write_chunk(1, &hash, 0, Bytes::from(data.clone()))
        .await
        .unwrap();
    store.merge_chunks(1, &hash, 1).await.unwrap();

    for (start, end) in [(0u64, 0u64), (0, 99_999), (65_536, 131_071), (199_999, 199_999)] {
        let body = collect(store.get_range_stream(&hash, start, end).await.unwrap()).await;
        assert_eq!(body.len() as u64, end - start + 1);
        assert_eq!(body, &data[start as usize..=end as usize]);
    }
}

#[tokio::test]
async fn range_stream_rejects_inverted_bounds() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"data");
    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"data"))
        .await
        .unwrap();
    store.merge_chunks(1, &hash, 1).await.unwrap();

    let err = match store.get_range_stream(&hash, 3, 1).await {
        Err(e) => e,
        Ok(_) => panic!("expected get_range_stream to reject inverted bounds"),
    };
    assert!(matches!(err, StorageError::InvalidRange(_)));
}

#[tokio::test]
async fn delete_is_tolerant_of_missing_blob() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"gone");

    store.delete(&hash).await.unwrap();

    store
        .write_chunk(1, &hash, 0, Bytes::from_static(b"gone"))
        .await
        .unwrap();
    store.merge_chunks(1, &hash, 1).await.unwrap();
    assert!(store.exists(&hash).await.unwrap());

    store.delete(&hash).await.unwrap();
    assert!(!store.exists(&hash).await.unwrap());

    let err = store.blob_size(&hash).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn cleanup_removes_scratch_dir() {
    let temp = tempdir().unwrap();
    let store = new_store(&temp).await;
    let hash = hash_of(b"cancelme");

    store
        .write_chunk(3, &hash, 0, Bytes::from_static(b"a"))
        .await
        .unwrap();
    store
        .write_chunk(3, &hash, 1, Bytes::from_static(b"b"))
        .await
        .unwrap();

    store.cleanup_chunks(3, &hash).await.unwrap();
    assert!(store.list_chunks(3, &hash).await.unwrap().is_empty());

    // Cleaning an already-clean session is fine.
    store.cleanup_chunks(3, &hash).await.unwrap();
}
