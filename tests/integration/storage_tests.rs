//! Integration tests for the storage layer.
//!
//! FILE paths use temporary directories and CEPH paths an in-memory cluster,
//! so every backend interaction runs without network access.

use super::test_utils::{ceph_storage, file_uri, MemoryCeph};
use rok4_core::error::StorageError;
use rok4_core::{Storage, StorageConfig};
use tempfile::TempDir;

fn config() -> StorageConfig {
    StorageConfig::default()
}

// =============================================================================
// CEPH
// =============================================================================

#[tokio::test]
async fn test_ceph_write_read() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());

    storage
        .write_string("ceph://pool/dir/object.txt", "hello ceph")
        .await
        .unwrap();

    assert_eq!(ceph.pool("pool").object("dir/object.txt").unwrap(), b"hello ceph");
    assert_eq!(
        storage.read_string("ceph://pool/dir/object.txt").await.unwrap(),
        "hello ceph"
    );
    assert_eq!(
        storage.read_range("ceph://pool/dir/object.txt", 6, 4).await.unwrap().as_ref(),
        b"ceph"
    );
    assert_eq!(storage.size("ceph://pool/dir/object.txt").await.unwrap(), 10);
}

#[tokio::test]
async fn test_ceph_open_ended_range() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());
    ceph.pool("pool").put("object", b"0123456789".to_vec());

    assert_eq!(
        storage.read_range("ceph://pool/object", 2, u64::MAX).await.unwrap().as_ref(),
        b"23456789"
    );
    assert!(storage.read_range("ceph://pool/object", 20, u64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ceph_exists_and_remove() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());
    ceph.pool("pool").put("object", b"data".to_vec());

    assert!(storage.exists("ceph://pool/object").await.unwrap());
    assert!(!storage.exists("ceph://pool/other").await.unwrap());

    storage.remove("ceph://pool/object").await.unwrap();
    assert!(ceph.pool("pool").object("object").is_none());

    // Removing twice is not an error
    storage.remove("ceph://pool/object").await.unwrap();
}

#[tokio::test]
async fn test_ceph_missing_object() {
    let storage = ceph_storage(MemoryCeph::new(), config());

    let err = storage.read_all("ceph://pool/missing").await.unwrap_err();
    assert!(err.is_not_found());

    let err = storage.size("ceph://pool/missing").await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn test_ceph_without_connector() {
    let storage = Storage::new(config());

    let err = storage.read_all("ceph://pool/object").await.unwrap_err();
    assert!(matches!(err, StorageError::MissingEnvironment(_)));
}

#[tokio::test]
async fn test_ceph_link() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());

    storage
        .link("ceph://pool/PYR/DATA_0_1_2", "ceph://pool/LINKED/DATA_0_1_2", false)
        .await
        .unwrap();

    let body = ceph.pool("pool").object("LINKED/DATA_0_1_2").unwrap();
    assert_eq!(String::from_utf8(body).unwrap(), "SYMLINK#pool/PYR/DATA_0_1_2");
}

#[tokio::test]
async fn test_ceph_hard_link_rejected() {
    let storage = ceph_storage(MemoryCeph::new(), config());

    let err = storage
        .link("ceph://pool/a", "ceph://pool/b", true)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Backend { .. }));
}

#[tokio::test]
async fn test_disconnect_reopens_pools() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());
    ceph.pool("pool").put("object", b"data".to_vec());

    storage.exists("ceph://pool/object").await.unwrap();
    storage.exists("ceph://pool/object").await.unwrap();
    assert_eq!(ceph.open_count(), 1);

    storage.disconnect().await;
    storage.exists("ceph://pool/object").await.unwrap();
    assert_eq!(ceph.open_count(), 2);
}

// =============================================================================
// Copy
// =============================================================================

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

#[tokio::test]
async fn test_copy_file_to_ceph_with_md5() {
    let dir = TempDir::new().unwrap();
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());

    let source = file_uri(&dir, "hello.txt");
    storage.write_string(&source, "hello").await.unwrap();

    storage
        .copy(&source, "ceph://pool/hello.txt", Some(HELLO_MD5))
        .await
        .unwrap();
    assert_eq!(ceph.pool("pool").object("hello.txt").unwrap(), b"hello");
}

#[tokio::test]
async fn test_copy_ceph_to_file_with_md5() {
    let dir = TempDir::new().unwrap();
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());
    ceph.pool("pool").put("hello.txt", b"hello".to_vec());

    let destination = file_uri(&dir, "out/hello.txt");
    storage
        .copy("ceph://pool/hello.txt", &destination, Some(HELLO_MD5))
        .await
        .unwrap();

    assert_eq!(storage.read_string(&destination).await.unwrap(), "hello");
}

#[tokio::test]
async fn test_copy_checksum_mismatch() {
    let dir = TempDir::new().unwrap();
    let storage = ceph_storage(MemoryCeph::new(), config());

    let source = file_uri(&dir, "hello.txt");
    storage.write_string(&source, "hello").await.unwrap();

    let err = storage
        .copy(&source, "ceph://pool/hello.txt", Some("00000000000000000000000000000000"))
        .await
        .unwrap_err();

    match err {
        StorageError::ChecksumMismatch { expected, actual, .. } => {
            assert_eq!(expected, "00000000000000000000000000000000");
            assert_eq!(actual, HELLO_MD5);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_copy_between_pools_in_chunks() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());

    let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    ceph.pool("src").put("big", content.clone());

    storage
        .copy("ceph://src/big", "ceph://dst/big", None)
        .await
        .unwrap();

    assert_eq!(ceph.pool("dst").object("big").unwrap(), content);
    assert!(ceph.pool("dst").write_count() > 1);
}

#[tokio::test]
async fn test_copy_to_http_rejected() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(config());

    let source = file_uri(&dir, "hello.txt");
    storage.write_string(&source, "hello").await.unwrap();

    let err = storage
        .copy(&source, "https://example.com/hello.txt", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotImplemented(_)));
}

// =============================================================================
// S3 clusters
// =============================================================================

fn two_clusters() -> StorageConfig {
    StorageConfig {
        s3_keys: Some(vec!["key1".to_string(), "key2".to_string()]),
        s3_secret_keys: Some(vec!["secret1".to_string(), "secret2".to_string()]),
        s3_urls: Some(vec![
            "http://s3-one.local:9000".to_string(),
            "http://s3-two.local:9000".to_string(),
        ]),
        ..StorageConfig::default()
    }
}

#[tokio::test]
async fn test_s3_cross_cluster_link_rejected() {
    let storage = Storage::new(two_clusters());

    let err = storage
        .link(
            "s3://bucket@s3-one.local:9000/target",
            "s3://bucket@s3-two.local:9000/link",
            false,
        )
        .await
        .unwrap_err();

    match err {
        StorageError::Backend { kind, detail } => {
            assert_eq!(kind, "S3");
            assert!(detail.contains("same S3 cluster"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_s3_cluster_resolution() {
    let storage = Storage::new(two_clusters());
    let clients = storage.clients();

    let default = clients.resolve_bucket("bucket").await.unwrap();
    assert_eq!(default.host, "s3-one.local:9000");
    assert_eq!(default.bucket, "bucket");

    let second = clients.resolve_bucket("bucket@s3-two.local:9000").await.unwrap();
    assert_eq!(second.host, "s3-two.local:9000");

    assert!(clients.resolve_bucket("bucket@unknown:9000").await.is_err());
}

#[tokio::test]
async fn test_upload_missing_file_to_s3() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(two_clusters());

    let err = storage
        .copy(&file_uri(&dir, "missing.tif"), "s3://bucket/missing.tif", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_s3_missing_environment() {
    let storage = Storage::new(config());

    let err = storage.read_all("s3://bucket/object").await.unwrap_err();
    assert!(matches!(err, StorageError::MissingEnvironment(_)));
}

#[tokio::test]
async fn test_mixed_backend_link_rejected() {
    let storage = ceph_storage(MemoryCeph::new(), config());

    let err = storage
        .link("ceph://pool/target", "file:///tmp/link", false)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Backend { .. }));
}

// =============================================================================
// FILE and read cache
// =============================================================================

#[tokio::test]
async fn test_file_symbolic_link() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(config());

    let target = file_uri(&dir, "target.txt");
    let link = file_uri(&dir, "links/link.txt");
    storage.write_string(&target, "linked").await.unwrap();

    storage.link(&target, &link, false).await.unwrap();
    assert_eq!(storage.read_string(&link).await.unwrap(), "linked");
}

#[tokio::test]
async fn test_file_size_path() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(config());

    storage.write_all(&file_uri(&dir, "a/one"), vec![0u8; 10]).await.unwrap();
    storage.write_all(&file_uri(&dir, "a/b/two"), vec![0u8; 32]).await.unwrap();

    assert_eq!(storage.size_path(&file_uri(&dir, "a")).await.unwrap(), 42);
}

#[tokio::test]
async fn test_read_cache_eviction() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(StorageConfig {
        cache_size: 2,
        cache_ttl: 0,
        ..StorageConfig::default()
    });

    let paths: Vec<String> = ["a", "b", "c"].iter().map(|n| file_uri(&dir, n)).collect();
    for path in &paths {
        storage.write_string(path, path).await.unwrap();
        storage.read_all(path).await.unwrap();
    }

    assert_eq!(storage.cache().len().await, 2);
    assert!(!storage.cache().contains(&paths[0], None).await);
    assert!(storage.cache().contains(&paths[1], None).await);
    assert!(storage.cache().contains(&paths[2], None).await);
}

#[tokio::test]
async fn test_ceph_reads_are_cached() {
    let ceph = MemoryCeph::new();
    let storage = ceph_storage(ceph.clone(), config());
    ceph.pool("pool").put("object", b"0123456789".to_vec());

    storage.read_range("ceph://pool/object", 2, 4).await.unwrap();
    storage.read_range("ceph://pool/object", 2, 4).await.unwrap();
    assert_eq!(ceph.pool("pool").read_count(), 1);

    storage.read_range("ceph://pool/object", 0, 4).await.unwrap();
    assert_eq!(ceph.pool("pool").read_count(), 2);
}
