use std::sync::Arc;

use bucket_migrator::backends::memory::{MemoryInternalClient, MemoryProvider};
use bucket_migrator::config::{Migration, Protocol};
use bucket_migrator::controller::MigrationController;
use bucket_migrator::headers::HeaderMap;
use bucket_migrator::selector::{HashRing, Selector};
use bucket_migrator::status::StatusStore;

fn sample_migration(bucket: &str) -> Migration {
    Migration {
        account: "acct".into(),
        aws_identity: "id".into(),
        aws_secret: None,
        aws_endpoint: None,
        aws_bucket: bucket.into(),
        container: None,
        protocol: Protocol::S3,
        prefix: None,
        custom_prefix: None,
        older_than: 0,
        propagate_account_metadata: false,
        remote_account: None,
        storage_policy: None,
    }
}

fn single_node_controller() -> MigrationController<MemoryProvider, MemoryInternalClient, HashRing> {
    let provider = Arc::new(MemoryProvider::new());
    let internal_client = Arc::new(MemoryInternalClient::new());
    let ring = HashRing::new(vec!["node-a".to_string()], 1);
    let selector = Arc::new(Selector::new(ring, "node-a"));
    MigrationController::new(provider, internal_client, selector, 4)
}

#[tokio::test]
async fn clean_copy_migrates_all_objects() {
    let controller = single_node_controller();
    controller
        .provider
        .seed_object(
            "bucket",
            "k1",
            "aaa",
            b"hello".to_vec(),
            "2024-01-01T00:00:00Z",
            HeaderMap::new(),
        )
        .await;
    controller
        .provider
        .seed_object(
            "bucket",
            "k2",
            "bbb",
            b"world!".to_vec(),
            "2024-01-01T00:00:01Z",
            HeaderMap::new(),
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut status = StatusStore::load(dir.path().join("status.json")).await.unwrap();

    let migration = sample_migration("bucket");
    controller.run_pass(&migration, &mut status).await.unwrap();

    let meta1 = controller
        .internal_client
        .get_object_metadata("acct", "bucket", "k1")
        .await
        .unwrap();
    assert!(meta1.is_migrator_owned());

    let record = status.get(&migration).unwrap();
    assert_eq!(record.status.scanned_count, 2);
    assert_eq!(record.status.moved_count, 2);
}

#[tokio::test]
async fn remote_delete_is_reconciled_locally() {
    let controller = single_node_controller();
    controller
        .provider
        .seed_object("bucket", "k1", "aaa", b"hello".to_vec(), "2024-01-01T00:00:00Z", HeaderMap::new())
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut status = StatusStore::load(dir.path().join("status.json")).await.unwrap();
    let migration = sample_migration("bucket");
    controller.run_pass(&migration, &mut status).await.unwrap();

    controller.provider.remove_object("bucket", "k1").await;

    // The second pass's remote listing (from the persisted marker onward) is
    // empty, but the full local listing still has k1 — the reconciler's
    // trailing drain of local-only entries reconciles it as a deletion
    // regardless of where the remote pagination marker sits.
    controller.run_pass(&migration, &mut status).await.unwrap();

    let result = controller
        .internal_client
        .get_object_metadata("acct", "bucket", "k1")
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn multipart_upload_migrates_parts_and_validates_etag() {
    let controller = single_node_controller();

    let part1 = b"hello ".to_vec();
    let part2 = b"world!".to_vec();
    let mut concatenated = Vec::new();
    concatenated.extend_from_slice(&md5::compute(&part1).0);
    concatenated.extend_from_slice(&md5::compute(&part2).0);
    let whole_etag = format!("{:x}", md5::compute(&concatenated));

    controller
        .provider
        .seed_multipart_object(
            "bucket",
            "bigobj",
            whole_etag,
            vec![part1, part2],
            "2024-01-01T00:00:00Z",
            HeaderMap::new(),
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut status = StatusStore::load(dir.path().join("status.json")).await.unwrap();
    let migration = sample_migration("bucket");
    controller.run_pass(&migration, &mut status).await.unwrap();

    let manifest = controller
        .internal_client
        .get_object_metadata("acct", "bucket", "bigobj")
        .await
        .unwrap();
    assert!(manifest.is_migrator_owned());
    assert!(manifest.headers.get(bucket_migrator::headers::STATIC_LARGE_OBJECT_HEADER).is_some());

    let record = status.get(&migration).unwrap();
    assert_eq!(record.status.moved_count, 1);
}

#[tokio::test]
async fn dlo_manifest_waits_for_segments_then_copies() {
    let controller = single_node_controller();

    controller
        .provider
        .seed_object("bucket_segments", "myobj/001", "seg1", b"hello ".to_vec(), "2024-01-01T00:00:00Z", HeaderMap::new())
        .await;
    controller
        .provider
        .seed_object("bucket_segments", "myobj/002", "seg2", b"world".to_vec(), "2024-01-01T00:00:00Z", HeaderMap::new())
        .await;

    let mut manifest_headers = HeaderMap::new();
    manifest_headers.insert(bucket_migrator::headers::OBJECT_MANIFEST_HEADER, "bucket_segments/myobj/");
    controller
        .provider
        .seed_object("bucket", "myobj", "manifest-etag", Vec::new(), "2024-01-01T00:00:05Z", manifest_headers)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut status = StatusStore::load(dir.path().join("status.json")).await.unwrap();
    let migration = sample_migration("bucket");
    controller.run_pass(&migration, &mut status).await.unwrap();

    let seg1 = controller
        .internal_client
        .get_object_metadata("acct", "bucket_segments", "myobj/001")
        .await
        .unwrap();
    assert_eq!(seg1.content_length, 6);
    let seg2 = controller
        .internal_client
        .get_object_metadata("acct", "bucket_segments", "myobj/002")
        .await
        .unwrap();
    assert_eq!(seg2.content_length, 5);

    let manifest = controller
        .internal_client
        .get_object_metadata("acct", "bucket", "myobj")
        .await
        .unwrap();
    assert!(manifest.is_migrator_owned());
    assert_eq!(
        manifest.headers.get(bucket_migrator::headers::OBJECT_MANIFEST_HEADER),
        Some("bucket_segments/myobj/")
    );
}

#[tokio::test]
async fn client_owned_object_is_left_untouched() {
    let controller = single_node_controller();
    controller
        .provider
        .seed_object("bucket", "k1", "zzz", b"source body".to_vec(), "2024-01-01T00:00:00Z", HeaderMap::new())
        .await;

    controller
        .internal_client
        .create_container("acct", "bucket", HeaderMap::new())
        .await
        .unwrap();
    controller
        .internal_client
        .seed_object(
            "acct",
            "bucket",
            "k1",
            "clientetag",
            b"client body".to_vec(),
            HeaderMap::new(),
            bucket_migrator::timestamp::Timestamp::from_epoch_seconds(500),
        )
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut status = StatusStore::load(dir.path().join("status.json")).await.unwrap();
    let migration = sample_migration("bucket");
    controller.run_pass(&migration, &mut status).await.unwrap();

    let meta = controller
        .internal_client
        .get_object_metadata("acct", "bucket", "k1")
        .await
        .unwrap();
    assert_eq!(meta.etag, "clientetag");
}
