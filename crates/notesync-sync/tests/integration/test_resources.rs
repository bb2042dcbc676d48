//! Resource blobs: upload after metadata, resume after failure, validation

use notesync_core::domain::SyncItem;
use notesync_core::ports::{FetchStatus, LocalStore, RemoteError};
use notesync_remote::memory::{FailureRule, Operation};
use notesync_remote::{layout, MemoryFileApi};
use notesync_sync::SyncError;

use crate::common::Client;

async fn create_resource(client: &Client, title: &str, data: &[u8]) -> SyncItem {
    let item = client
        .store
        .save_local_item(&SyncItem::resource(title, data))
        .await
        .unwrap();
    client.store.write_blob(item.id(), data).await.unwrap();
    item
}

#[tokio::test]
async fn resource_content_follows_its_metadata() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let photo = create_resource(&a, "photo.png", b"pixels").await;
    assert_eq!(a.sync().await.uploaded, 1);
    assert!(api
        .paths()
        .await
        .contains(&layout::resource_path(photo.id())));

    assert_eq!(b.sync().await.downloaded, 1);
    assert_eq!(
        b.store.read_blob(photo.id()).await.unwrap(),
        Some(b"pixels".to_vec())
    );
    let state = b.store.resource_state(photo.id()).await.unwrap();
    assert_eq!(state.fetch_status, FetchStatus::Done);
}

#[tokio::test]
async fn failed_blob_upload_resumes_next_run() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let photo = create_resource(&a, "photo.png", b"pixels").await;
    api.inject_failure(
        FailureRule::new(Operation::Put, RemoteError::Server("503".to_string()))
            .on_path(layout::RESOURCE_DIR)
            .times(2),
    )
    .await;

    let result = a.try_sync().await;
    assert!(matches!(
        result,
        Err(SyncError::Remote(RemoteError::Server(_)))
    ));
    // Metadata made it, content did not
    let paths = api.paths().await;
    assert!(paths.contains(&layout::item_path(photo.id())));
    assert!(!paths.contains(&layout::resource_path(photo.id())));
    assert!(!paths.contains(&layout::LOCK_PATH.to_string()));

    // A client seeing the metadata first waits for the content
    let early = b.sync().await;
    assert_eq!(early.downloaded, 1);
    assert_eq!(early.skipped.len(), 1);
    assert!(b.store.read_blob(photo.id()).await.unwrap().is_none());

    let retried = a.sync().await;
    assert!(retried.failures.is_empty());
    assert!(api
        .paths()
        .await
        .contains(&layout::resource_path(photo.id())));

    b.sync().await;
    assert_eq!(
        b.store.read_blob(photo.id()).await.unwrap(),
        Some(b"pixels".to_vec())
    );
}

#[tokio::test]
async fn corrupt_blob_is_reported_and_retried() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let photo = create_resource(&a, "photo.png", b"pixels").await;
    a.sync().await;
    api.insert_raw(&layout::resource_path(photo.id()), b"garbage".to_vec())
        .await;

    let report = b.sync().await;
    assert_eq!(report.failures.len(), 1);
    assert!(b.store.read_blob(photo.id()).await.unwrap().is_none());
    let state = b.store.resource_state(photo.id()).await.unwrap();
    assert_eq!(state.fetch_status, FetchStatus::Pending);
    assert!(state.fetch_error.is_some());

    api.insert_raw(&layout::resource_path(photo.id()), b"pixels".to_vec())
        .await;
    let report = b.sync().await;
    assert!(report.failures.is_empty());
    assert_eq!(
        b.store.read_blob(photo.id()).await.unwrap(),
        Some(b"pixels".to_vec())
    );
}
