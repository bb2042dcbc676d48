//! Cursor handling: replays, interrupted pulls, expired cursors, basic delta

use std::sync::Arc;

use notesync_core::ports::{Capabilities, LocalStore};
use notesync_remote::{FileSystemApi, MemoryFileApi};
use tokio_util::sync::CancellationToken;

use crate::common::{test_config, CancelAfterFirstPull, Client};

#[tokio::test]
async fn replaying_a_delta_page_changes_nothing() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    b.sync().await;
    let before = b.cursor().await;
    assert!(before.is_some());

    a.create_note("One", "1").await;
    a.create_note("Two", "2").await;
    a.sync().await;

    assert_eq!(b.sync().await.downloaded, 2);
    let items = b.store.count_items().await.unwrap();

    // Rewind to before the page and apply it again
    b.set_cursor(before).await;
    let replay = b.sync().await;
    assert_eq!(replay.items_synced(), 0);
    assert!(replay.conflicts.is_empty());
    assert_eq!(b.store.count_items().await.unwrap(), items);
    assert_eq!(b.store.count_pending_changes().await.unwrap(), 0);
}

#[tokio::test]
async fn interrupted_pull_resumes_from_stored_cursor() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::with_config(api.clone(), test_config().page_size(2).build()).await;

    b.sync().await;
    let start = b.cursor().await;

    let notes = [
        a.create_note("One", "1").await,
        a.create_note("Two", "2").await,
        a.create_note("Three", "3").await,
    ];
    a.sync().await;

    // Cancelled after the first item of the first page: that item is
    // applied, the page's cursor is not stored
    let cancel = CancellationToken::new();
    let b = b.reconfigure(|engine| {
        engine.with_observer(Arc::new(CancelAfterFirstPull::new(cancel.clone())))
    });
    let interrupted = b.engine.sync(&cancel).await.unwrap();
    assert!(interrupted.cancelled);
    assert_eq!(interrupted.downloaded, 1);
    assert_eq!(b.cursor().await, start);

    let resumed = b.sync().await;
    assert_eq!(resumed.downloaded, 2);
    assert!(resumed.failures.is_empty());
    for note in &notes {
        assert_eq!(b.item(note.id()).await.title(), note.title());
    }
    assert_eq!(b.store.count_items().await.unwrap(), 3);
}

#[tokio::test]
async fn expired_cursor_falls_back_to_full_listing() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    b.sync().await;
    let stale = b.cursor().await;

    a.create_note("One", "1").await;
    a.create_note("Two", "2").await;
    a.sync().await;
    api.compact().await;

    let report = b.sync().await;
    assert_eq!(report.downloaded, 2);
    assert!(report.failures.is_empty());
    let fresh = b.cursor().await;
    assert!(fresh.is_some());
    assert_ne!(fresh, stale);
}

#[tokio::test]
async fn backend_without_native_delta_uses_listing() {
    let api = MemoryFileApi::new();
    let basic = api.share_with_capabilities(Capabilities {
        native_delta: false,
        delta_with_items: false,
        atomic_create: true,
        timestamp_precision_ms: 1,
    });
    let a = Client::new(api.clone()).await;
    let b = Client::new(basic).await;

    let note = a.create_note("Listed", "body").await;
    a.sync().await;

    assert_eq!(b.sync().await.downloaded, 1);
    assert_eq!(b.cursor().await, None);
    assert_eq!(b.item(note.id()).await.body(), "body");

    a.edit(note.id(), |item| item.set_body("changed")).await;
    a.sync().await;
    assert_eq!(b.sync().await.downloaded, 1);
    assert_eq!(b.item(note.id()).await.body(), "changed");
}

#[tokio::test]
async fn filesystem_target_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let a = Client::new(FileSystemApi::new(dir.path())).await;
    let b = Client::new(FileSystemApi::new(dir.path())).await;

    let note = a.create_note("On disk", "hello").await;
    assert_eq!(a.sync().await.uploaded, 1);

    assert_eq!(b.sync().await.downloaded, 1);
    assert_eq!(b.item(note.id()).await.body(), "hello");

    assert!(b.store.delete_local_item(note.id()).await.unwrap());
    assert_eq!(b.sync().await.deleted_remote, 1);

    // Basic delta sees the file missing and reports the deletion
    let report = a.sync().await;
    assert_eq!(report.deleted_local, 1);
    assert!(a.item(note.id()).await.is_deleted());
}
