//! Multi-client scenarios: propagation, conflicts, convergence, size limits

use notesync_core::domain::{ItemType, SkipReason, SyncItem};
use notesync_core::ports::LocalStore;
use notesync_remote::MemoryFileApi;

use crate::common::{test_config, Client};

#[tokio::test]
async fn title_edit_propagates_back_to_creator() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let n1 = a
        .store
        .save_local_item(&SyncItem::new(ItemType::Note, "N1").with_updated_time(100))
        .await
        .unwrap();
    assert_eq!(a.sync().await.uploaded, 1);

    let report = b.sync().await;
    assert_eq!(report.downloaded, 1);
    assert_eq!(b.item(n1.id()).await.title(), "N1");

    let edited = b
        .edit(n1.id(), |item| {
            item.set_title("N1 renamed");
            item.set_updated_time(150);
        })
        .await;
    assert_eq!(edited.updated_time(), 150);
    assert_eq!(b.sync().await.uploaded, 1);

    let cursor_before = a.cursor().await;
    let report = a.sync().await;
    assert_eq!(report.downloaded, 1);
    assert!(report.conflicts.is_empty());
    assert_eq!(a.item(n1.id()).await.title(), "N1 renamed");
    assert_ne!(a.cursor().await, cursor_before);
}

#[tokio::test]
async fn concurrent_body_edits_produce_conflict_copy() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let n1 = a.create_note("N1", "shared").await;
    a.sync().await;
    b.sync().await;

    a.edit(n1.id(), |item| item.set_body("edited on A")).await;
    b.edit(n1.id(), |item| item.set_body("edited on B")).await;

    // First to sync wins the canonical body
    assert_eq!(a.sync().await.uploaded, 1);

    let report = b.sync().await;
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(b.item(n1.id()).await.body(), "edited on A");

    let copies = b.store.conflict_items().await.unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].title(), "N1 (conflict)");
    assert_eq!(copies[0].body(), "edited on B");
    assert_eq!(copies[0].conflict_original_id(), Some(n1.id()));
    assert_eq!(b.store.count_pending_changes().await.unwrap(), 0);

    // The copy is an ordinary item and reaches the other client
    a.sync().await;
    let on_a = a.store.conflict_items().await.unwrap();
    assert_eq!(on_a.len(), 1);
    assert_eq!(on_a[0].body(), "edited on B");
}

#[tokio::test]
async fn disjoint_edits_converge_in_either_order() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let shared = a.create_note("Shared", "v1").await;
    a.sync().await;
    b.sync().await;

    let only_a = a.create_note("From A", "a").await;
    let only_b = b.create_note("From B", "b").await;
    b.edit(shared.id(), |item| item.set_title("Shared (renamed on B)"))
        .await;
    a.edit(shared.id(), |item| item.set_body("v2 from A")).await;

    b.sync().await;
    a.sync().await;
    b.sync().await;

    for id in [shared.id(), only_a.id(), only_b.id()] {
        let on_a = a.item(id).await;
        let on_b = b.item(id).await;
        assert!(on_a.same_content(&on_b), "{id} differs: {on_a:?} vs {on_b:?}");
    }
    let merged = a.item(shared.id()).await;
    assert_eq!(merged.title(), "Shared (renamed on B)");
    assert_eq!(merged.body(), "v2 from A");
    assert_eq!(a.store.count_items().await.unwrap(), 3);
    assert_eq!(b.store.count_items().await.unwrap(), 3);
    assert!(a.store.conflict_items().await.unwrap().is_empty());
}

#[tokio::test]
async fn deletions_propagate() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let note = a.create_note("Doomed", "").await;
    a.sync().await;
    b.sync().await;

    assert!(b.store.delete_local_item(note.id()).await.unwrap());
    assert_eq!(b.sync().await.deleted_remote, 1);

    let report = a.sync().await;
    assert_eq!(report.deleted_local, 1);
    assert!(a.item(note.id()).await.is_deleted());
}

#[tokio::test]
async fn crossed_folder_moves_keep_the_resolved_hierarchy() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let f1 = a
        .store
        .save_local_item(&SyncItem::new(ItemType::Folder, "F1"))
        .await
        .unwrap();
    let f2 = a
        .store
        .save_local_item(&SyncItem::new(ItemType::Folder, "F2"))
        .await
        .unwrap();
    a.sync().await;
    b.sync().await;

    a.edit(f1.id(), |item| item.set_parent_id(Some(f2.id().clone())))
        .await;
    b.edit(f2.id(), |item| item.set_parent_id(Some(f1.id().clone())))
        .await;
    a.sync().await;

    // F1 under F2 meets F2 under F1: B breaks the cycle at F1
    b.sync().await;
    assert!(b.item(f1.id()).await.parent_id().is_none());
    assert_eq!(b.item(f2.id()).await.parent_id(), Some(f1.id()));

    // A receives both placements in one page; together they form no cycle
    let report = a.sync().await;
    assert_eq!(report.uploaded, 0);
    b.sync().await;

    for client in [&a, &b] {
        assert!(client.item(f1.id()).await.parent_id().is_none());
        assert_eq!(client.item(f2.id()).await.parent_id(), Some(f1.id()));
        assert_eq!(client.store.count_pending_changes().await.unwrap(), 0);
    }
}

#[tokio::test]
async fn oversized_item_does_not_block_the_batch() {
    let api = MemoryFileApi::new();
    let a = Client::with_config(api.clone(), test_config().max_item_size(2_000).build()).await;
    let b = Client::new(api.clone()).await;

    let big = a.create_note("Big", &"x".repeat(5_000)).await;
    let small = a.create_note("Small", "fits").await;
    let other = a.create_note("Other", "fits too").await;

    let report = a.sync().await;
    assert_eq!(report.uploaded, 2);
    assert_eq!(report.skipped.len(), 1);
    assert!(matches!(
        report.skipped[0].reason,
        SkipReason::TooLarge { max: 2_000, .. }
    ));
    assert!(a.item(big.id()).await.sync_disabled_reason().is_some());
    // Still pending so that a smaller version is pushed later
    assert_eq!(a.store.count_pending_changes().await.unwrap(), 1);

    b.sync().await;
    assert!(b.store.get_item(small.id()).await.unwrap().is_some());
    assert!(b.store.get_item(other.id()).await.unwrap().is_some());
    assert!(b.store.get_item(big.id()).await.unwrap().is_none());

    a.edit(big.id(), |item| item.set_body("trimmed")).await;
    let report = a.sync().await;
    assert_eq!(report.uploaded, 1);
    assert!(report.skipped.is_empty());
    assert!(a.item(big.id()).await.sync_disabled_reason().is_none());
}

#[tokio::test]
async fn second_sync_without_changes_is_quiet() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    a.create_note("One", "1").await;
    a.create_note("Two", "2").await;

    let first = a.sync().await;
    assert_eq!(first.uploaded, 2);
    let puts = api.call_count("put").await;

    let second = a.sync().await;
    assert_eq!(second.items_synced(), 0);
    assert!(second.is_clean());
    // Only lock writes, no item uploads
    let lock_writes = api.call_count("put").await - puts;
    assert!(lock_writes <= 2, "unexpected puts: {lock_writes}");
}
