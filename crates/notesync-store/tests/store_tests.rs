//! Integration tests for SqliteLocalStore
//!
//! Each test creates a fresh in-memory database.

use chrono::Utc;

use notesync_core::domain::{
    ChangeType, ClientId, ContentHash, Cursor, ItemId, ItemType, LockHandle, SessionId, SyncItem,
    SyncState, TargetId,
};
use notesync_core::ports::{
    decryption_key, ApplyOutcome, FetchStatus, LocalStore, PendingDecryption, ResourceState,
};
use notesync_store::{DatabasePool, SqliteLocalStore};

// ============================================================================
// Test helpers
// ============================================================================

async fn setup() -> SqliteLocalStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteLocalStore::new(pool.pool().clone())
}

fn target() -> TargetId {
    TargetId::new("test".to_string()).unwrap()
}

fn note(title: &str) -> SyncItem {
    SyncItem::new(ItemType::Note, title)
        .with_body("body")
        .with_updated_time(1_000)
}

// ============================================================================
// Items and change tracking
// ============================================================================

#[tokio::test]
async fn test_local_save_records_create_then_update() {
    let store = setup().await;
    let item = note("first");

    let saved = store.save_local_item(&item).await.unwrap();
    let mut edited = saved.clone();
    edited.set_body("changed");
    store.save_local_item(&edited).await.unwrap();

    let changes = store.items_changed_since(0, 100).await.unwrap();
    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_type, ChangeType::Create);
    assert_eq!(changes[1].change_type, ChangeType::Update);
    assert!(changes[0].id < changes[1].id);
    assert_eq!(changes[1].item_id, *item.id());
}

#[tokio::test]
async fn test_updated_time_strictly_increases() {
    let store = setup().await;
    let first = store.save_local_item(&note("clock")).await.unwrap();

    // Same timestamp as the stored version
    let again = store.save_local_item(&first).await.unwrap();
    assert!(again.updated_time() > first.updated_time());

    // Earlier timestamp than the stored version
    let older = again.clone().with_updated_time(5);
    let stored = store.save_local_item(&older).await.unwrap();
    assert!(stored.updated_time() > again.updated_time());

    let fetched = store.get_item(first.id()).await.unwrap().unwrap();
    assert_eq!(fetched.updated_time(), stored.updated_time());
}

#[tokio::test]
async fn test_delete_local_item_tombstones_and_records_delete() {
    let store = setup().await;
    let saved = store.save_local_item(&note("doomed")).await.unwrap();

    assert!(store.delete_local_item(saved.id()).await.unwrap());
    assert!(!store.delete_local_item(saved.id()).await.unwrap());

    let tombstone = store.get_item(saved.id()).await.unwrap().unwrap();
    assert!(tombstone.is_deleted());

    let latest = store.pending_change(saved.id()).await.unwrap().unwrap();
    assert_eq!(latest.change_type, ChangeType::Delete);
}

#[tokio::test]
async fn test_delete_missing_item_returns_false() {
    let store = setup().await;
    assert!(!store.delete_local_item(&ItemId::generate()).await.unwrap());
}

#[tokio::test]
async fn test_apply_remote_item_is_idempotent_and_silent() {
    let store = setup().await;
    let remote = note("from remote");

    assert_eq!(
        store.apply_remote_item(&remote).await.unwrap(),
        ApplyOutcome::Created
    );
    assert_eq!(
        store.apply_remote_item(&remote).await.unwrap(),
        ApplyOutcome::Unchanged
    );

    let mut newer = remote.clone().with_updated_time(2_000);
    newer.set_title("renamed remotely");
    assert_eq!(
        store.apply_remote_item(&newer).await.unwrap(),
        ApplyOutcome::Updated
    );

    let mut gone = newer.clone().with_updated_time(3_000);
    gone.mark_deleted();
    assert_eq!(
        store.apply_remote_item(&gone).await.unwrap(),
        ApplyOutcome::Deleted
    );
    assert_eq!(
        store.apply_remote_item(&gone).await.unwrap(),
        ApplyOutcome::Unchanged
    );

    assert!(store.items_changed_since(0, 100).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remote_delete_of_unknown_item_is_noop() {
    let store = setup().await;
    let mut gone = note("never seen");
    gone.mark_deleted();

    assert_eq!(
        store.apply_remote_item(&gone).await.unwrap(),
        ApplyOutcome::Unchanged
    );
    assert!(store.get_item(gone.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_move_records_previous_parent() {
    let store = setup().await;
    let folder_a = store
        .save_local_item(&SyncItem::new(ItemType::Folder, "A"))
        .await
        .unwrap();
    let folder_b = store
        .save_local_item(&SyncItem::new(ItemType::Folder, "B"))
        .await
        .unwrap();
    let child = store
        .save_local_item(&note("child").with_parent(Some(folder_a.id().clone())))
        .await
        .unwrap();

    let mut moved = child.clone();
    moved.set_parent_id(Some(folder_b.id().clone()));
    store.save_local_item(&moved).await.unwrap();

    let change = store.pending_change(child.id()).await.unwrap().unwrap();
    assert_eq!(change.previous_parent_id.as_ref(), Some(folder_a.id()));
    assert!(change.is_move(Some(folder_b.id())));
}

#[tokio::test]
async fn test_consume_changes_only_up_to_sequence() {
    let store = setup().await;
    let saved = store.save_local_item(&note("racing")).await.unwrap();
    let snapshot = store.items_changed_since(0, 100).await.unwrap();
    let processed = snapshot.last().unwrap().id;

    // An edit lands after the snapshot was taken
    let mut edited = saved.clone();
    edited.set_title("edited during push");
    store.save_local_item(&edited).await.unwrap();

    let consumed = store.consume_changes(saved.id(), processed).await.unwrap();
    assert_eq!(consumed, 1);

    let remaining = store.items_changed_since(0, 100).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].id > processed);
}

#[tokio::test]
async fn test_items_changed_since_respects_limit_and_cursor() {
    let store = setup().await;
    for i in 0..5 {
        store.save_local_item(&note(&format!("n{i}"))).await.unwrap();
    }

    let first = store.items_changed_since(0, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    let rest = store
        .items_changed_since(first[1].id, 100)
        .await
        .unwrap();
    assert_eq!(rest.len(), 3);
}

#[tokio::test]
async fn test_folder_parents_and_title_lookup() {
    let store = setup().await;
    let root = store
        .save_local_item(&SyncItem::new(ItemType::Folder, "Root"))
        .await
        .unwrap();
    let child = store
        .save_local_item(
            &SyncItem::new(ItemType::Folder, "Child").with_parent(Some(root.id().clone())),
        )
        .await
        .unwrap();

    let parents = store.folder_parents().await.unwrap();
    assert_eq!(parents.len(), 2);
    assert_eq!(parents[root.id()], None);
    assert_eq!(parents[child.id()].as_ref(), Some(root.id()));

    assert!(store.title_exists("Root", None).await.unwrap());
    assert!(store.title_exists("Child", Some(root.id())).await.unwrap());
    assert!(!store.title_exists("Child", None).await.unwrap());
}

#[tokio::test]
async fn test_sync_disabled_items_listed_without_change() {
    let store = setup().await;
    let remote = note("huge");
    store.apply_remote_item(&remote).await.unwrap();

    store
        .set_sync_disabled(remote.id(), Some("too large"))
        .await
        .unwrap();
    let disabled = store.disabled_items().await.unwrap();
    assert_eq!(disabled.len(), 1);
    assert_eq!(disabled[0].sync_disabled_reason(), Some("too large"));

    store.set_sync_disabled(remote.id(), None).await.unwrap();
    assert!(store.disabled_items().await.unwrap().is_empty());
    assert!(store.items_changed_since(0, 10).await.unwrap().is_empty());
}

// ============================================================================
// Sync records and state
// ============================================================================

#[tokio::test]
async fn test_mark_synced_keeps_base_snapshot() {
    let store = setup().await;
    let target = target();
    let item = note("synced");

    assert!(!store.has_sync_records(&target).await.unwrap());
    store.mark_synced(&target, &item, 4_242).await.unwrap();

    let record = store.sync_record(&target, item.id()).await.unwrap().unwrap();
    assert_eq!(record.remote_updated_time, 4_242);
    assert_eq!(record.base.as_ref(), Some(&item));

    let times = store.remote_times(&target).await.unwrap();
    assert_eq!(times.get(item.id()), Some(&4_242));
    assert!(store.has_sync_records(&target).await.unwrap());

    store.forget_synced(&target, item.id()).await.unwrap();
    assert!(store.sync_record(&target, item.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sync_state_defaults_and_round_trips() {
    let store = setup().await;
    let target = target();

    let initial = store.get_sync_state(&target).await.unwrap();
    assert!(initial.is_initial());

    let handle = LockHandle {
        client_id: ClientId::new(),
        session_id: SessionId::new(),
    };
    let state = SyncState {
        target_id: target.clone(),
        last_cursor: Some(Cursor::new("42".to_string()).unwrap()),
        lock_handle: Some(handle),
        last_sync_time: Some(Utc::now()),
    };
    store.set_sync_state(&state).await.unwrap();

    let loaded = store.get_sync_state(&target).await.unwrap();
    assert_eq!(loaded.last_cursor, state.last_cursor);
    assert_eq!(loaded.lock_handle, Some(handle));
    assert!(loaded.last_sync_time.is_some());
    assert!(!loaded.is_initial());
}

// ============================================================================
// Resources
// ============================================================================

#[tokio::test]
async fn test_resource_needs_upload_until_remote_hash_matches() {
    let store = setup().await;
    let content = b"image bytes";
    let resource = store
        .save_local_item(&SyncItem::resource("photo.png", content))
        .await
        .unwrap();
    store.write_blob(resource.id(), content).await.unwrap();

    let pending = store.resources_needing_upload().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id(), resource.id());

    let mut state = ResourceState::new(resource.id().clone());
    state.remote_blob_hash = Some(ContentHash::of(content));
    state.fetch_status = FetchStatus::Done;
    store.set_resource_state(&state).await.unwrap();

    assert!(store.resources_needing_upload().await.unwrap().is_empty());
    assert_eq!(
        store.read_blob(resource.id()).await.unwrap().as_deref(),
        Some(&content[..])
    );
}

#[tokio::test]
async fn test_resource_download_queue() {
    let store = setup().await;
    let resource = SyncItem::resource("doc.pdf", b"remote pdf").with_updated_time(10);
    store.apply_remote_item(&resource).await.unwrap();

    assert!(store.resources_needing_download().await.unwrap().is_empty());
    assert_eq!(
        store.resource_state(resource.id()).await.unwrap().fetch_status,
        FetchStatus::Idle
    );

    let mut state = ResourceState::new(resource.id().clone());
    state.fetch_status = FetchStatus::Pending;
    state.fetch_error = Some("connection reset".to_string());
    store.set_resource_state(&state).await.unwrap();

    let queue = store.resources_needing_download().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(store.resource_state(resource.id()).await.unwrap(), state);
}

// ============================================================================
// Decryption bookkeeping
// ============================================================================

#[tokio::test]
async fn test_decryption_attempt_counter() {
    let store = setup().await;
    let id = ItemId::generate();
    let key = decryption_key(ItemType::Note, &id);

    assert_eq!(store.decryption_attempts(&key).await.unwrap(), 0);
    assert_eq!(store.record_decryption_failure(&key, "bad key").await.unwrap(), 1);
    assert_eq!(store.record_decryption_failure(&key, "bad key").await.unwrap(), 2);

    let failures = store.decryption_failures().await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].attempts, 2);
    assert_eq!(failures[0].last_error.as_deref(), Some("bad key"));

    store.reset_decryption_attempts(&key).await.unwrap();
    assert_eq!(store.decryption_attempts(&key).await.unwrap(), 0);
}

#[tokio::test]
async fn test_pending_decryptions_are_parked_per_target() {
    let store = setup().await;
    let target = target();
    let pending = PendingDecryption {
        item_id: ItemId::generate(),
        item_type: ItemType::Note,
        envelope: b"{\"encrypted\":true}".to_vec(),
        remote_updated_time: 77,
    };

    store.park_undecryptable(&target, &pending).await.unwrap();
    store.park_undecryptable(&target, &pending).await.unwrap();

    let parked = store.pending_decryptions(&target).await.unwrap();
    assert_eq!(parked, vec![pending.clone()]);

    let other = TargetId::new("other".to_string()).unwrap();
    assert!(store.pending_decryptions(&other).await.unwrap().is_empty());

    store
        .remove_pending_decryption(&target, &pending.item_id)
        .await
        .unwrap();
    assert!(store.pending_decryptions(&target).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_backed_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("notesync.db");
    let item = note("persistent");

    {
        let pool = DatabasePool::new(&path).await.unwrap();
        let store = SqliteLocalStore::new(pool.pool().clone());
        store.save_local_item(&item).await.unwrap();
        pool.pool().close().await;
    }

    let pool = DatabasePool::new(&path).await.unwrap();
    let store = SqliteLocalStore::new(pool.pool().clone());
    let loaded = store.get_item(item.id()).await.unwrap().unwrap();
    assert_eq!(loaded.title(), "persistent");
    assert_eq!(store.count_pending_changes().await.unwrap(), 1);
}
