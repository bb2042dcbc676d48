//! Per-item failures during push: stale preconditions, quota, encryption

use std::sync::Arc;

use notesync_core::domain::SkipReason;
use notesync_core::ports::{
    EncryptionError, EncryptionService, ListOptions, LocalStore, RemoteError, RemoteFileApi,
};
use notesync_remote::layout;
use notesync_remote::memory::{FailureRule, Operation};
use notesync_remote::MemoryFileApi;
use notesync_sync::SyncError;

use crate::common::Client;

/// Reverses payloads, but refuses those containing `refused`
struct SelectiveCipher {
    refused: &'static [u8],
}

impl EncryptionService for SelectiveCipher {
    fn is_enabled(&self) -> bool {
        true
    }

    fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        if payload
            .windows(self.refused.len())
            .any(|window| window == self.refused)
        {
            return Err(EncryptionError::Failed("payload rejected".to_string()));
        }
        Ok(payload.iter().rev().copied().collect())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(ciphertext.iter().rev().copied().collect())
    }
}

/// Encryption enabled before a key was loaded
struct NoKeyLoaded;

impl EncryptionService for NoKeyLoaded {
    fn is_enabled(&self) -> bool {
        true
    }

    fn encrypt(&self, _payload: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Err(EncryptionError::KeyUnavailable("master key not loaded".to_string()))
    }

    fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Err(EncryptionError::KeyUnavailable("master key not loaded".to_string()))
    }
}

#[tokio::test]
async fn remote_change_found_on_push_is_resolved_again() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;

    let note = a.create_note("N1", "shared").await;
    a.sync().await;
    b.sync().await;

    a.edit(note.id(), |item| item.set_body("A-edit")).await;
    b.edit(note.id(), |item| item.set_body("B-edit")).await;
    a.sync().await;

    // Start B's delta after A's upload so the change only shows up as a
    // rejected write
    let position = api
        .list(layout::ROOT, ListOptions::default())
        .await
        .unwrap()
        .next_cursor;
    b.set_cursor(position).await;

    let report = b.sync().await;
    assert!(report.failures.is_empty());
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(b.item(note.id()).await.body(), "A-edit");

    let copies = b.store.conflict_items().await.unwrap();
    let bodies: Vec<&str> = copies.iter().map(|c| c.body()).collect();
    assert_eq!(bodies, ["B-edit"]);
    assert_eq!(copies[0].conflict_original_id(), Some(note.id()));
    assert_eq!(b.store.count_pending_changes().await.unwrap(), 0);

    // Nothing was overwritten on the target
    a.sync().await;
    assert_eq!(a.item(note.id()).await.body(), "A-edit");
    assert_eq!(a.store.conflict_items().await.unwrap().len(), 1);
}

#[tokio::test]
async fn quota_error_skips_only_that_item() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;

    let refused = a.create_note("Refused", "no room").await;
    let accepted = a.create_note("Accepted", "fits").await;
    api.inject_failure(
        FailureRule::new(Operation::Put, RemoteError::QuotaExceeded("storage full".to_string()))
            .on_path(layout::item_path(refused.id())),
    )
    .await;

    let report = a.sync().await;
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].item_id.as_ref(), Some(refused.id()));
    assert!(matches!(report.skipped[0].reason, SkipReason::QuotaExceeded));
    assert!(report.failures.is_empty());

    let paths = api.paths().await;
    assert!(paths.contains(&layout::item_path(accepted.id())));
    assert!(!paths.contains(&layout::item_path(refused.id())));
    assert!(a.item(refused.id()).await.sync_disabled_reason().is_some());
    assert_eq!(a.store.count_pending_changes().await.unwrap(), 1);

    // Space freed: the next edit goes through
    a.edit(refused.id(), |item| item.set_body("shorter")).await;
    let report = a.sync().await;
    assert_eq!(report.uploaded, 1);
    assert!(a.item(refused.id()).await.sync_disabled_reason().is_none());
}

#[tokio::test]
async fn encryption_failure_fails_only_that_item() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await.reconfigure(|e| {
        e.with_encryption(Arc::new(SelectiveCipher {
            refused: b"unsealable",
        }))
    });

    let broken = a.create_note("Broken", "unsealable").await;
    let fine = a.create_note("Fine", "sealed").await;

    let report = a.try_sync().await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item_id.as_ref(), Some(broken.id()));

    let paths = api.paths().await;
    assert!(paths.contains(&layout::item_path(fine.id())));
    assert!(!paths.contains(&layout::item_path(broken.id())));
    // Still pending, retried on the next run
    assert_eq!(a.store.count_pending_changes().await.unwrap(), 1);

    a.edit(broken.id(), |item| item.set_body("sealable now")).await;
    let report = a.sync().await;
    assert_eq!(report.uploaded, 1);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn missing_encryption_key_stops_the_run() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone())
        .await
        .reconfigure(|e| e.with_encryption(Arc::new(NoKeyLoaded)));
    a.create_note("Any", "text").await;

    let err = a.try_sync().await.unwrap_err();
    assert!(matches!(err, SyncError::Encryption(_)));
    assert!(err.needs_user());
    assert_eq!(a.store.count_pending_changes().await.unwrap(), 1);
}
