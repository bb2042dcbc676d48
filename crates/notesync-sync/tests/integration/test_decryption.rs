//! Encrypted targets and the persisted decryption attempt counter

use std::sync::Arc;

use notesync_core::domain::{ItemType, SkipReason};
use notesync_core::ports::{decryption_key, LocalStore};
use notesync_remote::MemoryFileApi;
use notesync_sync::SyncError;

use crate::common::{Client, MissingKey, ReverseCipher};

#[tokio::test]
async fn encrypted_items_reach_clients_with_the_key() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone())
        .await
        .reconfigure(|e| e.with_encryption(Arc::new(ReverseCipher)));
    let b = Client::new(api.clone())
        .await
        .reconfigure(|e| e.with_encryption(Arc::new(ReverseCipher)));

    let note = a.create_note("Secret", "classified").await;
    a.sync().await;

    let raw = api.paths().await;
    assert!(raw.iter().any(|p| p.starts_with(note.id().as_str())));

    assert_eq!(b.sync().await.downloaded, 1);
    assert_eq!(b.item(note.id()).await.body(), "classified");
}

#[tokio::test]
async fn client_without_encryption_refuses_encrypted_target() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone())
        .await
        .reconfigure(|e| e.with_encryption(Arc::new(ReverseCipher)));
    a.create_note("Secret", "").await;
    a.sync().await;

    let plain = Client::new(api.clone()).await;
    let result = plain.try_sync().await;
    assert!(matches!(result, Err(SyncError::Encryption(_))));
    assert!(result.unwrap_err().needs_user());
}

#[tokio::test]
async fn decryption_attempts_are_bounded_across_runs() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone())
        .await
        .reconfigure(|e| e.with_encryption(Arc::new(ReverseCipher)));
    let b = Client::new(api.clone())
        .await
        .reconfigure(|e| e.with_encryption(Arc::new(MissingKey)));

    let note = a.create_note("Secret", "classified").await;
    a.sync().await;
    let key = decryption_key(ItemType::Note, note.id());

    let first = b.sync().await;
    assert_eq!(first.downloaded, 0);
    assert_eq!(first.skipped.len(), 1);
    assert_eq!(
        first.skipped[0].reason,
        SkipReason::DecryptionPending { attempts: 1 }
    );

    let second = b.sync().await;
    assert_eq!(second.skipped.len(), 1);
    assert_eq!(
        second.skipped[0].reason,
        SkipReason::Undecryptable { attempts: 2 }
    );

    // Exhausted: reported, never attempted again
    let third = b.sync().await;
    assert_eq!(third.undecryptable().count(), 1);
    assert_eq!(b.store.decryption_attempts(&key).await.unwrap(), 2);
    assert!(b.store.get_item(note.id()).await.unwrap().is_none());

    // The user loads the key and clears the counter
    b.store.reset_decryption_attempts(&key).await.unwrap();
    let b = b.reconfigure(|e| e.with_encryption(Arc::new(ReverseCipher)));
    let fixed = b.sync().await;
    assert_eq!(fixed.downloaded, 1);
    assert!(fixed.skipped.is_empty());
    assert_eq!(b.item(note.id()).await.body(), "classified");
    assert!(b
        .store
        .pending_decryptions(b.engine.target())
        .await
        .unwrap()
        .is_empty());
}
