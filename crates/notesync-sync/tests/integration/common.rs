//! Shared helpers for sync integration tests
//!
//! Each [`Client`] is one simulated device: its own in-memory local store
//! and engine, syncing against a target shared with the other clients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use notesync_core::config::{Config, ConfigBuilder};
use notesync_core::domain::{Cursor, ItemId, ItemType, SyncItem, SyncPhase, SyncReport};
use notesync_core::ports::{
    EncryptionError, EncryptionService, LocalStore, RemoteFileApi, SyncEvent, SyncObserver,
};
use notesync_store::{DatabasePool, SqliteLocalStore};
use notesync_sync::{SyncEngine, SyncError};
use tokio_util::sync::CancellationToken;

/// Config used by most tests: fast retries, no lock waiting
pub fn test_config() -> ConfigBuilder {
    ConfigBuilder::new()
        .target_id("shared")
        .retry_max_attempts(2)
        .retry_base_delay_ms(1)
        .run_retries(0)
        .lock_acquire_retries(0)
        .lock_retry_delay(1)
}

pub struct Client {
    pub store: Arc<SqliteLocalStore>,
    pub engine: SyncEngine,
}

impl Client {
    pub async fn new(api: impl RemoteFileApi + 'static) -> Self {
        Self::with_config(api, test_config().build()).await
    }

    pub async fn with_config(api: impl RemoteFileApi + 'static, config: Config) -> Self {
        let pool = DatabasePool::in_memory().await.unwrap();
        let store = Arc::new(SqliteLocalStore::new(pool.pool().clone()));
        let engine = SyncEngine::new(&config, Arc::new(api), store.clone()).unwrap();
        Self { store, engine }
    }

    /// Replaces the engine, keeping the local store
    pub fn reconfigure(mut self, f: impl FnOnce(SyncEngine) -> SyncEngine) -> Self {
        self.engine = f(self.engine);
        self
    }

    pub async fn try_sync(&self) -> Result<SyncReport, SyncError> {
        self.engine.sync(&CancellationToken::new()).await
    }

    pub async fn sync(&self) -> SyncReport {
        let report = self.try_sync().await.unwrap();
        assert!(!report.cancelled);
        report
    }

    pub async fn create_note(&self, title: &str, body: &str) -> SyncItem {
        self.store
            .save_local_item(&SyncItem::new(ItemType::Note, title).with_body(body))
            .await
            .unwrap()
    }

    pub async fn edit(&self, id: &ItemId, f: impl FnOnce(&mut SyncItem)) -> SyncItem {
        let mut item = self.item(id).await;
        f(&mut item);
        self.store.save_local_item(&item).await.unwrap()
    }

    pub async fn item(&self, id: &ItemId) -> SyncItem {
        self.store.get_item(id).await.unwrap().unwrap()
    }

    pub async fn cursor(&self) -> Option<Cursor> {
        let target = self.engine.target().clone();
        self.store.get_sync_state(&target).await.unwrap().last_cursor
    }

    pub async fn set_cursor(&self, cursor: Option<Cursor>) {
        let target = self.engine.target().clone();
        let mut state = self.store.get_sync_state(&target).await.unwrap();
        state.last_cursor = cursor;
        self.store.set_sync_state(&state).await.unwrap();
    }
}

/// Reverses payload bytes; stands in for a real cipher
pub struct ReverseCipher;

impl EncryptionService for ReverseCipher {
    fn is_enabled(&self) -> bool {
        true
    }

    fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(payload.iter().rev().copied().collect())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(ciphertext.iter().rev().copied().collect())
    }
}

/// Encryption enabled but without the key
pub struct MissingKey;

impl EncryptionService for MissingKey {
    fn is_enabled(&self) -> bool {
        true
    }

    fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(payload.iter().rev().copied().collect())
    }

    fn decrypt(&self, _ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Err(EncryptionError::NotDecryptable("master key not loaded".to_string()))
    }
}

/// Cancels the run after the first item of the pull phase
pub struct CancelAfterFirstPull {
    pub cancel: CancellationToken,
    fired: AtomicBool,
}

impl CancelAfterFirstPull {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            fired: AtomicBool::new(false),
        }
    }
}

impl SyncObserver for CancelAfterFirstPull {
    fn on_event(&self, event: &SyncEvent) {
        if let SyncEvent::Progress {
            phase: SyncPhase::PullingDelta,
            ..
        } = event
        {
            if !self.fired.swap(true, Ordering::SeqCst) {
                self.cancel.cancel();
            }
        }
    }
}
