//! Local store port (driven/secondary port)
//!
//! The relational store holding the user's items, the local change log fed
//! by change-tracking triggers, and the bookkeeping the synchronizer needs
//! per target: sync records, sync state, resource blobs and decryption
//! attempt counters.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result`; store failures are never retried by the engine
//!   and surface as local-store errors.
//! - Writes made through [`LocalStore::save_local_item`] and
//!   [`LocalStore::delete_local_item`] produce change records. Writes made
//!   on behalf of the synchronizer (`apply_remote_item`, `set_sync_disabled`)
//!   never do, so applying a remote change does not echo it back.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    ChangeRecord, ContentHash, DomainError, ItemId, ItemType, SyncItem, SyncState, TargetId,
};

/// What `apply_remote_item` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Deleted,
    /// Local state already matched; nothing written
    Unchanged,
}

/// Last successful exchange of one item with one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub item_id: ItemId,
    /// Local wall-clock time of the exchange, milliseconds
    pub sync_time: i64,
    /// Remote modification time observed at that exchange
    pub remote_updated_time: i64,
    /// Item content as of that exchange; the common ancestor for merges
    pub base: Option<SyncItem>,
}

/// Download state of a resource's binary content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    #[default]
    Idle,
    Pending,
    Done,
    Error,
}

impl fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchStatus::Idle => "idle",
            FetchStatus::Pending => "pending",
            FetchStatus::Done => "done",
            FetchStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for FetchStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(FetchStatus::Idle),
            "pending" => Ok(FetchStatus::Pending),
            "done" => Ok(FetchStatus::Done),
            "error" => Ok(FetchStatus::Error),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown fetch status: {other}"
            ))),
        }
    }
}

/// Transfer bookkeeping for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    pub item_id: ItemId,
    pub fetch_status: FetchStatus,
    /// Hash of the content last uploaded successfully
    pub remote_blob_hash: Option<ContentHash>,
    pub fetch_error: Option<String>,
}

impl ResourceState {
    pub fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            fetch_status: FetchStatus::Idle,
            remote_blob_hash: None,
            fetch_error: None,
        }
    }
}

/// A remote item whose payload could not be decrypted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDecryption {
    pub item_id: ItemId,
    pub item_type: ItemType,
    /// Raw remote envelope
    pub envelope: Vec<u8>,
    pub remote_updated_time: i64,
}

/// Counter row for one item's failed decryption attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptionFailure {
    pub key: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Counter key for decryption attempts of one item
pub fn decryption_key(item_type: ItemType, id: &ItemId) -> String {
    format!("decrypt:{}:{}", item_type.code(), id)
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    // --- Items ---

    /// Returns the item, including tombstones
    async fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<SyncItem>>;

    /// Writes a local edit and records it in the change log
    ///
    /// The stored `updated_time` is bumped past the previous value if needed,
    /// so it strictly increases; the stored item is returned.
    async fn save_local_item(&self, item: &SyncItem) -> anyhow::Result<SyncItem>;

    /// Tombstones an item locally and records a delete change
    ///
    /// Returns false if the item does not exist or is already deleted.
    async fn delete_local_item(&self, id: &ItemId) -> anyhow::Result<bool>;

    /// Idempotent upsert/delete of a remote version, without a change record
    async fn apply_remote_item(&self, item: &SyncItem) -> anyhow::Result<ApplyOutcome>;

    /// Sets or clears the reason an item is excluded from upload
    async fn set_sync_disabled(&self, id: &ItemId, reason: Option<&str>) -> anyhow::Result<()>;

    /// Parent of every live folder
    async fn folder_parents(&self) -> anyhow::Result<HashMap<ItemId, Option<ItemId>>>;

    /// Live items that are conflict copies
    async fn conflict_items(&self) -> anyhow::Result<Vec<SyncItem>>;

    /// Live items with a `sync_disabled_reason`
    async fn disabled_items(&self) -> anyhow::Result<Vec<SyncItem>>;

    /// True if a live item with this exact title exists under `parent`
    async fn title_exists(&self, title: &str, parent: Option<&ItemId>) -> anyhow::Result<bool>;

    // --- Change log ---

    /// Change records with a sequence greater than `after`, oldest first
    async fn items_changed_since(&self, after: i64, limit: usize)
        -> anyhow::Result<Vec<ChangeRecord>>;

    /// Latest unconsumed change record for the item
    async fn pending_change(&self, item_id: &ItemId) -> anyhow::Result<Option<ChangeRecord>>;

    /// Deletes the item's change records up to and including sequence `up_to`
    async fn consume_changes(&self, item_id: &ItemId, up_to: i64) -> anyhow::Result<u64>;

    // --- Sync records ---

    /// Records a successful exchange of `item` with the target
    async fn mark_synced(
        &self,
        target: &TargetId,
        item: &SyncItem,
        remote_updated_time: i64,
    ) -> anyhow::Result<()>;

    async fn sync_record(
        &self,
        target: &TargetId,
        item_id: &ItemId,
    ) -> anyhow::Result<Option<SyncRecord>>;

    /// Remote modification time of every item known to be on the target
    async fn remote_times(&self, target: &TargetId) -> anyhow::Result<HashMap<ItemId, i64>>;

    async fn forget_synced(&self, target: &TargetId, item_id: &ItemId) -> anyhow::Result<()>;

    async fn has_sync_records(&self, target: &TargetId) -> anyhow::Result<bool>;

    // --- Sync state ---

    /// Persisted state, or a fresh one for a never-synced target
    async fn get_sync_state(&self, target: &TargetId) -> anyhow::Result<SyncState>;

    async fn set_sync_state(&self, state: &SyncState) -> anyhow::Result<()>;

    // --- Resources ---

    async fn read_blob(&self, item_id: &ItemId) -> anyhow::Result<Option<Vec<u8>>>;

    async fn write_blob(&self, item_id: &ItemId, data: &[u8]) -> anyhow::Result<()>;

    /// Transfer state, defaulting to idle for unknown resources
    async fn resource_state(&self, item_id: &ItemId) -> anyhow::Result<ResourceState>;

    async fn set_resource_state(&self, state: &ResourceState) -> anyhow::Result<()>;

    /// Live, upload-enabled resources whose content is not on the remote yet
    async fn resources_needing_upload(&self) -> anyhow::Result<Vec<SyncItem>>;

    /// Live resources whose content is waiting to be downloaded
    async fn resources_needing_download(&self) -> anyhow::Result<Vec<SyncItem>>;

    // --- Decryption ---

    async fn decryption_attempts(&self, key: &str) -> anyhow::Result<u32>;

    /// Increments the counter for `key` and returns the new value
    async fn record_decryption_failure(&self, key: &str, error: &str) -> anyhow::Result<u32>;

    async fn clear_decryption_attempts(&self, key: &str) -> anyhow::Result<()>;

    async fn decryption_failures(&self) -> anyhow::Result<Vec<DecryptionFailure>>;

    /// Keeps an undecryptable envelope for later attempts
    async fn park_undecryptable(
        &self,
        target: &TargetId,
        pending: &PendingDecryption,
    ) -> anyhow::Result<()>;

    async fn pending_decryptions(&self, target: &TargetId)
        -> anyhow::Result<Vec<PendingDecryption>>;

    async fn remove_pending_decryption(
        &self,
        target: &TargetId,
        item_id: &ItemId,
    ) -> anyhow::Result<()>;
}
