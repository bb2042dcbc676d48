//! End-of-run report
//!
//! Accumulates per-item outcomes so that a single bad item is reported
//! instead of aborting the whole run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ItemId;

/// Why an item was left out of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// Serialized size exceeds the target's item size limit
    TooLarge { size: u64, max: u64 },
    /// The remote refused the write for lack of space
    QuotaExceeded,
    /// Decryption failed; will be retried on a later run
    DecryptionPending { attempts: u32 },
    /// Decryption attempts exhausted; needs user action
    Undecryptable { attempts: u32 },
    /// Remote entry could not be parsed
    InvalidRemoteItem { message: String },
    /// Resource content is not on the remote yet
    ContentUnavailable,
}

impl SkipReason {
    /// True for reasons that set the item's `sync_disabled_reason`
    pub fn disables_item(&self) -> bool {
        matches!(self, SkipReason::TooLarge { .. } | SkipReason::QuotaExceeded)
    }

    pub fn describe(&self) -> String {
        match self {
            SkipReason::TooLarge { size, max } => {
                format!("item is {size} bytes, target limit is {max} bytes")
            }
            SkipReason::QuotaExceeded => "remote quota exceeded".to_string(),
            SkipReason::DecryptionPending { attempts } => {
                format!("could not be decrypted ({attempts} attempt(s) so far)")
            }
            SkipReason::Undecryptable { attempts } => {
                format!("cannot be decrypted after {attempts} attempt(s)")
            }
            SkipReason::InvalidRemoteItem { message } => format!("invalid remote item: {message}"),
            SkipReason::ContentUnavailable => "resource content not available yet".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    pub item_id: Option<ItemId>,
    pub path: Option<String>,
    pub reason: SkipReason,
}

/// A per-item failure that did not abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: Option<ItemId>,
    pub path: Option<String>,
    pub message: String,
}

/// Summary of one sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Remote items applied locally
    pub downloaded: u64,
    /// Local changes written to the remote
    pub uploaded: u64,
    /// Local items deleted following a remote deletion
    pub deleted_local: u64,
    /// Remote items deleted following a local deletion
    pub deleted_remote: u64,
    /// Items merged field by field
    pub merged: u64,
    /// Conflict copies created during the run
    pub conflicts: Vec<ItemId>,
    pub skipped: Vec<SkippedItem>,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
    /// Total items transferred in either direction
    pub fn items_synced(&self) -> u64 {
        self.downloaded + self.uploaded + self.deleted_local + self.deleted_remote
    }

    pub fn skip(&mut self, item_id: Option<ItemId>, path: Option<String>, reason: SkipReason) {
        self.skipped.push(SkippedItem {
            item_id,
            path,
            reason,
        });
    }

    pub fn fail(&mut self, item_id: Option<ItemId>, path: Option<String>, message: impl Into<String>) {
        self.failures.push(ItemFailure {
            item_id,
            path,
            message: message.into(),
        });
    }

    /// Items disabled because of size or quota limits
    pub fn disabled(&self) -> impl Iterator<Item = &SkippedItem> {
        self.skipped.iter().filter(|s| s.reason.disables_item())
    }

    /// Items whose decryption attempts are exhausted
    pub fn undecryptable(&self) -> impl Iterator<Item = &SkippedItem> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Undecryptable { .. }))
    }

    /// True if the run completed without per-item problems
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failures.is_empty() && !self.cancelled
    }
}
