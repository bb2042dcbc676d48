//! Conflict copies
//!
//! When a local edit cannot be reconciled with the remote version, the local
//! version is preserved under a new id so the user can compare and merge by
//! hand. The sync engine never deletes conflict copies itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ItemId;
use super::sync_item::{now_millis, SyncItem};

/// Why a conflict copy was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Both sides changed the same content field to different values
    ContentDiverged,
    /// The remote deleted an item that had unsynced local edits
    RemoteDeleted,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::ContentDiverged => "content_diverged",
            ConflictReason::RemoteDeleted => "remote_deleted",
        }
    }
}

/// A duplicate of a local item preserving content that lost a conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictItem {
    item: SyncItem,
    original_id: ItemId,
    reason: ConflictReason,
    detected_at: DateTime<Utc>,
}

impl ConflictItem {
    /// Copies `local` under a fresh id with the human-readable `title`
    ///
    /// The copy keeps the original's body and parent and points back to it
    /// through `conflict_original_id`.
    pub fn from_local(local: &SyncItem, title: impl Into<String>, reason: ConflictReason) -> Self {
        let item = SyncItem::new(local.item_type(), title)
            .with_body(local.body())
            .with_parent(local.parent_id().cloned())
            .with_content_meta(local.content_hash().cloned(), local.content_size())
            .with_conflict_original(Some(local.id().clone()))
            .with_updated_time(now_millis());
        Self {
            item,
            original_id: local.id().clone(),
            reason,
            detected_at: Utc::now(),
        }
    }

    pub fn item(&self) -> &SyncItem {
        &self.item
    }

    pub fn original_id(&self) -> &ItemId {
        &self.original_id
    }

    pub fn reason(&self) -> ConflictReason {
        self.reason
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn into_item(self) -> SyncItem {
        self.item
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ItemType;

    #[test]
    fn conflict_copy_preserves_local_content_under_new_id() {
        let parent = ItemId::generate();
        let local = SyncItem::new(ItemType::Note, "N1")
            .with_body("my edit")
            .with_parent(Some(parent.clone()));

        let conflict = ConflictItem::from_local(&local, "N1 (conflict)", ConflictReason::ContentDiverged);

        assert_ne!(conflict.item().id(), local.id());
        assert_eq!(conflict.item().title(), "N1 (conflict)");
        assert_eq!(conflict.item().body(), "my edit");
        assert_eq!(conflict.item().parent_id(), Some(&parent));
        assert_eq!(conflict.item().conflict_original_id(), Some(local.id()));
        assert_eq!(conflict.original_id(), local.id());
        assert!(conflict.item().is_conflict());
    }
}
