//! Local change log entries
//!
//! One `ChangeRecord` is written by the local store's change-tracking trigger
//! for every local item write. Records are consumed (deleted) once the change
//! has been pushed to the remote.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::ItemId;
use super::sync_item::ItemType;

/// Kind of local mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            ChangeType::Create => 1,
            ChangeType::Update => 2,
            ChangeType::Delete => 3,
        }
    }

    /// # Errors
    /// Returns `DomainError::InvalidChangeType` for unknown codes.
    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            1 => Ok(ChangeType::Create),
            2 => Ok(ChangeType::Update),
            3 => Ok(ChangeType::Delete),
            other => Err(DomainError::InvalidChangeType(other)),
        }
    }
}

/// One tracked local mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Monotonic sequence number assigned by the store
    pub id: i64,
    pub item_id: ItemId,
    pub item_type: ItemType,
    pub change_type: ChangeType,
    /// `updated_time` of the item after the mutation
    pub updated_time: i64,
    /// Parent before the mutation, used to spot re-parenting
    pub previous_parent_id: Option<ItemId>,
}

impl ChangeRecord {
    /// True if this change moved the item to another parent
    pub fn is_move(&self, current_parent: Option<&ItemId>) -> bool {
        self.change_type == ChangeType::Update && self.previous_parent_id.as_ref() != current_parent
    }

    /// Keeps only the latest record per item, ordered by that record's sequence
    ///
    /// Older records for the same item are superseded: pushing the item's
    /// current state covers them.
    pub fn collapse(records: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
        let mut latest: std::collections::HashMap<ItemId, ChangeRecord> =
            std::collections::HashMap::new();
        for record in records {
            match latest.get(&record.item_id) {
                Some(existing) if existing.id >= record.id => {}
                _ => {
                    latest.insert(record.item_id.clone(), record);
                }
            }
        }
        let mut collapsed: Vec<ChangeRecord> = latest.into_values().collect();
        collapsed.sort_by_key(|r| r.id);
        collapsed
    }
}
