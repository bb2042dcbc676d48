//! Error types for conflict resolution

use notesync_core::domain::ItemId;
use thiserror::Error;

/// Errors that can occur while resolving conflicts
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    /// The local folder tree already contains a cycle
    #[error("folder tree is corrupt: cycle through {0}")]
    CorruptTree(ItemId),

    /// The versions handed to the resolver do not describe the same item
    #[error("mismatched versions: expected {expected}, got {actual}")]
    MismatchedItem { expected: ItemId, actual: ItemId },
}
