//! Domain entities and business rules
//!
//! This module contains the core domain types for notesync:
//! - Newtypes for identifiers, cursors and content hashes
//! - Sync items and the local change log
//! - Per-target sync state and the lock record
//! - Conflict copies and the sync session / report
//! - Domain-specific error types

pub mod change;
pub mod conflict;
pub mod errors;
pub mod lock;
pub mod newtypes;
pub mod remote_item;
pub mod report;
pub mod session;
pub mod sync_item;
pub mod sync_state;

// Re-export commonly used types
pub use change::{ChangeRecord, ChangeType};
pub use conflict::{ConflictItem, ConflictReason};
pub use errors::DomainError;
pub use lock::{LockHandle, LockRecord, LockState};
pub use newtypes::*;
pub use remote_item::RemoteItem;
pub use report::{ItemFailure, SkipReason, SkippedItem, SyncReport};
pub use session::{SessionStatus, SyncPhase, SyncSession};
pub use sync_item::{now_millis, ItemType, SyncItem};
pub use sync_state::SyncState;
