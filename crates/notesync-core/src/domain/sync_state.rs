//! Per-target synchronization state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::lock::LockHandle;
use super::newtypes::{Cursor, TargetId};

/// Progress marker for one sync target
///
/// Persisted locally and only rewritten by the orchestrator at checkpoints:
/// after a delta page has been fully applied, and at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub target_id: TargetId,
    /// Remote delta progress; `None` means start from the beginning
    pub last_cursor: Option<Cursor>,
    /// Lock currently held against the target, if a run is in progress
    pub lock_handle: Option<LockHandle>,
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn new(target_id: TargetId) -> Self {
        Self {
            target_id,
            last_cursor: None,
            lock_handle: None,
            last_sync_time: None,
        }
    }

    /// True before the first completed sync of this target
    pub fn is_initial(&self) -> bool {
        self.last_sync_time.is_none() && self.last_cursor.is_none()
    }
}
