//! In-process run guard
//!
//! The remote lock keeps other devices out; this registry keeps a second
//! run of the same target inside this process from even trying. Entries are
//! removed when the [`RunGuard`] is dropped, whatever path the run takes.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use notesync_core::domain::{SessionId, TargetId};
use tracing::debug;

use crate::error::SyncError;

/// Targets with an active run, shared by every engine in the process
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<DashMap<TargetId, SessionId>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `target` for `session`
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlreadyRunning` if another session holds it.
    pub fn try_begin(&self, target: &TargetId, session: SessionId) -> Result<RunGuard, SyncError> {
        match self.active.entry(target.clone()) {
            Entry::Occupied(_) => Err(SyncError::AlreadyRunning(target.clone())),
            Entry::Vacant(slot) => {
                slot.insert(session);
                debug!(target = %target, session = %session, "Run registered");
                Ok(RunGuard {
                    active: Arc::clone(&self.active),
                    target: target.clone(),
                })
            }
        }
    }

    pub fn is_running(&self, target: &TargetId) -> bool {
        self.active.contains_key(target)
    }

    /// Session currently running against `target`
    pub fn session(&self, target: &TargetId) -> Option<SessionId> {
        self.active.get(target).map(|entry| *entry.value())
    }
}

/// Releases the target's slot on drop
#[derive(Debug)]
pub struct RunGuard {
    active: Arc<DashMap<TargetId, SessionId>>,
    target: TargetId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.target);
    }
}
