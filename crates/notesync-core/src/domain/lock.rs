//! Remote lock record and the lock state machine
//!
//! A single lock record on the target establishes mutual exclusion between
//! clients. The holder rewrites the record's timestamp on an interval; a
//! record that has not been refreshed within `stale_multiplier` refresh
//! intervals may be reclaimed by another client.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ClientId, SessionId};

// ============================================================================
// LockState
// ============================================================================

/// Lifecycle of a lock as seen by one client
///
/// ```text
/// Unlocked -> Acquiring -> Held -> Releasing -> Unlocked
///                 |          |
///                 v          v
///             Unlocked     Stale -> Acquiring
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    Unlocked,
    Acquiring,
    Held,
    Releasing,
    Stale,
}

impl LockState {
    pub fn name(&self) -> &'static str {
        match self {
            LockState::Unlocked => "Unlocked",
            LockState::Acquiring => "Acquiring",
            LockState::Held => "Held",
            LockState::Releasing => "Releasing",
            LockState::Stale => "Stale",
        }
    }

    pub fn can_transition_to(&self, target: LockState) -> bool {
        matches!(
            (self, target),
            (LockState::Unlocked, LockState::Acquiring)
                | (LockState::Acquiring, LockState::Held)
                // acquisition failed
                | (LockState::Acquiring, LockState::Unlocked)
                | (LockState::Held, LockState::Releasing)
                | (LockState::Held, LockState::Stale)
                | (LockState::Releasing, LockState::Unlocked)
                | (LockState::Stale, LockState::Acquiring)
                | (LockState::Stale, LockState::Releasing)
        )
    }

    /// Moves to `target`, rejecting transitions not in the diagram above
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` for a disallowed transition.
    pub fn transition_to(&mut self, target: LockState) -> Result<(), DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// LockHandle / LockRecord
// ============================================================================

/// Identity of a held lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockHandle {
    pub client_id: ClientId,
    pub session_id: SessionId,
}

impl fmt::Display for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_id, self.session_id)
    }
}

/// Contents of the remote lock file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub client_id: ClientId,
    pub session_id: SessionId,
    /// Free-form client kind, e.g. `cli`
    pub client_type: String,
    /// Last acquisition or refresh, milliseconds since the epoch
    pub updated_time: i64,
}

impl LockRecord {
    pub fn new(handle: LockHandle, client_type: impl Into<String>, now_ms: i64) -> Self {
        Self {
            client_id: handle.client_id,
            session_id: handle.session_id,
            client_type: client_type.into(),
            updated_time: now_ms,
        }
    }

    pub fn handle(&self) -> LockHandle {
        LockHandle {
            client_id: self.client_id,
            session_id: self.session_id,
        }
    }

    /// True if this record belongs to `handle`
    pub fn is_held_by(&self, handle: &LockHandle) -> bool {
        self.handle() == *handle
    }

    /// True once the record has gone `stale_after_ms` without a refresh
    pub fn is_stale(&self, now_ms: i64, stale_after_ms: i64) -> bool {
        now_ms.saturating_sub(self.updated_time) > stale_after_ms
    }
}
