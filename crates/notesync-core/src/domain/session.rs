//! SyncSession domain entity
//!
//! A `SyncSession` is the explicit per-run context threaded through the sync
//! pipeline: target, client identity, held lock, cursor progress, the current
//! orchestrator phase and the accumulating report. Nothing about a run lives
//! in process-wide state, so several targets can sync side by side.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::lock::LockHandle;
use super::newtypes::{ClientId, Cursor, SessionId, TargetId};
use super::report::SyncReport;

/// Status of a sync session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session is currently running
    #[default]
    Running,
    /// Session completed successfully
    Completed,
    /// Session failed with an error message
    Failed(String),
    /// Session was cancelled by user or system
    Cancelled,
}

impl SessionStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionStatus::Running)
    }

    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SessionStatus::Completed)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => write!(f, "running"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed(msg) => write!(f, "failed: {}", msg),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ============================================================================
// SyncPhase
// ============================================================================

/// Orchestrator state
///
/// A run walks the phases in order. `Error` is reachable from any phase,
/// and every phase after `Locking` may jump to `Unlocking` so the lock is
/// released on cancellation and failure paths too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Locking,
    PullingDelta,
    ResolvingConflicts,
    Pushing,
    AdvancingCursor,
    Unlocking,
    Error,
}

impl SyncPhase {
    pub fn name(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Locking => "Locking",
            SyncPhase::PullingDelta => "PullingDelta",
            SyncPhase::ResolvingConflicts => "ResolvingConflicts",
            SyncPhase::Pushing => "Pushing",
            SyncPhase::AdvancingCursor => "AdvancingCursor",
            SyncPhase::Unlocking => "Unlocking",
            SyncPhase::Error => "Error",
        }
    }

    pub fn can_transition_to(&self, target: SyncPhase) -> bool {
        use SyncPhase::*;

        if target == Error {
            return *self != Idle;
        }
        match (self, target) {
            (Idle, Locking)
            | (Locking, PullingDelta)
            | (PullingDelta, ResolvingConflicts)
            | (ResolvingConflicts, Pushing)
            | (Pushing, AdvancingCursor)
            | (AdvancingCursor, Unlocking)
            | (Unlocking, Idle)
            | (Error, Unlocking)
            | (Error, Idle)
            // lock never acquired
            | (Locking, Idle) => true,
            (PullingDelta | ResolvingConflicts | Pushing, Unlocking) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SyncSession
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    id: SessionId,
    target_id: TargetId,
    client_id: ClientId,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    status: SessionStatus,
    phase: SyncPhase,
    lock_handle: Option<LockHandle>,
    cursor_start: Option<Cursor>,
    cursor_end: Option<Cursor>,
    report: SyncReport,
}

impl SyncSession {
    pub fn new(target_id: TargetId, client_id: ClientId) -> Self {
        let started_at = Utc::now();
        Self {
            id: SessionId::new(),
            target_id,
            client_id,
            started_at,
            completed_at: None,
            status: SessionStatus::Running,
            phase: SyncPhase::Idle,
            lock_handle: None,
            cursor_start: None,
            cursor_end: None,
            report: SyncReport {
                started_at: Some(started_at),
                ..Default::default()
            },
        }
    }

    // --- Getters ---

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn lock_handle(&self) -> Option<&LockHandle> {
        self.lock_handle.as_ref()
    }

    pub fn cursor_start(&self) -> Option<&Cursor> {
        self.cursor_start.as_ref()
    }

    pub fn cursor_end(&self) -> Option<&Cursor> {
        self.cursor_end.as_ref()
    }

    pub fn report(&self) -> &SyncReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut SyncReport {
        &mut self.report
    }

    /// Handle to write into the lock record for this session
    pub fn lock_identity(&self) -> LockHandle {
        LockHandle {
            client_id: self.client_id,
            session_id: self.id,
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        end - self.started_at
    }

    // --- Methods ---

    /// Moves to `phase`, returning the previous one
    ///
    /// # Errors
    /// Returns `DomainError::InvalidState` for an out-of-order transition.
    pub fn advance_to(&mut self, phase: SyncPhase) -> Result<SyncPhase, DomainError> {
        if !self.phase.can_transition_to(phase) {
            return Err(DomainError::InvalidState {
                from: self.phase.name().to_string(),
                to: phase.name().to_string(),
            });
        }
        let previous = self.phase;
        self.phase = phase;
        Ok(previous)
    }

    pub fn set_lock_handle(&mut self, handle: Option<LockHandle>) {
        self.lock_handle = handle;
    }

    pub fn set_cursor_start(&mut self, cursor: Option<Cursor>) {
        self.cursor_start = cursor.clone();
        self.cursor_end = cursor;
    }

    /// Records the latest durably applied cursor
    pub fn set_cursor_end(&mut self, cursor: Option<Cursor>) {
        self.cursor_end = cursor;
    }

    pub fn complete(&mut self) {
        self.finish(SessionStatus::Completed);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.finish(SessionStatus::Failed(reason.into()));
    }

    pub fn cancel(&mut self) {
        self.report.cancelled = true;
        self.finish(SessionStatus::Cancelled);
    }

    fn finish(&mut self, status: SessionStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.report.finished_at = Some(now);
    }
}
