//! Run-level errors and what the scheduler should do about them
//!
//! Per-item problems (oversized items, undecryptable payloads, quota) never
//! show up here; they are recorded in the [`SyncReport`] and the run goes
//! on. A `SyncError` ends the run.
//!
//! [`SyncReport`]: notesync_core::domain::SyncReport

use std::time::Duration;

use notesync_conflict::ConflictError;
use notesync_core::domain::{DomainError, TargetId};
use notesync_core::ports::{EncryptionError, ErrorClass, RemoteError};
use thiserror::Error;

/// Delay before retrying a rate-limited run when the server gave no hint
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Delay before retrying when another run on the same target is active
pub const ALREADY_RUNNING_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The local store failed; never retried automatically
    #[error("Local store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Sync target is locked by another client ({holder})")]
    LockContention { holder: String, retry_after: Duration },

    /// Another client reclaimed the lock while this run held it
    #[error("Sync lock was lost during the run")]
    LockLost,

    #[error("Remote target version {remote} is not supported (expected {supported})")]
    SchemaMismatch { remote: u32, supported: u32 },

    #[error("Fail-safe triggered: {0}")]
    FailSafe(String),

    #[error("Corrupted state: {0}")]
    Corruption(String),

    #[error("Sync cancelled")]
    Cancelled,

    #[error("A sync run is already active for target {0}")]
    AlreadyRunning(TargetId),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// How the scheduler reacts to a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDisposition {
    /// Retry the run right away
    RetryNow,
    /// Abort; schedule another run after the delay
    RetryLater(Duration),
    /// Abort; nothing will change until the user acts
    NeedsUser,
}

impl SyncError {
    pub fn disposition(&self) -> RunDisposition {
        match self {
            SyncError::Remote(err) => match err.class() {
                ErrorClass::Transient | ErrorClass::Precondition | ErrorClass::NotFound => {
                    RunDisposition::RetryNow
                }
                ErrorClass::RateLimited => RunDisposition::RetryLater(
                    err.retry_after().unwrap_or(DEFAULT_RATE_LIMIT_DELAY),
                ),
                ErrorClass::Quota => RunDisposition::RetryLater(DEFAULT_RATE_LIMIT_DELAY),
                ErrorClass::Auth | ErrorClass::Permanent => RunDisposition::NeedsUser,
            },
            SyncError::LockContention { retry_after, .. } => {
                RunDisposition::RetryLater(*retry_after)
            }
            SyncError::AlreadyRunning(_) => RunDisposition::RetryLater(ALREADY_RUNNING_DELAY),
            SyncError::Store(_)
            | SyncError::LockLost
            | SyncError::SchemaMismatch { .. }
            | SyncError::FailSafe(_)
            | SyncError::Corruption(_)
            | SyncError::Cancelled
            | SyncError::Encryption(_) => RunDisposition::NeedsUser,
        }
    }

    /// True if the error needs the user before syncing can resume
    pub fn needs_user(&self) -> bool {
        self.disposition() == RunDisposition::NeedsUser
    }
}

impl From<ConflictError> for SyncError {
    fn from(err: ConflictError) -> Self {
        SyncError::Corruption(err.to_string())
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        SyncError::Corruption(err.to_string())
    }
}

impl From<EncryptionError> for SyncError {
    fn from(err: EncryptionError) -> Self {
        SyncError::Encryption(err.to_string())
    }
}
