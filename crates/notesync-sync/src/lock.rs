//! Remote sync lock
//!
//! A single record at [`LOCK_PATH`] gives one client exclusive use of the
//! target. Acquisition relies on the backend's create-if-absent write; a
//! backend without atomic create only gets best-effort exclusivity, which is
//! logged. While the lock is held a background task rewrites the record's
//! timestamp every refresh interval. A record left unrefreshed for
//! `stale_multiplier` intervals is reclaimed by the next client.
//!
//! ## Lifecycle
//!
//! [`LockManager::acquire`] returns a [`LockGuard`]. The guard owns the
//! refresh task: [`LockGuard::release`] stops it and deletes the record, and
//! dropping the guard on any other path stops the task as well.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notesync_core::config::LockConfig;
use notesync_core::domain::{now_millis, LockHandle, LockRecord, LockState};
use notesync_core::ports::{Precondition, RemoteError, RemoteFileApi};
use notesync_remote::layout::LOCK_PATH;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::retry::RetryPolicy;

/// Outcome of one acquisition attempt
enum Attempt {
    Acquired,
    /// Held by someone else, who is named
    Busy(String),
}

// ============================================================================
// LockManager
// ============================================================================

pub struct LockManager {
    api: Arc<dyn RemoteFileApi>,
    config: LockConfig,
    retry: RetryPolicy,
    client_type: String,
}

impl LockManager {
    pub fn new(api: Arc<dyn RemoteFileApi>, config: LockConfig, retry: RetryPolicy) -> Self {
        Self {
            api,
            config,
            retry,
            client_type: "cli".to_string(),
        }
    }

    /// Sets the free-form client kind written into the record
    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = client_type.into();
        self
    }

    fn stale_after_ms(&self) -> i64 {
        i64::try_from(self.config.stale_after().as_millis()).unwrap_or(i64::MAX)
    }

    /// Acquires the lock for `handle`, retrying while another client holds it
    ///
    /// # Errors
    ///
    /// - `SyncError::LockContention` once the configured retries are used up
    /// - `SyncError::Corruption` if the existing record cannot be parsed
    /// - `SyncError::Cancelled` if `cancel` fires while waiting
    /// - `SyncError::Remote` for remote failures other than contention
    #[tracing::instrument(skip(self, cancel), fields(handle = %handle))]
    pub async fn acquire(
        &self,
        handle: LockHandle,
        cancel: &CancellationToken,
    ) -> Result<LockGuard, SyncError> {
        if !self.api.capabilities().atomic_create {
            warn!(
                backend = self.api.kind(),
                "Backend has no atomic create, lock exclusivity is best effort"
            );
        }

        let mut state = LockState::Unlocked;
        let mut holder = String::new();
        for attempt in 0..=self.config.acquire_retries {
            if attempt > 0 {
                debug!(attempt, holder = %holder, "Lock busy, waiting before retry");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(self.config.retry_delay()) => {}
                }
            }

            state.transition_to(LockState::Acquiring)?;
            match self.try_acquire(handle).await {
                Ok(Attempt::Acquired) => {
                    state.transition_to(LockState::Held)?;
                    info!(attempt, "Sync lock acquired");
                    return Ok(self.start_guard(handle, state));
                }
                Ok(Attempt::Busy(current)) => {
                    state.transition_to(LockState::Unlocked)?;
                    holder = current;
                }
                Err(err) => {
                    state.transition_to(LockState::Unlocked)?;
                    return Err(err);
                }
            }
        }

        warn!(holder = %holder, "Sync target is locked by another client");
        Err(SyncError::LockContention {
            holder,
            retry_after: self.config.retry_delay().max(Duration::from_secs(1)),
        })
    }

    async fn try_acquire(&self, handle: LockHandle) -> Result<Attempt, SyncError> {
        let now = now_millis();
        let record = LockRecord::new(handle, self.client_type.clone(), now);
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| SyncError::Corruption(format!("cannot encode lock record: {e}")))?;

        let precondition = match read_lock(self.api.as_ref(), &self.retry).await? {
            None => Precondition::Absent,
            Some((existing, _)) if existing.is_held_by(&handle) => {
                // Our own record, left by an earlier attempt of this session
                return self.write(&bytes, None, handle).await;
            }
            Some((existing, remote_time)) => {
                if !existing.is_stale(now, self.stale_after_ms()) {
                    return Ok(Attempt::Busy(existing.handle().to_string()));
                }
                warn!(
                    stale_holder = %existing.handle(),
                    last_refresh = existing.updated_time,
                    "Reclaiming stale sync lock"
                );
                Precondition::UpdatedTime(remote_time)
            }
        };
        self.write(&bytes, Some(precondition), handle).await
    }

    async fn write(
        &self,
        bytes: &[u8],
        precondition: Option<Precondition>,
        handle: LockHandle,
    ) -> Result<Attempt, SyncError> {
        let api = &self.api;
        let put = self
            .retry
            .run("put_lock", move || api.put(LOCK_PATH, bytes, precondition))
            .await;
        match put {
            Ok(()) => {}
            // Another client won the race
            Err(RemoteError::PreconditionFailed(_)) => {
                return Ok(Attempt::Busy("concurrent writer".to_string()))
            }
            Err(err) => return Err(err.into()),
        }

        // Read back: on backends without atomic create two writers can both
        // believe they succeeded
        match read_lock(self.api.as_ref(), &self.retry).await? {
            Some((record, _)) if record.is_held_by(&handle) => Ok(Attempt::Acquired),
            Some((record, _)) => Ok(Attempt::Busy(record.handle().to_string())),
            None => Ok(Attempt::Busy("concurrent writer".to_string())),
        }
    }

    fn start_guard(&self, handle: LockHandle, state: LockState) -> LockGuard {
        let cancel = CancellationToken::new();
        let lost = Arc::new(AtomicBool::new(false));
        let refresh = tokio::spawn(refresh_loop(RefreshTask {
            api: Arc::clone(&self.api),
            retry: self.retry.clone(),
            handle,
            client_type: self.client_type.clone(),
            interval: self.config.refresh_interval(),
            lost: Arc::clone(&lost),
            cancel: cancel.clone(),
        }));
        LockGuard {
            api: Arc::clone(&self.api),
            retry: self.retry.clone(),
            handle,
            state,
            cancel,
            lost,
            refresh: Some(refresh),
        }
    }

    /// Current lock record on the target, if any
    pub async fn current(&self) -> Result<Option<LockRecord>, SyncError> {
        Ok(read_lock(self.api.as_ref(), &self.retry)
            .await?
            .map(|(record, _)| record))
    }
}

/// Reads the lock record with the remote time needed for compare-and-swap
async fn read_lock(
    api: &dyn RemoteFileApi,
    retry: &RetryPolicy,
) -> Result<Option<(LockRecord, i64)>, SyncError> {
    let Some(meta) = retry.run("stat_lock", || api.stat(LOCK_PATH)).await? else {
        return Ok(None);
    };
    let Some(bytes) = retry.run("get_lock", || api.get(LOCK_PATH)).await? else {
        return Ok(None);
    };
    let record: LockRecord = serde_json::from_slice(&bytes)
        .map_err(|e| SyncError::Corruption(format!("unreadable lock record: {e}")))?;
    Ok(Some((record, meta.updated_time)))
}

// ============================================================================
// Refresh task
// ============================================================================

struct RefreshTask {
    api: Arc<dyn RemoteFileApi>,
    retry: RetryPolicy,
    handle: LockHandle,
    client_type: String,
    interval: Duration,
    lost: Arc<AtomicBool>,
    cancel: CancellationToken,
}

async fn refresh_loop(task: RefreshTask) {
    let mut ticker = tokio::time::interval(task.interval);
    // The first tick completes immediately; the record was just written
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = task.cancel.cancelled() => break,
            _ = ticker.tick() => {
                match refresh_once(&task).await {
                    Ok(true) => debug!(handle = %task.handle, "Sync lock refreshed"),
                    Ok(false) => {
                        warn!(handle = %task.handle, "Sync lock taken over by another client");
                        task.lost.store(true, Ordering::Release);
                        break;
                    }
                    // Keep trying; the record only goes stale after several misses
                    Err(err) => warn!(error = %err, "Failed to refresh sync lock"),
                }
            }
        }
    }
}

/// Returns false if the record no longer belongs to this handle
async fn refresh_once(task: &RefreshTask) -> Result<bool, SyncError> {
    let Some((current, remote_time)) = read_lock(task.api.as_ref(), &task.retry).await? else {
        return Ok(false);
    };
    if !current.is_held_by(&task.handle) {
        return Ok(false);
    }

    let record = LockRecord::new(task.handle, task.client_type.clone(), now_millis());
    let bytes = serde_json::to_vec(&record)
        .map_err(|e| SyncError::Corruption(format!("cannot encode lock record: {e}")))?;
    let api = &task.api;
    let bytes = bytes.as_slice();
    let precondition = Some(Precondition::UpdatedTime(remote_time));
    match task
        .retry
        .run("refresh_lock", move || api.put(LOCK_PATH, bytes, precondition))
        .await
    {
        Ok(()) => Ok(true),
        // Re-checked on the next tick
        Err(RemoteError::PreconditionFailed(_)) => Ok(true),
        Err(err) => Err(err.into()),
    }
}

// ============================================================================
// LockGuard
// ============================================================================

/// A held lock
///
/// Dropping the guard stops the refresh task but leaves the record in
/// place; call [`LockGuard::release`] to delete it.
pub struct LockGuard {
    api: Arc<dyn RemoteFileApi>,
    retry: RetryPolicy,
    handle: LockHandle,
    state: LockState,
    cancel: CancellationToken,
    lost: Arc<AtomicBool>,
    refresh: Option<JoinHandle<()>>,
}

impl LockGuard {
    pub fn handle(&self) -> LockHandle {
        self.handle
    }

    pub fn state(&self) -> LockState {
        if self.is_lost() && self.state == LockState::Held {
            LockState::Stale
        } else {
            self.state
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    /// Fails once the refresh task has seen another client take the lock
    pub fn check(&self) -> Result<(), SyncError> {
        if self.is_lost() {
            Err(SyncError::LockLost)
        } else {
            Ok(())
        }
    }

    async fn stop_refresh(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.refresh.take() {
            if let Err(err) = task.await {
                warn!(error = %err, "Lock refresh task ended abnormally");
            }
        }
    }

    /// Stops refreshing and deletes the record if it is still ours
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Remote` if the record could not be read or
    /// deleted; it will then go stale and be reclaimed by the next client.
    #[tracing::instrument(skip(self), fields(handle = %self.handle))]
    pub async fn release(mut self) -> Result<(), SyncError> {
        self.stop_refresh().await;
        let from = self.state();
        self.state = from;
        self.state.transition_to(LockState::Releasing)?;

        let result = match read_lock(self.api.as_ref(), &self.retry).await {
            Ok(Some((record, _))) if record.is_held_by(&self.handle) => {
                let api = &self.api;
                self.retry
                    .run("delete_lock", move || api.delete(LOCK_PATH))
                    .await
                    .map_err(SyncError::from)
            }
            Ok(Some((record, _))) => {
                warn!(holder = %record.handle(), "Lock now belongs to another client, leaving it");
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };

        self.state.transition_to(LockState::Unlocked)?;
        if result.is_ok() {
            info!("Sync lock released");
        }
        result
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.refresh.take() {
            task.abort();
        }
    }
}
