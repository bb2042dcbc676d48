//! Sync scheduler - repeats sync runs on an interval
//!
//! The [`SyncScheduler`] drives a [`SyncEngine`] for `sync --watch`. A run
//! starts immediately, then every `interval`, or as soon as a
//! [`SyncTrigger`] asks for one.
//!
//! ## Flow
//!
//! ```text
//! interval tick ──┐
//!                 ├──→ SyncScheduler ──→ SyncEngine::sync
//! SyncTrigger  ───┘         │
//!                     RunDisposition
//! ```
//!
//! Failed runs are classified with [`SyncError::disposition`]: errors that
//! go away on their own delay the next run with exponential backoff, errors
//! that need the user stop the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::SyncEngine;
use crate::error::{RunDisposition, SyncError};

/// Upper bound for the delay after repeated failures
const MAX_BACKOFF: Duration = Duration::from_secs(30 * 60);

/// Delay before the next run after `failures` failed runs in a row
fn backoff(interval: Duration, failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(failures.min(16));
    interval.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Requests a sync from outside the scheduler loop
#[derive(Debug, Clone, Default)]
pub struct SyncTrigger {
    notify: Arc<Notify>,
}

impl SyncTrigger {
    /// Starts a run now instead of at the next tick
    ///
    /// A request made while a run is in progress starts another run right
    /// after it.
    pub fn request_sync(&self) {
        info!("Sync requested");
        self.notify.notify_one();
    }
}

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    trigger: SyncTrigger,
    failures: u32,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        info!(
            interval_secs = interval.as_secs(),
            target = %engine.target(),
            "Creating sync scheduler"
        );
        Self {
            engine,
            interval,
            trigger: SyncTrigger::default(),
            failures: 0,
        }
    }

    pub fn trigger(&self) -> SyncTrigger {
        self.trigger.clone()
    }

    /// Runs until `cancel` fires or an error needs the user
    ///
    /// # Errors
    ///
    /// Returns the first error whose disposition is
    /// [`RunDisposition::NeedsUser`].
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), SyncError> {
        info!("Sync scheduler starting");

        loop {
            let delay = match self.engine.sync(&cancel).await {
                Ok(report) if report.cancelled => break,
                Ok(_) => {
                    self.failures = 0;
                    self.interval
                }
                Err(err) => match err.disposition() {
                    RunDisposition::NeedsUser => {
                        error!(error = %err, "Sync needs attention, scheduler stopping");
                        return Err(err);
                    }
                    RunDisposition::RetryNow => {
                        self.failures += 1;
                        backoff(self.interval, self.failures)
                    }
                    RunDisposition::RetryLater(after) => {
                        self.failures += 1;
                        after.max(backoff(self.interval, self.failures))
                    }
                },
            };
            if self.failures > 0 {
                warn!(
                    failures = self.failures,
                    delay_secs = delay.as_secs(),
                    "Sync failed, delaying next run"
                );
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
                _ = self.trigger.notify.notified() => {}
            }
        }

        info!("Sync scheduler stopped");
        Ok(())
    }
}
