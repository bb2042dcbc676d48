//! Ready-made [`SyncObserver`] implementations

use notesync_core::ports::{SyncEvent, SyncObserver};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Forwards events to an unbounded channel
///
/// Sending never blocks the sync task; events are dropped once the receiver
/// is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SyncObserver for ChannelObserver {
    fn on_event(&self, event: &SyncEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl SyncObserver for LogObserver {
    fn on_event(&self, event: &SyncEvent) {
        match event {
            SyncEvent::PhaseChanged { from, to } => debug!(%from, %to, "Sync phase changed"),
            SyncEvent::Progress { phase, done, total } => {
                debug!(%phase, done, total, "Sync progress")
            }
            SyncEvent::ItemSkipped(skipped) => warn!(
                item_id = ?skipped.item_id,
                reason = %skipped.reason.describe(),
                "Item skipped"
            ),
            SyncEvent::ItemFailed(failure) => warn!(
                item_id = ?failure.item_id,
                error = %failure.message,
                "Item failed"
            ),
            SyncEvent::ConflictCreated { original, copy } => {
                info!(%original, %copy, "Conflict copy created")
            }
            SyncEvent::Finished(report) => info!(
                synced = report.items_synced(),
                conflicts = report.conflicts.len(),
                skipped = report.skipped.len(),
                failures = report.failures.len(),
                "Sync finished"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::domain::SyncPhase;

    #[test]
    fn channel_observer_forwards_events() {
        let (observer, mut rx) = ChannelObserver::new();
        let event = SyncEvent::PhaseChanged {
            from: SyncPhase::Idle,
            to: SyncPhase::Locking,
        };
        observer.on_event(&event);
        assert_eq!(rx.try_recv().unwrap(), event);
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_event(&SyncEvent::Progress {
            phase: SyncPhase::Pushing,
            done: 1,
            total: 2,
        });
    }
}
