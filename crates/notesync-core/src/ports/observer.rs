//! Progress/event port (driving side: UI and CLI)
//!
//! The orchestrator emits events; renderers decide what to show. Observers
//! are called synchronously from the sync task and must not block.

use crate::domain::{ItemFailure, ItemId, SkippedItem, SyncPhase, SyncReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    PhaseChanged { from: SyncPhase, to: SyncPhase },
    Progress { phase: SyncPhase, done: u64, total: u64 },
    ItemSkipped(SkippedItem),
    ItemFailed(ItemFailure),
    ConflictCreated { original: ItemId, copy: ItemId },
    Finished(SyncReport),
}

pub trait SyncObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SyncObserver for NullObserver {
    fn on_event(&self, _event: &SyncEvent) {}
}
