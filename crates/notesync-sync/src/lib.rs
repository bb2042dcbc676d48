//! notesync Sync - Synchronization orchestrator
//!
//! Provides:
//! - Remote lock with refresh, stale takeover and release
//! - Native and basic remote delta with cursor checkpoints
//! - Item upload/download with size limits, encryption and resource blobs
//! - The sync run state machine and an interval scheduler
//!
//! ## Modules
//!
//! - [`engine`] - One sync run: lock, pull, resolve, push, advance cursor
//! - [`lock`] - Advisory remote lock shared by all clients of a target
//! - [`delta`] - Remote change detection
//! - [`transfer`] - Uploads and downloads of single items
//! - [`scheduler`] - Repeated runs for watch mode

pub mod codec;
pub mod delta;
pub mod engine;
pub mod error;
pub mod lock;
pub mod observer;
pub mod retry;
pub mod run_guard;
pub mod scheduler;
pub mod target_info;
pub mod transfer;

pub use engine::SyncEngine;
pub use error::{RunDisposition, SyncError};
pub use lock::{LockGuard, LockManager};
pub use observer::{ChannelObserver, LogObserver};
pub use retry::RetryPolicy;
pub use run_guard::RunRegistry;
pub use scheduler::{SyncScheduler, SyncTrigger};
