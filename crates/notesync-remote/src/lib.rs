//! notesync Remote - Remote File API backends
//!
//! A closed set of sync targets behind the [`RemoteFileApi`] port:
//! - [`memory::MemoryFileApi`] - in-process target with a native change log
//!   and delta-with-items; used for tests and dry runs
//! - [`filesystem::FileSystemApi`] - a local or mounted directory, no native
//!   delta
//!
//! ## Modules
//!
//! - [`layout`] - where items, resources, the lock and target info live
//! - [`memory`] - in-memory target with failure injection
//! - [`filesystem`] - directory target

pub mod filesystem;
pub mod layout;
pub mod memory;

use std::sync::Arc;

use anyhow::{bail, Result};

use notesync_core::config::{TargetConfig, TargetKind};
use notesync_core::ports::RemoteFileApi;

pub use filesystem::FileSystemApi;
pub use memory::MemoryFileApi;
pub use notesync_core::ports::is_local_server;

/// Builds the backend described by `config`
///
/// # Errors
///
/// Returns an error if a filesystem target has no path.
pub fn build_file_api(config: &TargetConfig) -> Result<Arc<dyn RemoteFileApi>> {
    let api: Arc<dyn RemoteFileApi> = match config.kind {
        TargetKind::Filesystem => {
            if config.path.as_os_str().is_empty() {
                bail!("filesystem target '{}' has no path", config.id);
            }
            Arc::new(FileSystemApi::new(config.path.clone()))
        }
        TargetKind::Memory => Arc::new(MemoryFileApi::new()),
    };

    tracing::debug!(target_id = %config.id, kind = api.kind(), "Remote target ready");
    Ok(api)
}
