//! Target format check
//!
//! `info.json` records the format version of a target and whether its items
//! are encrypted. A missing file means an empty target. On a first sync the
//! client initializes it; on a later sync an empty target means the remote
//! data was wiped, and the fail-safe stops the run before the wipe is
//! mirrored into the local store.

use notesync_core::domain::TargetId;
use notesync_core::ports::{LocalStore, Precondition, RemoteError, RemoteFileApi};
use notesync_remote::layout::INFO_PATH;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SyncError;
use crate::retry::RetryPolicy;

/// Target format understood by this client
pub const SUPPORTED_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetInfo {
    pub version: u32,
    #[serde(default)]
    pub e2ee: bool,
    #[serde(default)]
    pub app_min_version: String,
}

impl TargetInfo {
    pub fn current(e2ee: bool) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            e2ee,
            app_min_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

async fn read_info(
    api: &dyn RemoteFileApi,
    retry: &RetryPolicy,
) -> Result<Option<TargetInfo>, SyncError> {
    let Some(bytes) = retry.run("get_info", || api.get(INFO_PATH)).await? else {
        return Ok(None);
    };
    let info: TargetInfo = serde_json::from_slice(&bytes).map_err(|e| {
        SyncError::Remote(RemoteError::InvalidResponse(format!(
            "unreadable {INFO_PATH}: {e}"
        )))
    })?;
    Ok(Some(info).filter(|i| i.version > 0))
}

/// Verifies the target can be synced, initializing an empty one
///
/// # Errors
///
/// - `SyncError::FailSafe` if a previously synced target is now empty and
///   `fail_safe` is on
/// - `SyncError::SchemaMismatch` for any version other than
///   [`SUPPORTED_VERSION`]
/// - `SyncError::Encryption` if the target is encrypted and this client
///   cannot decrypt
pub async fn check_target(
    api: &dyn RemoteFileApi,
    retry: &RetryPolicy,
    store: &dyn LocalStore,
    target: &TargetId,
    encryption_enabled: bool,
    fail_safe: bool,
) -> Result<TargetInfo, SyncError> {
    let info = match read_info(api, retry).await? {
        Some(info) => info,
        None => {
            if fail_safe && store.has_sync_records(target).await? {
                return Err(SyncError::FailSafe(format!(
                    "target {target} is empty but was synced before; \
                     refusing to delete local data"
                )));
            }
            let fresh = TargetInfo::current(encryption_enabled);
            let bytes = serde_json::to_vec(&fresh)
                .map_err(|e| SyncError::Corruption(format!("cannot encode target info: {e}")))?;
            let bytes = bytes.as_slice();
            match retry
                .run("put_info", move || {
                    api.put(INFO_PATH, bytes, Some(Precondition::Absent))
                })
                .await
            {
                Ok(()) => {
                    info!(target = %target, version = SUPPORTED_VERSION, "Initialized sync target");
                    fresh
                }
                // Initialized concurrently by another client
                Err(RemoteError::PreconditionFailed(_)) => read_info(api, retry)
                    .await?
                    .ok_or_else(|| SyncError::Corruption(format!("{INFO_PATH} disappeared")))?,
                Err(err) => return Err(err.into()),
            }
        }
    };

    if info.version != SUPPORTED_VERSION {
        return Err(SyncError::SchemaMismatch {
            remote: info.version,
            supported: SUPPORTED_VERSION,
        });
    }
    if info.e2ee && !encryption_enabled {
        return Err(SyncError::Encryption(
            "target is end-to-end encrypted but encryption is not enabled".to_string(),
        ));
    }
    if !info.e2ee && encryption_enabled {
        warn!(target = %target, "Encryption is enabled but the target is not marked encrypted");
    }
    Ok(info)
}
