//! Per-item conflict classification
//!
//! Decides what to do with a remote version of an item given the local
//! version, the last synced version and whether the item has unpushed local
//! changes:
//!
//! | Local pending | Remote    | Outcome                                              |
//! |---------------|-----------|------------------------------------------------------|
//! | none          | any       | apply remote                                         |
//! | update        | deleted   | apply remote; conflict copy if local content is new  |
//! | deleted       | updated   | keep local delete if remote matches base, else recreate |
//! | update        | updated   | field merge, or last-writer-wins for other types     |
//!
//! Ties on `updated_time` go to the remote so that every client reaches the
//! same result without coordination.

use notesync_core::domain::{
    ChangeRecord, ChangeType, ConflictItem, ConflictReason, ItemId, SyncItem,
};
use tracing::debug;

use crate::error::ConflictError;
use crate::merge::{self, MergeResult};
use crate::tree::FolderTree;

/// Versions of one item seen during a sync pass
#[derive(Debug, Clone, Copy)]
pub struct ResolveInput<'a> {
    /// Decoded remote version, possibly a tombstone
    pub remote: &'a SyncItem,
    /// Current local row, including tombstones
    pub local: Option<&'a SyncItem>,
    /// Version recorded at the last successful exchange
    pub base: Option<&'a SyncItem>,
    /// Latest unpushed local change
    pub pending: Option<&'a ChangeRecord>,
}

/// What to do with the original item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Write the remote version locally
    ApplyRemote,
    /// Keep the local version; the pending change will be pushed
    KeepLocal,
    /// Local already matches remote; only the sync record needs updating
    NoOp,
    /// Save this item as a local change so it is pushed to the target
    SaveLocal(SyncItem),
}

/// Full outcome for one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub decision: Decision,
    /// Local edit preserved as a new item, titled by the caller
    pub conflict_copy: Option<ConflictItem>,
    /// Drop the item's pending change records
    pub discard_pending: bool,
    /// The remote placement would have closed a folder cycle
    pub moved_to_root: bool,
    /// Fields were combined from both sides
    pub merged: bool,
}

impl Resolution {
    fn new(decision: Decision) -> Self {
        Self {
            decision,
            conflict_copy: None,
            discard_pending: false,
            moved_to_root: false,
            merged: false,
        }
    }

    fn discarding(mut self) -> Self {
        self.discard_pending = true;
        self
    }

    fn with_copy(mut self, copy: Option<ConflictItem>) -> Self {
        self.conflict_copy = copy;
        self
    }

    /// Item the local store should end up holding, if it changes
    pub fn resulting_item<'a>(&'a self, remote: &'a SyncItem) -> Option<&'a SyncItem> {
        match &self.decision {
            Decision::ApplyRemote => Some(remote),
            Decision::SaveLocal(item) => Some(item),
            Decision::KeepLocal | Decision::NoOp => None,
        }
    }
}

/// Stateless classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves one remote version against local state
    ///
    /// `tree` holds current folder placements and is only consulted for
    /// folders whose parent would change.
    ///
    /// # Errors
    ///
    /// Returns `ConflictError::MismatchedItem` if the versions are for
    /// different ids.
    pub fn resolve(
        &self,
        input: ResolveInput<'_>,
        tree: &FolderTree,
    ) -> Result<Resolution, ConflictError> {
        let remote = input.remote;
        for other in [input.local, input.base].into_iter().flatten() {
            if other.id() != remote.id() {
                return Err(ConflictError::MismatchedItem {
                    expected: remote.id().clone(),
                    actual: other.id().clone(),
                });
            }
        }

        let resolution = self.classify(input);
        let resolution = Self::guard_placement(resolution, input, tree);

        debug!(
            item_id = %remote.id(),
            decision = ?resolution.decision,
            conflict = resolution.conflict_copy.is_some(),
            merged = resolution.merged,
            "Resolved remote change"
        );
        Ok(resolution)
    }

    fn classify(&self, input: ResolveInput<'_>) -> Resolution {
        let ResolveInput {
            remote,
            local,
            base,
            pending,
        } = input;

        let (Some(local), Some(pending)) = (local, pending) else {
            return Resolution::new(Decision::ApplyRemote);
        };

        if remote.is_deleted() {
            return Self::remote_deleted(local, base);
        }

        if pending.change_type == ChangeType::Delete || local.is_deleted() {
            let remote_unchanged = base.is_some_and(|b| b.same_content(remote));
            return if remote_unchanged {
                Resolution::new(Decision::KeepLocal)
            } else {
                Resolution::new(Decision::ApplyRemote).discarding()
            };
        }

        if local.same_content(remote) {
            return Resolution::new(Decision::NoOp).discarding();
        }

        let item_type = remote.item_type();
        match base {
            Some(base) if item_type.supports_field_merge() => {
                Self::merge(base, local, remote)
            }
            None if item_type.keeps_conflict_copies() => Resolution::new(Decision::ApplyRemote)
                .discarding()
                .with_copy(Some(ConflictItem::from_local(
                    local,
                    local.title(),
                    ConflictReason::ContentDiverged,
                ))),
            _ => Self::last_writer_wins(local, remote),
        }
    }

    fn remote_deleted(local: &SyncItem, base: Option<&SyncItem>) -> Resolution {
        let resolution = Resolution::new(Decision::ApplyRemote).discarding();
        if local.is_deleted()
            || !local.item_type().keeps_conflict_copies()
            || !merge::has_meaningful_changes(local, base)
        {
            return resolution;
        }
        resolution.with_copy(Some(ConflictItem::from_local(
            local,
            local.title(),
            ConflictReason::RemoteDeleted,
        )))
    }

    fn merge(base: &SyncItem, local: &SyncItem, remote: &SyncItem) -> Resolution {
        let MergeResult { item, collisions } = merge::three_way(base, local, remote);
        let content_collision = collisions.iter().any(|f| f.is_content());

        let copy = (content_collision && remote.item_type().keeps_conflict_copies()).then(|| {
            ConflictItem::from_local(local, local.title(), ConflictReason::ContentDiverged)
        });

        if item.same_content(remote) {
            return Resolution::new(Decision::ApplyRemote)
                .discarding()
                .with_copy(copy);
        }
        if item.same_content(local) {
            return Resolution::new(Decision::KeepLocal).with_copy(copy);
        }

        let merged = item.with_updated_time(local.updated_time().max(remote.updated_time()) + 1);
        let mut resolution = Resolution::new(Decision::SaveLocal(merged)).with_copy(copy);
        resolution.merged = true;
        resolution
    }

    fn last_writer_wins(local: &SyncItem, remote: &SyncItem) -> Resolution {
        if local.updated_time() > remote.updated_time() {
            Resolution::new(Decision::KeepLocal)
        } else {
            Resolution::new(Decision::ApplyRemote).discarding()
        }
    }

    /// Re-parents a folder to the root when its new placement closes a cycle
    fn guard_placement(
        mut resolution: Resolution,
        input: ResolveInput<'_>,
        tree: &FolderTree,
    ) -> Resolution {
        let Some(item) = resolution.resulting_item(input.remote) else {
            return resolution;
        };
        if !item.is_folder() || item.is_deleted() {
            return resolution;
        }
        let parent: Option<&ItemId> = item.parent_id();
        if parent.is_none() || !tree.would_create_cycle(item.id(), parent) {
            return resolution;
        }

        let mut placed = item.clone();
        placed.set_parent_id(None);
        let bumped = placed
            .updated_time()
            .max(input.local.map_or(0, SyncItem::updated_time))
            + 1;
        placed.set_updated_time(bumped);

        tracing::warn!(
            folder_id = %placed.id(),
            "Folder move would create a cycle; placing it at the root"
        );
        resolution.decision = Decision::SaveLocal(placed);
        resolution.moved_to_root = true;
        resolution
    }
}
