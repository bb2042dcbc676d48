//! Three-way field merge
//!
//! Compares the local and remote versions of an item against the version
//! both sides last agreed on. A field changed on one side only takes that
//! side's value. A field changed on both sides to different values is a
//! collision and takes the remote value; content collisions are reported so
//! the caller can preserve the local edit.

use notesync_core::domain::{ItemId, SyncItem};

/// Fields taking part in a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Title,
    Body,
    Parent,
}

impl Field {
    /// Content fields carry user text worth preserving on collision
    pub fn is_content(&self) -> bool {
        matches!(self, Field::Title | Field::Body)
    }
}

/// Outcome of a field merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// Merged item; timestamps are left to the caller
    pub item: SyncItem,
    /// Fields changed on both sides to different values
    pub collisions: Vec<Field>,
}

impl MergeResult {
    pub fn has_content_collision(&self) -> bool {
        self.collisions.iter().any(Field::is_content)
    }
}

fn pick<'a, T: PartialEq + ?Sized>(base: &'a T, local: &'a T, remote: &'a T) -> (&'a T, bool) {
    if local == remote || local == base {
        (remote, false)
    } else if remote == base {
        (local, false)
    } else {
        (remote, true)
    }
}

/// Merges `local` and `remote` against `base`
///
/// The result starts from the remote version, so fields outside the merge
/// (flags, resource metadata) follow the remote.
pub fn three_way(base: &SyncItem, local: &SyncItem, remote: &SyncItem) -> MergeResult {
    let mut collisions = Vec::new();
    let mut item = remote.clone();

    let (title, collided) = pick(base.title(), local.title(), remote.title());
    if collided {
        collisions.push(Field::Title);
    }
    item.set_title(title);

    let (body, collided) = pick(base.body(), local.body(), remote.body());
    if collided {
        collisions.push(Field::Body);
    }
    item.set_body(body);

    let parents = (base.parent_id(), local.parent_id(), remote.parent_id());
    let (parent, collided) = pick::<Option<&ItemId>>(&parents.0, &parents.1, &parents.2);
    if collided {
        collisions.push(Field::Parent);
    }
    item.set_parent_id(parent.cloned());

    MergeResult { item, collisions }
}

/// True if `item` carries content beyond what `base` already had
///
/// Without a base, any non-empty title or body counts.
pub fn has_meaningful_changes(item: &SyncItem, base: Option<&SyncItem>) -> bool {
    match base {
        Some(base) => item.title() != base.title() || item.body() != base.body(),
        None => !item.title().trim().is_empty() || !item.body().trim().is_empty(),
    }
}
