//! Paths of the well-known files on a sync target
//!
//! ```text
//! info.json                 target version and encryption flag
//! locks/sync.json           exclusive sync lock
//! {id}.md                   one serialized item per file
//! .resource/{id}            binary content of resource items
//! ```

use notesync_core::domain::ItemId;

/// Directory holding the items, relative to the target root
pub const ROOT: &str = "";

pub const INFO_PATH: &str = "info.json";

pub const LOCK_PATH: &str = "locks/sync.json";

pub const RESOURCE_DIR: &str = ".resource";

const ITEM_EXTENSION: &str = ".md";

pub fn item_path(id: &ItemId) -> String {
    format!("{}{}", id.as_str(), ITEM_EXTENSION)
}

pub fn resource_path(id: &ItemId) -> String {
    format!("{}/{}", RESOURCE_DIR, id.as_str())
}

/// Extracts the item id from a system path such as `0123...cdef.md`
///
/// Anything that is not exactly a 32-hex id followed by `.md` returns `None`;
/// basic delta ignores such entries.
pub fn item_id_from_path(path: &str) -> Option<ItemId> {
    let name = path.rsplit('/').next().unwrap_or(path);
    let stem = name.strip_suffix(ITEM_EXTENSION)?;
    if !ItemId::is_valid(stem) {
        return None;
    }
    ItemId::new(stem.to_string()).ok()
}

pub fn is_system_path(path: &str) -> bool {
    item_id_from_path(path).is_some()
}

/// Joins a directory and a child name; the root directory is `""`
pub(crate) fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}
