//! Remote-side item representation

use serde::{Deserialize, Serialize};

/// One entry returned by the remote file API
///
/// For delta listings the entry describes a change: `is_deleted` marks a
/// removal, and `content` carries the full serialized item when the backend
/// supports delta-with-items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Path relative to the target root, e.g. `0123...cdef.md`
    pub path: String,
    /// Remote-reported modification time in milliseconds
    pub updated_time: i64,
    pub size: u64,
    pub is_dir: bool,
    pub is_deleted: bool,
    /// Embedded serialized item, when the backend stores it alongside metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl RemoteItem {
    /// A plain file entry without embedded content
    pub fn file(path: impl Into<String>, updated_time: i64, size: u64) -> Self {
        Self {
            path: path.into(),
            updated_time,
            size,
            is_dir: false,
            is_deleted: false,
            content: None,
        }
    }

    /// A deletion marker for `path`
    pub fn deleted(path: impl Into<String>, updated_time: i64) -> Self {
        Self {
            path: path.into(),
            updated_time,
            size: 0,
            is_dir: false,
            is_deleted: true,
            content: None,
        }
    }

    /// File name component of the path
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}
