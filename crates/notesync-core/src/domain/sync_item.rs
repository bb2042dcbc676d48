//! SyncItem entity
//!
//! A generic unit of synchronizable content: notes, folders, tags, resources
//! and note-tag links all share this shape. The engine only looks at the
//! fields it needs for reconciliation; `body` is opaque to it.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentHash, ItemId};

/// Current wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ============================================================================
// ItemType
// ============================================================================

/// Kind of synchronizable item
///
/// The numeric codes are part of the persisted and remote formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Note,
    Folder,
    Resource,
    Tag,
    NoteTag,
}

impl ItemType {
    /// Stable numeric code
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            ItemType::Note => 1,
            ItemType::Folder => 2,
            ItemType::Resource => 4,
            ItemType::Tag => 5,
            ItemType::NoteTag => 6,
        }
    }

    /// # Errors
    /// Returns `DomainError::InvalidItemType` for unknown codes.
    pub fn from_code(code: i64) -> Result<Self, DomainError> {
        match code {
            1 => Ok(ItemType::Note),
            2 => Ok(ItemType::Folder),
            4 => Ok(ItemType::Resource),
            5 => Ok(ItemType::Tag),
            6 => Ok(ItemType::NoteTag),
            other => Err(DomainError::InvalidItemType(other)),
        }
    }

    /// Whether concurrent edits to different fields can be merged field by field
    #[must_use]
    pub const fn supports_field_merge(&self) -> bool {
        matches!(self, ItemType::Note | ItemType::Folder)
    }

    /// Whether a diverged local edit is preserved as a conflict copy
    ///
    /// Other types resolve content collisions in favour of the remote.
    #[must_use]
    pub const fn keeps_conflict_copies(&self) -> bool {
        matches!(self, ItemType::Note)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ItemType::Note => "note",
            ItemType::Folder => "folder",
            ItemType::Resource => "resource",
            ItemType::Tag => "tag",
            ItemType::NoteTag => "note_tag",
        };
        f.write_str(name)
    }
}

// ============================================================================
// SyncItem
// ============================================================================

/// A synchronizable record
///
/// `updated_time` is the item's logical clock in milliseconds. The local store
/// guarantees it strictly increases across successive local mutations of the
/// same item; it is never used to order changes across devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncItem {
    id: ItemId,
    item_type: ItemType,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    parent_id: Option<ItemId>,
    updated_time: i64,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    sync_disabled_reason: Option<String>,
    #[serde(default)]
    conflict_original_id: Option<ItemId>,
    #[serde(default)]
    content_hash: Option<ContentHash>,
    #[serde(default)]
    content_size: Option<u64>,
}

impl SyncItem {
    /// Creates a new item with a fresh id, stamped with the current time
    pub fn new(item_type: ItemType, title: impl Into<String>) -> Self {
        Self::with_id(ItemId::generate(), item_type, title)
    }

    /// Creates an item with a known id (reconstitution, tests)
    pub fn with_id(id: ItemId, item_type: ItemType, title: impl Into<String>) -> Self {
        Self {
            id,
            item_type,
            title: title.into(),
            body: String::new(),
            parent_id: None,
            updated_time: now_millis(),
            is_deleted: false,
            sync_disabled_reason: None,
            conflict_original_id: None,
            content_hash: None,
            content_size: None,
        }
    }

    /// Creates a resource item describing a binary attachment
    pub fn resource(title: impl Into<String>, content: &[u8]) -> Self {
        let mut item = Self::new(ItemType::Resource, title);
        item.set_resource_content(content);
        item
    }

    // --- Builders ---

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: Option<ItemId>) -> Self {
        self.parent_id = parent_id;
        self
    }

    #[must_use]
    pub fn with_updated_time(mut self, updated_time: i64) -> Self {
        self.updated_time = updated_time;
        self
    }

    #[must_use]
    pub fn with_deleted(mut self, is_deleted: bool) -> Self {
        self.is_deleted = is_deleted;
        self
    }

    #[must_use]
    pub fn with_sync_disabled_reason(mut self, reason: Option<String>) -> Self {
        self.sync_disabled_reason = reason;
        self
    }

    #[must_use]
    pub fn with_conflict_original(mut self, original: Option<ItemId>) -> Self {
        self.conflict_original_id = original;
        self
    }

    #[must_use]
    pub fn with_content_meta(mut self, hash: Option<ContentHash>, size: Option<u64>) -> Self {
        self.content_hash = hash;
        self.content_size = size;
        self
    }

    // --- Getters ---

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn item_type(&self) -> ItemType {
        self.item_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn parent_id(&self) -> Option<&ItemId> {
        self.parent_id.as_ref()
    }

    pub fn updated_time(&self) -> i64 {
        self.updated_time
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    /// Reason this item is excluded from upload, if any
    pub fn sync_disabled_reason(&self) -> Option<&str> {
        self.sync_disabled_reason.as_deref()
    }

    /// The item this one is a conflict copy of
    pub fn conflict_original_id(&self) -> Option<&ItemId> {
        self.conflict_original_id.as_ref()
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    pub fn content_size(&self) -> Option<u64> {
        self.content_size
    }

    pub fn is_resource(&self) -> bool {
        self.item_type == ItemType::Resource
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }

    pub fn is_conflict(&self) -> bool {
        self.conflict_original_id.is_some()
    }

    // --- Mutators ---

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn set_body(&mut self, body: impl Into<String>) {
        self.body = body.into();
    }

    pub fn set_parent_id(&mut self, parent_id: Option<ItemId>) {
        self.parent_id = parent_id;
    }

    pub fn set_updated_time(&mut self, updated_time: i64) {
        self.updated_time = updated_time;
    }

    pub fn set_sync_disabled_reason(&mut self, reason: Option<String>) {
        self.sync_disabled_reason = reason;
    }

    /// Records new attachment content (hash and size)
    pub fn set_resource_content(&mut self, content: &[u8]) {
        self.content_hash = Some(ContentHash::of(content));
        self.content_size = Some(content.len() as u64);
    }

    /// Turns the item into a tombstone
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    /// True if both items carry the same synchronizable content
    ///
    /// Ignores `updated_time` and the local-only `sync_disabled_reason`.
    pub fn same_content(&self, other: &SyncItem) -> bool {
        self.item_type == other.item_type
            && self.title == other.title
            && self.body == other.body
            && self.parent_id == other.parent_id
            && self.is_deleted == other.is_deleted
            && self.conflict_original_id == other.conflict_original_id
            && self.content_hash == other.content_hash
    }
}
