//! Remote change detection
//!
//! Two sources produce the same [`DeltaPage`]s:
//!
//! - **Native delta**: backends that can list changes since a cursor are
//!   paged through `list(cursor)`.
//! - **Basic delta**: everywhere else, and whenever the stored cursor is
//!   missing or no longer accepted, a full listing of the target is compared
//!   with the remote times recorded at the last exchange of each item.
//!   Recorded items missing from the listing are reported as deleted.
//!
//! Only item files (see [`layout::item_id_from_path`]) are reported; the
//! lock, target info and resource blobs never show up as changes.

use std::collections::{HashMap, HashSet};

use notesync_core::domain::{Cursor, ItemId, RemoteItem};
use notesync_core::ports::{ListOptions, RemoteError, RemoteFileApi};
use notesync_remote::layout;
use tracing::{debug, warn};

use crate::retry::RetryPolicy;

/// One remote item change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChange {
    pub item_id: ItemId,
    pub path: String,
    /// Remote modification time
    pub updated_time: i64,
    pub is_deleted: bool,
    /// Envelope bytes, when the listing carried them inline
    pub content: Option<Vec<u8>>,
}

impl RemoteChange {
    fn from_remote(item: RemoteItem) -> Option<Self> {
        if item.is_dir {
            return None;
        }
        let item_id = layout::item_id_from_path(&item.path)?;
        Some(Self {
            item_id,
            path: item.path,
            updated_time: item.updated_time,
            is_deleted: item.is_deleted,
            content: item.content,
        })
    }
}

/// A batch of changes that is applied before its cursor is stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeltaPage {
    pub changes: Vec<RemoteChange>,
    /// Cursor to persist once every change on the page is applied
    pub cursor: Option<Cursor>,
    pub has_more: bool,
}

/// How a page was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaMode {
    Native,
    Basic,
}

pub struct DeltaTracker<'a> {
    api: &'a dyn RemoteFileApi,
    retry: &'a RetryPolicy,
    page_size: usize,
}

impl<'a> DeltaTracker<'a> {
    pub fn new(api: &'a dyn RemoteFileApi, retry: &'a RetryPolicy, page_size: usize) -> Self {
        Self {
            api,
            retry,
            page_size: page_size.max(1),
        }
    }

    /// Mode to start a pull with
    ///
    /// Native delta needs both backend support and a stored cursor; a first
    /// sync always starts from a full listing.
    pub fn mode_for(&self, cursor: Option<&Cursor>) -> DeltaMode {
        if self.api.capabilities().native_delta && cursor.is_some() {
            DeltaMode::Native
        } else {
            DeltaMode::Basic
        }
    }

    /// Next page of changes after `cursor`
    ///
    /// Returns `Ok(None)` if the backend rejected the cursor as expired or
    /// unknown; the caller falls back to [`DeltaTracker::basic_delta`].
    pub async fn native_page(&self, cursor: &Cursor) -> Result<Option<DeltaPage>, RemoteError> {
        let api = self.api;
        let options = ListOptions::with_cursor(Some(cursor.clone()), self.page_size);
        let listed = self
            .retry
            .run("list_delta", move || api.list(layout::ROOT, options.clone()))
            .await;

        let page = match listed {
            Ok(page) => page,
            Err(RemoteError::InvalidResponse(message) | RemoteError::NotFound(message)) => {
                warn!(cursor = %cursor, error = %message, "Delta cursor rejected, falling back to full listing");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let inline = page.supports_delta_with_items;
        let changes: Vec<RemoteChange> = page
            .items
            .into_iter()
            .filter_map(RemoteChange::from_remote)
            .collect();
        debug!(
            count = changes.len(),
            has_more = page.has_more,
            inline,
            "Fetched delta page"
        );
        Ok(Some(DeltaPage {
            changes,
            cursor: page.next_cursor.or_else(|| Some(cursor.clone())),
            has_more: page.has_more,
        }))
    }

    /// Full listing compared against `known` remote times
    ///
    /// The returned page has no continuation. Its cursor is the backend's
    /// position at listing time on native-delta backends, `None` elsewhere.
    pub async fn basic_delta(
        &self,
        known: &HashMap<ItemId, i64>,
    ) -> Result<DeltaPage, RemoteError> {
        let native = self.api.capabilities().native_delta;
        let mut listed: Vec<RemoteItem> = Vec::new();
        let mut continuation: Option<Cursor> = None;

        let cursor = loop {
            let api = self.api;
            let options = ListOptions {
                cursor: continuation.clone(),
                limit: None,
            };
            let page = self
                .retry
                .run("list_all", move || api.list(layout::ROOT, options.clone()))
                .await?;
            listed.extend(page.items);
            // On native backends a plain listing is a single snapshot and its
            // cursor marks the delta position, not a listing continuation
            if native || !page.has_more || page.next_cursor.is_none() {
                break if native { page.next_cursor } else { None };
            }
            continuation = page.next_cursor;
        };

        let mut seen: HashSet<ItemId> = HashSet::new();
        let mut changes = Vec::new();
        for change in listed.into_iter().filter_map(RemoteChange::from_remote) {
            seen.insert(change.item_id.clone());
            if change.is_deleted || known.get(&change.item_id) == Some(&change.updated_time) {
                continue;
            }
            changes.push(change);
        }

        let mut gone: Vec<(&ItemId, &i64)> =
            known.iter().filter(|(id, _)| !seen.contains(*id)).collect();
        gone.sort();
        for (id, updated_time) in gone {
            changes.push(RemoteChange {
                item_id: id.clone(),
                path: layout::item_path(id),
                updated_time: *updated_time,
                is_deleted: true,
                content: None,
            });
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            count = changes.len(),
            known = known.len(),
            "Computed basic delta"
        );
        Ok(DeltaPage {
            changes,
            cursor,
            has_more: false,
        })
    }
}
