//! Item uploader/downloader
//!
//! Moves single items and resource blobs between the local store's world
//! and the target. Every remote call goes through the retry policy. Nothing
//! in here writes to the local store; the orchestrator applies results one
//! item at a time.

use std::sync::Arc;

use notesync_core::domain::{ContentHash, ItemId, SyncItem};
use notesync_core::ports::{EncryptionError, Precondition, RemoteError, RemoteFileApi};
use notesync_remote::layout;
use tracing::{debug, warn};

use crate::codec::{DecodeError, ItemCodec};
use crate::delta::RemoteChange;
use crate::retry::RetryPolicy;

/// Serialized item ready to be written, or the reason it cannot be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedUpload {
    Ready(Vec<u8>),
    TooLarge { size: u64, max: u64 },
}

/// Result of uploading a resource blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobUpload {
    Uploaded,
    TooLarge { size: u64, max: u64 },
}

/// Result of fetching a resource blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobDownload {
    Ready(Vec<u8>),
    /// Not uploaded yet by the owning client
    Missing,
    /// Content does not match the metadata's hash
    Corrupt { expected: String, actual: String },
}

pub struct ItemTransfer {
    api: Arc<dyn RemoteFileApi>,
    retry: RetryPolicy,
    codec: ItemCodec,
    max_item_size: u64,
}

impl ItemTransfer {
    pub fn new(
        api: Arc<dyn RemoteFileApi>,
        retry: RetryPolicy,
        codec: ItemCodec,
        max_item_size: u64,
    ) -> Self {
        Self {
            api,
            retry,
            codec,
            max_item_size,
        }
    }

    pub fn codec(&self) -> &ItemCodec {
        &self.codec
    }

    pub fn max_item_size(&self) -> u64 {
        self.max_item_size
    }

    // ------------------------------------------------------------------------
    // Upload
    // ------------------------------------------------------------------------

    /// Serializes, encrypts and size-checks `item`
    pub fn prepare(&self, item: &SyncItem) -> Result<PreparedUpload, EncryptionError> {
        let bytes = self.codec.encode(item)?;
        let size = bytes.len() as u64;
        if size > self.max_item_size {
            return Ok(PreparedUpload::TooLarge {
                size,
                max: self.max_item_size,
            });
        }
        Ok(PreparedUpload::Ready(bytes))
    }

    /// Writes envelope bytes and returns the remote time of the new version
    pub async fn put_item(
        &self,
        id: &ItemId,
        bytes: &[u8],
        precondition: Option<Precondition>,
    ) -> Result<i64, RemoteError> {
        let path = layout::item_path(id);
        let api = &self.api;
        let target = path.as_str();
        self.retry
            .run("put_item", move || api.put(target, bytes, precondition))
            .await?;
        self.remote_time(target).await
    }

    async fn remote_time(&self, path: &str) -> Result<i64, RemoteError> {
        let api = &self.api;
        let stat = self.retry.run("stat_item", move || api.stat(path)).await?;
        match stat {
            Some(meta) => Ok(meta.updated_time),
            None => {
                // Deleted right after our write; the next delta will say so
                warn!(path, "Item vanished right after upload");
                Ok(0)
            }
        }
    }

    /// Removes an item file and, for resources, its blob
    pub async fn delete_item(&self, item: &SyncItem) -> Result<(), RemoteError> {
        let api = &self.api;
        let path = layout::item_path(item.id());
        let target = path.as_str();
        self.retry
            .run("delete_item", move || api.delete(target))
            .await?;
        if item.is_resource() {
            let blob = layout::resource_path(item.id());
            let target = blob.as_str();
            self.retry
                .run("delete_blob", move || api.delete(target))
                .await?;
        }
        debug!(item_id = %item.id(), "Deleted remote item");
        Ok(())
    }

    /// Uploads a resource blob; content over the size limit is refused
    pub async fn upload_blob(
        &self,
        item: &SyncItem,
        data: &[u8],
    ) -> Result<BlobUpload, RemoteError> {
        let size = data.len() as u64;
        if size > self.max_item_size {
            return Ok(BlobUpload::TooLarge {
                size,
                max: self.max_item_size,
            });
        }
        let api = &self.api;
        let path = layout::resource_path(item.id());
        let target = path.as_str();
        self.retry
            .run("put_blob", move || api.put(target, data, None))
            .await?;
        debug!(item_id = %item.id(), size, "Uploaded resource blob");
        Ok(BlobUpload::Uploaded)
    }

    // ------------------------------------------------------------------------
    // Download
    // ------------------------------------------------------------------------

    /// Envelope bytes for a change, using inline content when present
    pub async fn fetch(&self, change: &RemoteChange) -> Result<Option<Vec<u8>>, RemoteError> {
        if let Some(content) = &change.content {
            return Ok(Some(content.clone()));
        }
        let api = &self.api;
        let target = change.path.as_str();
        self.retry.run("get_item", move || api.get(target)).await
    }

    /// Current remote envelope of `id` with its remote time
    pub async fn refetch(&self, id: &ItemId) -> Result<Option<(Vec<u8>, i64)>, RemoteError> {
        let path = layout::item_path(id);
        let api = &self.api;
        let target = path.as_str();
        let Some(meta) = self.retry.run("stat_item", move || api.stat(target)).await? else {
            return Ok(None);
        };
        let bytes = self.retry.run("get_item", move || api.get(target)).await?;
        Ok(bytes.map(|b| (b, meta.updated_time)))
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<SyncItem, DecodeError> {
        self.codec.decode(bytes)
    }

    /// Fetches and validates a resource blob against the item's hash
    pub async fn download_blob(&self, item: &SyncItem) -> Result<BlobDownload, RemoteError> {
        let api = &self.api;
        let path = layout::resource_path(item.id());
        let target = path.as_str();
        let Some(data) = self.retry.run("get_blob", move || api.get(target)).await? else {
            return Ok(BlobDownload::Missing);
        };
        if let Some(expected) = item.content_hash() {
            if !expected.matches(&data) {
                return Ok(BlobDownload::Corrupt {
                    expected: expected.to_string(),
                    actual: ContentHash::of(&data).to_string(),
                });
            }
        }
        Ok(BlobDownload::Ready(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::domain::ItemType;
    use notesync_core::ports::NoEncryption;
    use notesync_remote::MemoryFileApi;

    fn transfer(api: &MemoryFileApi, max: u64) -> ItemTransfer {
        ItemTransfer::new(
            Arc::new(api.clone()),
            RetryPolicy::default(),
            ItemCodec::new(Arc::new(NoEncryption)),
            max,
        )
    }

    #[tokio::test]
    async fn oversized_items_are_not_prepared() {
        let api = MemoryFileApi::new();
        let item = SyncItem::new(ItemType::Note, "big").with_body("x".repeat(2_000));
        match transfer(&api, 1_000).prepare(&item).unwrap() {
            PreparedUpload::TooLarge { size, max } => {
                assert!(size > 2_000);
                assert_eq!(max, 1_000);
            }
            PreparedUpload::Ready(_) => panic!("should be too large"),
        }
    }

    #[tokio::test]
    async fn upload_then_fetch() {
        let api = MemoryFileApi::new();
        let t = transfer(&api, 10_000);
        let item = SyncItem::new(ItemType::Note, "n");
        let PreparedUpload::Ready(bytes) = t.prepare(&item).unwrap() else {
            panic!("should fit");
        };

        let remote_time = t
            .put_item(item.id(), &bytes, Some(Precondition::Absent))
            .await
            .unwrap();
        assert!(remote_time > 0);

        let (fetched, time) = t.refetch(item.id()).await.unwrap().unwrap();
        assert_eq!(time, remote_time);
        assert_eq!(t.decode(&fetched).unwrap(), item);
    }

    #[tokio::test]
    async fn blobs_are_validated_against_hash() {
        let api = MemoryFileApi::new();
        let t = transfer(&api, 10_000);
        let item = SyncItem::resource("photo.png", b"pixels");

        assert_eq!(t.download_blob(&item).await.unwrap(), BlobDownload::Missing);

        assert_eq!(
            t.upload_blob(&item, b"pixels").await.unwrap(),
            BlobUpload::Uploaded
        );
        assert_eq!(
            t.download_blob(&item).await.unwrap(),
            BlobDownload::Ready(b"pixels".to_vec())
        );

        api.insert_raw(&layout::resource_path(item.id()), b"truncated".to_vec())
            .await;
        assert!(matches!(
            t.download_blob(&item).await.unwrap(),
            BlobDownload::Corrupt { .. }
        ));
    }

    #[tokio::test]
    async fn deleting_a_resource_removes_its_blob() {
        let api = MemoryFileApi::new();
        let t = transfer(&api, 10_000);
        let item = SyncItem::resource("a.bin", b"abc");
        let PreparedUpload::Ready(bytes) = t.prepare(&item).unwrap() else {
            panic!("should fit");
        };
        t.put_item(item.id(), &bytes, None).await.unwrap();
        t.upload_blob(&item, b"abc").await.unwrap();

        t.delete_item(&item).await.unwrap();
        assert!(api.paths().await.is_empty());
    }
}
