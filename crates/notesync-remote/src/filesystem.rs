//! Sync target backed by a local directory
//!
//! Typically a folder shared through some other mechanism (network mount,
//! file sync service). There is no server-side change log, so `list` always
//! returns a full listing and the synchronizer falls back to basic delta.
//!
//! ## Design Notes
//!
//! - Writes go to a temporary file in the destination directory and are
//!   renamed into place, so readers never observe a half-written item.
//! - `Precondition::Absent` uses `create_new`, which is atomic on local file
//!   systems. `Precondition::UpdatedTime` is checked with a stat before the
//!   write and is therefore only best effort.
//! - Modification times come from the file system and are reported in
//!   milliseconds.

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use notesync_core::domain::RemoteItem;
use notesync_core::ports::{
    Capabilities, ListOptions, ListPage, Precondition, RemoteError, RemoteFileApi,
};

use crate::layout;

const TEMP_PREFIX: &str = ".tmp-";

/// Directory-backed sync target
#[derive(Debug, Clone)]
pub struct FileSystemApi {
    root: PathBuf,
}

impl FileSystemApi {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a target-relative path to a file system path, refusing anything
    /// that would escape the root
    fn resolve(&self, path: &str) -> Result<PathBuf, RemoteError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RemoteError::InvalidResponse(format!(
                "path escapes target root: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> Result<(), RemoteError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Writes `content` next to `destination` and renames it into place
    async fn write_atomic(destination: &Path, content: &[u8]) -> Result<(), RemoteError> {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let temp = dir.join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4().simple()));

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(content).await?;
            file.sync_all().await?;
            fs::rename(&temp, destination).await
        }
        .await;

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp).await {
                debug!(path = %temp.display(), error = %cleanup, "Temp file cleanup failed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn write_new(destination: &Path, content: &[u8]) -> Result<(), RemoteError> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn mtime_millis(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64)
}

fn to_remote_item(path: String, metadata: &std::fs::Metadata) -> RemoteItem {
    RemoteItem {
        path,
        updated_time: mtime_millis(metadata),
        size: if metadata.is_dir() { 0 } else { metadata.len() },
        is_dir: metadata.is_dir(),
        is_deleted: false,
        content: None,
    }
}

#[async_trait]
impl RemoteFileApi for FileSystemApi {
    fn kind(&self) -> &'static str {
        "filesystem"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            native_delta: false,
            delta_with_items: false,
            atomic_create: true,
            timestamp_precision_ms: 1,
        }
    }

    async fn list(&self, path: &str, options: ListOptions) -> Result<ListPage, RemoteError> {
        if options.cursor.is_some() {
            debug!(path, "Cursor ignored by filesystem target");
        }
        let dir = self.resolve(path)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ListPage::default());
            }
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            // Entry may vanish between readdir and stat
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            items.push(to_remote_item(layout::join(path, &name), &metadata));
        }
        items.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(ListPage::new(items, false, None))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        match fs::read(self.resolve(path)?).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteItem>, RemoteError> {
        match fs::metadata(self.resolve(path)?).await {
            Ok(metadata) => Ok(Some(to_remote_item(path.to_string(), &metadata))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        precondition: Option<Precondition>,
    ) -> Result<(), RemoteError> {
        let destination = self.resolve(path)?;
        Self::ensure_parent(&destination).await?;

        match precondition {
            Some(Precondition::Absent) => Self::write_new(&destination, content).await,
            Some(Precondition::UpdatedTime(expected)) => {
                let current = self.stat(path).await?.map(|item| item.updated_time);
                if current != Some(expected) {
                    return Err(RemoteError::PreconditionFailed(format!(
                        "{path} changed: expected {expected}, found {current:?}"
                    )));
                }
                warn!(path, "Conditional overwrite is not atomic on filesystem targets");
                Self::write_atomic(&destination, content).await
            }
            None => Self::write_atomic(&destination, content).await,
        }
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        match fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn move_item(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        let source = self.resolve(from)?;
        let destination = self.resolve(to)?;
        Self::ensure_parent(&destination).await?;
        fs::rename(&source, &destination).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> (tempfile::TempDir, FileSystemApi) {
        let dir = tempfile::tempdir().unwrap();
        let api = FileSystemApi::new(dir.path());
        (dir, api)
    }

    #[tokio::test]
    async fn put_get_delete() {
        let (_dir, api) = api();
        api.put("a.md", b"hello", None).await.unwrap();
        assert_eq!(api.get("a.md").await.unwrap().unwrap(), b"hello");

        api.delete("a.md").await.unwrap();
        assert!(api.get("a.md").await.unwrap().is_none());
        // Deleting twice is not an error
        api.delete("a.md").await.unwrap();
    }

    #[tokio::test]
    async fn put_creates_parent_directories() {
        let (dir, api) = api();
        api.put("locks/sync.json", b"{}", None).await.unwrap();
        assert!(dir.path().join("locks").join("sync.json").exists());
    }

    #[tokio::test]
    async fn absent_precondition_rejects_existing_file() {
        let (_dir, api) = api();
        api.put("lock", b"a", Some(Precondition::Absent)).await.unwrap();
        let err = api
            .put("lock", b"b", Some(Precondition::Absent))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::PreconditionFailed(_)));
        assert_eq!(api.get("lock").await.unwrap().unwrap(), b"a");
    }

    #[tokio::test]
    async fn updated_time_precondition() {
        let (_dir, api) = api();
        api.put("lock", b"a", None).await.unwrap();
        let time = api.stat("lock").await.unwrap().unwrap().updated_time;

        assert!(matches!(
            api.put("lock", b"b", Some(Precondition::UpdatedTime(time + 5_000)))
                .await,
            Err(RemoteError::PreconditionFailed(_))
        ));
        api.put("lock", b"c", Some(Precondition::UpdatedTime(time)))
            .await
            .unwrap();
        assert_eq!(api.get("lock").await.unwrap().unwrap(), b"c");
    }

    #[tokio::test]
    async fn list_reports_files_and_dirs() {
        let (_dir, api) = api();
        api.put("b.md", b"bb", None).await.unwrap();
        api.put("a.md", b"a", None).await.unwrap();
        api.put(".resource/r", b"blob", None).await.unwrap();

        let page = api.list("", ListOptions::default()).await.unwrap();
        assert!(!page.has_more);
        assert!(!page.supports_delta_with_items);
        let paths: Vec<_> = page.items.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec![".resource", "a.md", "b.md"]);
        assert!(page.items[0].is_dir);
        assert_eq!(page.items[2].size, 2);

        let nested = api.list(".resource", ListOptions::default()).await.unwrap();
        assert_eq!(nested.items[0].path, ".resource/r");
    }

    #[tokio::test]
    async fn list_missing_directory_is_empty() {
        let (_dir, api) = api();
        let page = api.list("nowhere", ListOptions::default()).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn paths_cannot_escape_root() {
        let (_dir, api) = api();
        assert!(api.get("../etc/passwd").await.is_err());
        assert!(api.put("a/../../x", b"x", None).await.is_err());
    }

    #[tokio::test]
    async fn move_item_renames() {
        let (_dir, api) = api();
        api.put("a.md", b"a", None).await.unwrap();
        api.move_item("a.md", "archive/a.md").await.unwrap();
        assert!(api.get("a.md").await.unwrap().is_none());
        assert_eq!(api.get("archive/a.md").await.unwrap().unwrap(), b"a");
    }
}
