//! SQLite implementation of the `LocalStore` port
//!
//! ## Type Mapping
//!
//! | Domain Type              | SQL Type | Strategy                                   |
//! |--------------------------|----------|--------------------------------------------|
//! | ItemId, TargetId, Cursor | TEXT     | `.as_str()` / validated constructor        |
//! | ItemType, ChangeType     | INTEGER  | `.code()` / `from_code()`                  |
//! | ContentHash              | TEXT     | `.as_str()` / `ContentHash::new()`         |
//! | bool                     | INTEGER  | 0 / 1                                      |
//! | DateTime<Utc>            | TEXT     | ISO 8601 via `to_rfc3339()`                |
//! | SyncItem (base snapshot) | TEXT     | serde_json serialization                   |
//! | LockHandle               | TEXT     | serde_json serialization                   |
//! | FetchStatus              | TEXT     | `Display` / `FromStr`                      |

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use notesync_core::domain::{
    now_millis, ChangeRecord, ChangeType, ContentHash, Cursor, ItemId, ItemType, LockHandle,
    SyncItem, SyncState, TargetId,
};
use notesync_core::ports::{
    ApplyOutcome, DecryptionFailure, FetchStatus, LocalStore, PendingDecryption, ResourceState,
    SyncRecord,
};

use crate::StoreError;

const ITEM_COLUMNS: &str = "id, item_type, title, body, parent_id, updated_time, is_deleted, \
     sync_disabled_reason, conflict_original_id, content_hash, content_size";

const ITEM_COLUMNS_I: &str = "i.id, i.item_type, i.title, i.body, i.parent_id, i.updated_time, \
     i.is_deleted, i.sync_disabled_reason, i.conflict_original_id, i.content_hash, i.content_size";

const SOURCE_LOCAL: &str = "local";
const SOURCE_SYNC: &str = "sync";

/// SQLite-backed local store
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every live item, for status displays
    pub async fn count_items(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE is_deleted = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Number of unconsumed change records
    pub async fn count_pending_changes(&self) -> anyhow::Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM item_changes")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Resets a decryption counter so the item is attempted again
    pub async fn reset_decryption_attempts(&self, key: &str) -> anyhow::Result<()> {
        self.clear_decryption_attempts(key).await
    }
}

// ============================================================================
// Row conversion helpers
// ============================================================================

fn parse_item_id(value: Option<String>) -> Result<Option<ItemId>, StoreError> {
    value.map(ItemId::new).transpose().map_err(StoreError::from)
}

fn row_to_item(row: &SqliteRow) -> Result<SyncItem, StoreError> {
    let id = ItemId::new(row.try_get("id")?)?;
    let item_type = ItemType::from_code(row.try_get("item_type")?)?;
    let content_hash = row
        .try_get::<Option<String>, _>("content_hash")?
        .map(ContentHash::new)
        .transpose()?;
    let content_size = row
        .try_get::<Option<i64>, _>("content_size")?
        .map(|s| s.max(0) as u64);

    Ok(SyncItem::with_id(id, item_type, row.try_get::<String, _>("title")?)
        .with_body(row.try_get::<String, _>("body")?)
        .with_parent(parse_item_id(row.try_get("parent_id")?)?)
        .with_updated_time(row.try_get("updated_time")?)
        .with_deleted(row.try_get::<i64, _>("is_deleted")? != 0)
        .with_sync_disabled_reason(row.try_get("sync_disabled_reason")?)
        .with_conflict_original(parse_item_id(row.try_get("conflict_original_id")?)?)
        .with_content_meta(content_hash, content_size))
}

fn row_to_change(row: &SqliteRow) -> Result<ChangeRecord, StoreError> {
    Ok(ChangeRecord {
        id: row.try_get("id")?,
        item_id: ItemId::new(row.try_get("item_id")?)?,
        item_type: ItemType::from_code(row.try_get("item_type")?)?,
        change_type: ChangeType::from_code(row.try_get("change_type")?)?,
        updated_time: row.try_get("updated_time")?,
        previous_parent_id: parse_item_id(row.try_get("previous_parent_id")?)?,
    })
}

fn parse_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::SerializationError(format!("bad timestamp {s}: {e}")))
        })
        .transpose()
}

async fn fetch_item(conn: &mut SqliteConnection, id: &ItemId) -> Result<Option<SyncItem>, StoreError> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(row_to_item).transpose()
}

async fn write_item(
    conn: &mut SqliteConnection,
    item: &SyncItem,
    exists: bool,
    source: &str,
) -> Result<(), StoreError> {
    let sql = if exists {
        "UPDATE items SET item_type = ?, title = ?, body = ?, parent_id = ?, updated_time = ?, \
         is_deleted = ?, sync_disabled_reason = ?, conflict_original_id = ?, content_hash = ?, \
         content_size = ?, change_source = ? WHERE id = ?"
    } else {
        "INSERT INTO items (item_type, title, body, parent_id, updated_time, is_deleted, \
         sync_disabled_reason, conflict_original_id, content_hash, content_size, change_source, id) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    };
    sqlx::query(sql)
        .bind(item.item_type().code())
        .bind(item.title())
        .bind(item.body())
        .bind(item.parent_id().map(ItemId::as_str))
        .bind(item.updated_time())
        .bind(i64::from(item.is_deleted()))
        .bind(item.sync_disabled_reason())
        .bind(item.conflict_original_id().map(ItemId::as_str))
        .bind(item.content_hash().map(ContentHash::as_str))
        .bind(item.content_size().map(|s| s as i64))
        .bind(source)
        .bind(item.id().as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl SqliteLocalStore {
    async fn query_items(&self, sql: &str) -> anyhow::Result<Vec<SyncItem>> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        let items = rows
            .iter()
            .map(row_to_item)
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(items)
    }
}

// ============================================================================
// LocalStore implementation
// ============================================================================

#[async_trait]
impl LocalStore for SqliteLocalStore {
    // --- Items ---

    async fn get_item(&self, id: &ItemId) -> anyhow::Result<Option<SyncItem>> {
        let mut conn = self.pool.acquire().await?;
        Ok(fetch_item(&mut conn, id).await?)
    }

    async fn save_local_item(&self, item: &SyncItem) -> anyhow::Result<SyncItem> {
        let mut tx = self.pool.begin().await?;
        let previous = fetch_item(&mut tx, item.id()).await?;

        let updated_time = match &previous {
            Some(prev) => item.updated_time().max(prev.updated_time() + 1),
            None => item.updated_time(),
        };
        let stored = item.clone().with_updated_time(updated_time);

        write_item(&mut tx, &stored, previous.is_some(), SOURCE_LOCAL).await?;
        tx.commit().await?;

        tracing::debug!(item_id = %stored.id(), updated_time, "Saved local item");
        Ok(stored)
    }

    async fn delete_local_item(&self, id: &ItemId) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(mut item) = fetch_item(&mut tx, id).await? else {
            return Ok(false);
        };
        if item.is_deleted() {
            return Ok(false);
        }

        let updated_time = now_millis().max(item.updated_time() + 1);
        item.mark_deleted();
        item.set_updated_time(updated_time);
        write_item(&mut tx, &item, true, SOURCE_LOCAL).await?;
        tx.commit().await?;

        tracing::debug!(item_id = %id, "Deleted local item");
        Ok(true)
    }

    async fn apply_remote_item(&self, item: &SyncItem) -> anyhow::Result<ApplyOutcome> {
        let mut tx = self.pool.begin().await?;
        let existing = fetch_item(&mut tx, item.id()).await?;

        let outcome = match &existing {
            None if item.is_deleted() => ApplyOutcome::Unchanged,
            Some(current) if current.is_deleted() && item.is_deleted() => ApplyOutcome::Unchanged,
            Some(current)
                if current.same_content(item) && current.updated_time() == item.updated_time() =>
            {
                ApplyOutcome::Unchanged
            }
            None => ApplyOutcome::Created,
            Some(_) if item.is_deleted() => ApplyOutcome::Deleted,
            Some(_) => ApplyOutcome::Updated,
        };

        if outcome != ApplyOutcome::Unchanged {
            write_item(&mut tx, item, existing.is_some(), SOURCE_SYNC).await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn set_sync_disabled(&self, id: &ItemId, reason: Option<&str>) -> anyhow::Result<()> {
        sqlx::query("UPDATE items SET sync_disabled_reason = ?, change_source = ? WHERE id = ?")
            .bind(reason)
            .bind(SOURCE_SYNC)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn folder_parents(&self) -> anyhow::Result<HashMap<ItemId, Option<ItemId>>> {
        let rows = sqlx::query(
            "SELECT id, parent_id FROM items WHERE item_type = ? AND is_deleted = 0",
        )
        .bind(ItemType::Folder.code())
        .fetch_all(&self.pool)
        .await?;

        let mut parents = HashMap::with_capacity(rows.len());
        for row in &rows {
            let id = ItemId::new(row.try_get("id")?)?;
            let parent = parse_item_id(row.try_get("parent_id")?)?;
            parents.insert(id, parent);
        }
        Ok(parents)
    }

    async fn conflict_items(&self) -> anyhow::Result<Vec<SyncItem>> {
        self.query_items(&format!(
            "SELECT {ITEM_COLUMNS} FROM items \
             WHERE conflict_original_id IS NOT NULL AND is_deleted = 0 ORDER BY updated_time"
        ))
        .await
    }

    async fn disabled_items(&self) -> anyhow::Result<Vec<SyncItem>> {
        self.query_items(&format!(
            "SELECT {ITEM_COLUMNS} FROM items \
             WHERE sync_disabled_reason IS NOT NULL AND is_deleted = 0 ORDER BY updated_time"
        ))
        .await
    }

    async fn title_exists(&self, title: &str, parent: Option<&ItemId>) -> anyhow::Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM items WHERE title = ? AND parent_id IS ? AND is_deleted = 0)",
        )
        .bind(title)
        .bind(parent.map(ItemId::as_str))
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    // --- Change log ---

    async fn items_changed_since(
        &self,
        after: i64,
        limit: usize,
    ) -> anyhow::Result<Vec<ChangeRecord>> {
        let rows = sqlx::query(
            "SELECT id, item_id, item_type, change_type, updated_time, previous_parent_id \
             FROM item_changes WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(after)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let records = rows
            .iter()
            .map(row_to_change)
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(records)
    }

    async fn pending_change(&self, item_id: &ItemId) -> anyhow::Result<Option<ChangeRecord>> {
        let row = sqlx::query(
            "SELECT id, item_id, item_type, change_type, updated_time, previous_parent_id \
             FROM item_changes WHERE item_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_change).transpose()?)
    }

    async fn consume_changes(&self, item_id: &ItemId, up_to: i64) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM item_changes WHERE item_id = ? AND id <= ?")
            .bind(item_id.as_str())
            .bind(up_to)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // --- Sync records ---

    async fn mark_synced(
        &self,
        target: &TargetId,
        item: &SyncItem,
        remote_updated_time: i64,
    ) -> anyhow::Result<()> {
        let base = serde_json::to_string(item).map_err(StoreError::from)?;
        sqlx::query(
            "INSERT OR REPLACE INTO sync_items \
             (target_id, item_id, sync_time, remote_updated_time, base_snapshot) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(target.as_str())
        .bind(item.id().as_str())
        .bind(now_millis())
        .bind(remote_updated_time)
        .bind(base)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn sync_record(
        &self,
        target: &TargetId,
        item_id: &ItemId,
    ) -> anyhow::Result<Option<SyncRecord>> {
        let row = sqlx::query(
            "SELECT sync_time, remote_updated_time, base_snapshot FROM sync_items \
             WHERE target_id = ? AND item_id = ?",
        )
        .bind(target.as_str())
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let base = row
            .try_get::<Option<String>, _>("base_snapshot")?
            .map(|json| serde_json::from_str::<SyncItem>(&json))
            .transpose()
            .map_err(StoreError::from)?;

        Ok(Some(SyncRecord {
            item_id: item_id.clone(),
            sync_time: row.try_get("sync_time")?,
            remote_updated_time: row.try_get("remote_updated_time")?,
            base,
        }))
    }

    async fn remote_times(&self, target: &TargetId) -> anyhow::Result<HashMap<ItemId, i64>> {
        let rows = sqlx::query(
            "SELECT item_id, remote_updated_time FROM sync_items WHERE target_id = ?",
        )
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut times = HashMap::with_capacity(rows.len());
        for row in &rows {
            times.insert(
                ItemId::new(row.try_get("item_id")?)?,
                row.try_get::<i64, _>("remote_updated_time")?,
            );
        }
        Ok(times)
    }

    async fn forget_synced(&self, target: &TargetId, item_id: &ItemId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_items WHERE target_id = ? AND item_id = ?")
            .bind(target.as_str())
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_sync_records(&self, target: &TargetId) -> anyhow::Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sync_items WHERE target_id = ?)")
                .bind(target.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    // --- Sync state ---

    async fn get_sync_state(&self, target: &TargetId) -> anyhow::Result<SyncState> {
        let row = sqlx::query(
            "SELECT last_cursor, lock_handle, last_sync_time FROM sync_state WHERE target_id = ?",
        )
        .bind(target.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(SyncState::new(target.clone()));
        };

        let last_cursor = row
            .try_get::<Option<String>, _>("last_cursor")?
            .map(Cursor::new)
            .transpose()
            .map_err(StoreError::from)?;
        let lock_handle = row
            .try_get::<Option<String>, _>("lock_handle")?
            .map(|json| serde_json::from_str::<LockHandle>(&json))
            .transpose()
            .map_err(StoreError::from)?;

        Ok(SyncState {
            target_id: target.clone(),
            last_cursor,
            lock_handle,
            last_sync_time: parse_time(row.try_get("last_sync_time")?)?,
        })
    }

    async fn set_sync_state(&self, state: &SyncState) -> anyhow::Result<()> {
        let lock_handle = state
            .lock_handle
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(StoreError::from)?;

        sqlx::query(
            "INSERT OR REPLACE INTO sync_state (target_id, last_cursor, lock_handle, last_sync_time) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(state.target_id.as_str())
        .bind(state.last_cursor.as_ref().map(Cursor::as_str))
        .bind(lock_handle)
        .bind(state.last_sync_time.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // --- Resources ---

    async fn read_blob(&self, item_id: &ItemId) -> anyhow::Result<Option<Vec<u8>>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM resource_blobs WHERE item_id = ?")
                .bind(item_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(data)
    }

    async fn write_blob(&self, item_id: &ItemId, data: &[u8]) -> anyhow::Result<()> {
        let hash = ContentHash::of(data);
        sqlx::query(
            "INSERT OR REPLACE INTO resource_blobs (item_id, content_hash, data) VALUES (?, ?, ?)",
        )
        .bind(item_id.as_str())
        .bind(hash.as_str())
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resource_state(&self, item_id: &ItemId) -> anyhow::Result<ResourceState> {
        let row = sqlx::query(
            "SELECT fetch_status, remote_blob_hash, fetch_error FROM resource_states WHERE item_id = ?",
        )
        .bind(item_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(ResourceState::new(item_id.clone()));
        };

        Ok(ResourceState {
            item_id: item_id.clone(),
            fetch_status: FetchStatus::from_str(&row.try_get::<String, _>("fetch_status")?)
                .map_err(StoreError::from)?,
            remote_blob_hash: row
                .try_get::<Option<String>, _>("remote_blob_hash")?
                .map(ContentHash::new)
                .transpose()
                .map_err(StoreError::from)?,
            fetch_error: row.try_get("fetch_error")?,
        })
    }

    async fn set_resource_state(&self, state: &ResourceState) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO resource_states \
             (item_id, fetch_status, remote_blob_hash, fetch_error) VALUES (?, ?, ?, ?)",
        )
        .bind(state.item_id.as_str())
        .bind(state.fetch_status.to_string())
        .bind(state.remote_blob_hash.as_ref().map(ContentHash::as_str))
        .bind(state.fetch_error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resources_needing_upload(&self) -> anyhow::Result<Vec<SyncItem>> {
        self.query_items(&format!(
            "SELECT {ITEM_COLUMNS_I} FROM items i \
             JOIN resource_blobs b ON b.item_id = i.id \
             LEFT JOIN resource_states s ON s.item_id = i.id \
             WHERE i.item_type = {resource} AND i.is_deleted = 0 \
               AND i.sync_disabled_reason IS NULL \
               AND b.content_hash = i.content_hash \
               AND (s.remote_blob_hash IS NULL OR s.remote_blob_hash != i.content_hash) \
             ORDER BY i.updated_time",
            resource = ItemType::Resource.code()
        ))
        .await
    }

    async fn resources_needing_download(&self) -> anyhow::Result<Vec<SyncItem>> {
        self.query_items(&format!(
            "SELECT {ITEM_COLUMNS_I} FROM items i \
             JOIN resource_states s ON s.item_id = i.id \
             WHERE i.item_type = {resource} AND i.is_deleted = 0 \
               AND s.fetch_status = 'pending' \
             ORDER BY i.updated_time",
            resource = ItemType::Resource.code()
        ))
        .await
    }

    // --- Decryption ---

    async fn decryption_attempts(&self, key: &str) -> anyhow::Result<u32> {
        let attempts: Option<i64> =
            sqlx::query_scalar("SELECT attempts FROM decryption_attempts WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(attempts.unwrap_or(0).max(0) as u32)
    }

    async fn record_decryption_failure(&self, key: &str, error: &str) -> anyhow::Result<u32> {
        sqlx::query(
            "INSERT INTO decryption_attempts (key, attempts, last_error, updated_time) \
             VALUES (?, 1, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET attempts = attempts + 1, \
             last_error = excluded.last_error, updated_time = excluded.updated_time",
        )
        .bind(key)
        .bind(error)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        self.decryption_attempts(key).await
    }

    async fn clear_decryption_attempts(&self, key: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM decryption_attempts WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn decryption_failures(&self) -> anyhow::Result<Vec<DecryptionFailure>> {
        let rows = sqlx::query(
            "SELECT key, attempts, last_error FROM decryption_attempts ORDER BY updated_time",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut failures = Vec::with_capacity(rows.len());
        for row in &rows {
            failures.push(DecryptionFailure {
                key: row.try_get("key")?,
                attempts: row.try_get::<i64, _>("attempts")?.max(0) as u32,
                last_error: row.try_get("last_error")?,
            });
        }
        Ok(failures)
    }

    async fn park_undecryptable(
        &self,
        target: &TargetId,
        pending: &PendingDecryption,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO pending_decryptions \
             (target_id, item_id, item_type, envelope, remote_updated_time) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(target.as_str())
        .bind(pending.item_id.as_str())
        .bind(pending.item_type.code())
        .bind(pending.envelope.as_slice())
        .bind(pending.remote_updated_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_decryptions(
        &self,
        target: &TargetId,
    ) -> anyhow::Result<Vec<PendingDecryption>> {
        let rows = sqlx::query(
            "SELECT item_id, item_type, envelope, remote_updated_time FROM pending_decryptions \
             WHERE target_id = ? ORDER BY remote_updated_time",
        )
        .bind(target.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::with_capacity(rows.len());
        for row in &rows {
            pending.push(PendingDecryption {
                item_id: ItemId::new(row.try_get("item_id")?)?,
                item_type: ItemType::from_code(row.try_get("item_type")?)?,
                envelope: row.try_get("envelope")?,
                remote_updated_time: row.try_get("remote_updated_time")?,
            });
        }
        Ok(pending)
    }

    async fn remove_pending_decryption(
        &self,
        target: &TargetId,
        item_id: &ItemId,
    ) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM pending_decryptions WHERE target_id = ? AND item_id = ?")
            .bind(target.as_str())
            .bind(item_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DatabasePool;

    async fn setup() -> SqliteLocalStore {
        let pool = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        SqliteLocalStore::new(pool.pool().clone())
    }

    #[tokio::test]
    async fn sync_writes_do_not_enter_change_log() {
        let store = setup().await;
        let item = SyncItem::new(ItemType::Note, "remote note").with_updated_time(100);

        assert_eq!(
            store.apply_remote_item(&item).await.unwrap(),
            ApplyOutcome::Created
        );
        store
            .set_sync_disabled(item.id(), Some("too large"))
            .await
            .unwrap();

        assert_eq!(store.count_pending_changes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_items_ignores_tombstones() {
        let store = setup().await;
        let a = store
            .save_local_item(&SyncItem::new(ItemType::Note, "a"))
            .await
            .unwrap();
        store
            .save_local_item(&SyncItem::new(ItemType::Note, "b"))
            .await
            .unwrap();
        store.delete_local_item(a.id()).await.unwrap();

        assert_eq!(store.count_items().await.unwrap(), 1);
    }
}
