//! In-process sync target
//!
//! Keeps every file in a map and records each mutation in a change log
//! numbered by a monotonically increasing sequence. The sequence doubles as
//! the delta cursor, so this backend supports native delta queries with
//! embedded item bodies. Clones share the same storage, which lets several
//! simulated clients sync against one target inside a test.
//!
//! ## Listing semantics
//!
//! - Without a cursor, `list` returns a snapshot of the directory in a single
//!   page; `next_cursor` is the current sequence.
//! - With a cursor, `list` returns the changes to direct children of the
//!   directory since that sequence, oldest first, at most `limit` per page.
//!   A cursor older than the last compaction is rejected as expired.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use notesync_core::domain::{now_millis, Cursor, RemoteItem};
use notesync_core::ports::{
    Capabilities, ListOptions, ListPage, Precondition, RemoteError, RemoteFileApi,
};

use crate::layout;

const DEFAULT_PAGE_LIMIT: usize = 1000;

// ============================================================================
// Failure injection
// ============================================================================

/// Operation a [`FailureRule`] applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Stat,
    Put,
    Delete,
    Move,
}

/// Makes the next `times` matching calls fail with `error`
#[derive(Debug, Clone)]
pub struct FailureRule {
    pub operation: Operation,
    /// Only paths starting with this prefix match; `None` matches all
    pub path_prefix: Option<String>,
    pub error: RemoteError,
    pub times: usize,
}

impl FailureRule {
    pub fn new(operation: Operation, error: RemoteError) -> Self {
        Self {
            operation,
            path_prefix: None,
            error,
            times: 1,
        }
    }

    #[must_use]
    pub fn on_path(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    fn matches(&self, operation: Operation, path: &str) -> bool {
        self.operation == operation
            && self
                .path_prefix
                .as_deref()
                .map_or(true, |prefix| path.starts_with(prefix))
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    content: Vec<u8>,
    updated_time: i64,
}

#[derive(Debug, Clone)]
struct Change {
    seq: u64,
    path: String,
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    changes: Vec<Change>,
    seq: u64,
    /// Oldest sequence still answerable as a cursor
    floor: u64,
    clock: i64,
    failures: VecDeque<FailureRule>,
    calls: BTreeMap<&'static str, u64>,
}

impl State {
    /// Next server timestamp, strictly after the previous one
    fn tick(&mut self) -> i64 {
        self.clock = (self.clock + 1).max(now_millis());
        self.clock
    }

    fn record(&mut self, path: &str) {
        self.seq += 1;
        self.changes.push(Change {
            seq: self.seq,
            path: path.to_string(),
        });
    }

    fn take_failure(&mut self, operation: Operation, path: &str) -> Result<(), RemoteError> {
        let name = match operation {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Stat => "stat",
            Operation::Put => "put",
            Operation::Delete => "delete",
            Operation::Move => "move",
        };
        *self.calls.entry(name).or_default() += 1;

        let Some(index) = self.failures.iter().position(|r| r.matches(operation, path)) else {
            return Ok(());
        };
        let rule = &mut self.failures[index];
        let error = rule.error.clone();
        if rule.times <= 1 {
            self.failures.remove(index);
        } else {
            rule.times -= 1;
        }
        Err(error)
    }

    fn to_remote_item(&self, path: &str) -> RemoteItem {
        match self.entries.get(path) {
            Some(entry) => RemoteItem {
                path: path.to_string(),
                updated_time: entry.updated_time,
                size: entry.content.len() as u64,
                is_dir: false,
                is_deleted: false,
                content: Some(entry.content.clone()),
            },
            None => RemoteItem::deleted(path, self.clock),
        }
    }
}

fn is_direct_child(dir: &str, path: &str) -> bool {
    let dir = dir.trim_matches('/');
    let rest = if dir.is_empty() {
        path
    } else {
        match path.strip_prefix(dir).and_then(|r| r.strip_prefix('/')) {
            Some(rest) => rest,
            None => return false,
        }
    };
    !rest.is_empty() && !rest.contains('/')
}

fn parse_cursor(cursor: &Cursor) -> Result<u64, RemoteError> {
    cursor
        .as_str()
        .parse::<u64>()
        .map_err(|_| RemoteError::InvalidResponse(format!("malformed cursor: {cursor}")))
}

// ============================================================================
// MemoryFileApi
// ============================================================================

/// Shared in-memory target
#[derive(Debug, Clone)]
pub struct MemoryFileApi {
    state: Arc<Mutex<State>>,
    capabilities: Capabilities,
}

impl Default for MemoryFileApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileApi {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities {
            native_delta: true,
            delta_with_items: true,
            atomic_create: true,
            timestamp_precision_ms: 1,
        })
    }

    /// Advertises different capabilities, e.g. to exercise the basic delta
    /// path or best-effort locking
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            capabilities,
        }
    }

    /// Another view of the same storage with different capabilities
    pub fn share_with_capabilities(&self, capabilities: Capabilities) -> Self {
        Self {
            state: Arc::clone(&self.state),
            capabilities,
        }
    }

    pub async fn inject_failure(&self, rule: FailureRule) {
        self.state.lock().await.failures.push_back(rule);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Drops the change history so every cursor issued so far is expired
    pub async fn compact(&self) {
        let mut state = self.state.lock().await;
        state.changes.clear();
        state.floor = state.seq;
    }

    /// Writes a file directly, bypassing failure injection
    pub async fn insert_raw(&self, path: &str, content: Vec<u8>) {
        let mut state = self.state.lock().await;
        let updated_time = state.tick();
        state.entries.insert(
            path.to_string(),
            Entry {
                content,
                updated_time,
            },
        );
        state.record(path);
    }

    /// Every file path currently stored, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.state.lock().await.entries.keys().cloned().collect()
    }

    /// Number of calls made for an operation (`"put"`, `"get"`, ...)
    pub async fn call_count(&self, operation: &str) -> u64 {
        self.state
            .lock()
            .await
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    fn snapshot(state: &State, dir: &str) -> Vec<RemoteItem> {
        let mut dirs = BTreeSet::new();
        let mut items = Vec::new();
        let prefix = dir.trim_matches('/');

        for (path, entry) in &state.entries {
            if is_direct_child(prefix, path) {
                items.push(RemoteItem {
                    path: path.clone(),
                    updated_time: entry.updated_time,
                    size: entry.content.len() as u64,
                    is_dir: false,
                    is_deleted: false,
                    content: Some(entry.content.clone()),
                });
                continue;
            }
            let rest = if prefix.is_empty() {
                Some(path.as_str())
            } else {
                path.strip_prefix(prefix).and_then(|r| r.strip_prefix('/'))
            };
            if let Some((child_dir, _)) = rest.and_then(|r| r.split_once('/')) {
                dirs.insert(child_dir.to_string());
            }
        }

        items.extend(dirs.into_iter().map(|name| RemoteItem {
            path: layout::join(prefix, &name),
            updated_time: 0,
            size: 0,
            is_dir: true,
            is_deleted: false,
            content: None,
        }));
        items
    }
}

#[async_trait]
impl RemoteFileApi for MemoryFileApi {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn list(&self, path: &str, options: ListOptions) -> Result<ListPage, RemoteError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::List, path)?;

        let Some(cursor) = options.cursor.as_ref().filter(|_| self.capabilities.native_delta)
        else {
            let items = Self::snapshot(&state, path);
            let next_cursor = Cursor::new(state.seq.to_string()).ok();
            return Ok(ListPage::new(items, false, next_cursor));
        };

        let since = parse_cursor(cursor)?;
        if since < state.floor || since > state.seq {
            return Err(RemoteError::InvalidResponse(format!(
                "cursor {since} has expired"
            )));
        }

        let limit = options.limit.unwrap_or(DEFAULT_PAGE_LIMIT).max(1);
        let pending: Vec<Change> = state
            .changes
            .iter()
            .filter(|c| c.seq > since && is_direct_child(path, &c.path))
            .cloned()
            .collect();

        let page = &pending[..pending.len().min(limit)];
        let has_more = pending.len() > page.len();
        let last_seq = if has_more {
            page.last().map_or(since, |c| c.seq)
        } else {
            state.seq
        };

        // One entry per path, reflecting its current state
        let mut seen = BTreeSet::new();
        let mut items = Vec::with_capacity(page.len());
        for change in page.iter().rev() {
            if seen.insert(change.path.clone()) {
                items.push(state.to_remote_item(&change.path));
            }
        }
        items.reverse();

        debug!(since, next = last_seq, count = items.len(), "Memory delta page");
        Ok(ListPage::new(
            items,
            has_more,
            Cursor::new(last_seq.to_string()).ok(),
        ))
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Get, path)?;
        Ok(state.entries.get(path).map(|e| e.content.clone()))
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteItem>, RemoteError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Stat, path)?;
        Ok(state.entries.get(path).map(|e| RemoteItem {
            path: path.to_string(),
            updated_time: e.updated_time,
            size: e.content.len() as u64,
            is_dir: false,
            is_deleted: false,
            content: None,
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        precondition: Option<Precondition>,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Put, path)?;

        match (precondition, state.entries.get(path)) {
            (Some(Precondition::Absent), Some(_)) => {
                return Err(RemoteError::PreconditionFailed(format!("{path} already exists")));
            }
            (Some(Precondition::UpdatedTime(expected)), current) => {
                let actual = current.map(|e| e.updated_time);
                if actual != Some(expected) {
                    return Err(RemoteError::PreconditionFailed(format!(
                        "{path} changed: expected {expected}, found {actual:?}"
                    )));
                }
            }
            _ => {}
        }

        let updated_time = state.tick();
        state.entries.insert(
            path.to_string(),
            Entry {
                content: content.to_vec(),
                updated_time,
            },
        );
        state.record(path);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Delete, path)?;
        if state.entries.remove(path).is_some() {
            state.tick();
            state.record(path);
        }
        Ok(())
    }

    async fn move_item(&self, from: &str, to: &str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.take_failure(Operation::Move, from)?;
        let Some(mut entry) = state.entries.remove(from) else {
            return Err(RemoteError::NotFound(from.to_string()));
        };
        entry.updated_time = state.tick();
        state.entries.insert(to.to_string(), entry);
        state.record(from);
        state.record(to);
        Ok(())
    }
}
