//! Remote File API port (driven/secondary port)
//!
//! A uniform interface over heterogeneous remote targets. Backends form a
//! closed set (see `notesync-remote`) and advertise what they can do through
//! [`Capabilities`]; the synchronizer branches on those flags, never on the
//! backend's identity.
//!
//! ## Design Notes
//!
//! - Unlike the other ports this one returns a typed [`RemoteError`]: the
//!   orchestrator's retry and abort policy depends on the failure class.
//! - "Not found" on `get`/`stat` is `Ok(None)` and on `delete` is `Ok(())`:
//!   an absent item is a normal outcome, not an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

use crate::domain::newtypes::Cursor;
use crate::domain::remote_item::RemoteItem;

// ============================================================================
// Error taxonomy
// ============================================================================

/// Failure reported by a remote backend
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Optimistic concurrency check failed
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Coarse classification driving retry and abort decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Item legitimately absent
    NotFound,
    /// Fatal for the run, needs the user
    Auth,
    /// Fatal for the item only
    Quota,
    /// Retry in place with backoff
    Transient,
    /// Re-fetch and re-resolve the item
    Precondition,
    /// Abort and retry the run later
    RateLimited,
    /// Will not succeed by retrying
    Permanent,
}

impl RemoteError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RemoteError::NotFound(_) => ErrorClass::NotFound,
            RemoteError::Unauthorized(_) => ErrorClass::Auth,
            RemoteError::QuotaExceeded(_) => ErrorClass::Quota,
            RemoteError::RateLimited { .. } => ErrorClass::RateLimited,
            RemoteError::PreconditionFailed(_) => ErrorClass::Precondition,
            RemoteError::Network(_)
            | RemoteError::Timeout(_)
            | RemoteError::Server(_)
            | RemoteError::Io(_) => ErrorClass::Transient,
            RemoteError::InvalidResponse(_) => ErrorClass::Permanent,
        }
    }

    /// True for errors worth retrying in place
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Server-suggested delay before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => RemoteError::NotFound(err.to_string()),
            ErrorKind::PermissionDenied => RemoteError::Unauthorized(err.to_string()),
            ErrorKind::AlreadyExists => RemoteError::PreconditionFailed(err.to_string()),
            ErrorKind::TimedOut => RemoteError::Timeout(err.to_string()),
            _ => RemoteError::Io(err.to_string()),
        }
    }
}

// ============================================================================
// DTOs
// ============================================================================

/// What a backend supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// `list` with a cursor returns only changes since that cursor
    pub native_delta: bool,
    /// Delta pages may carry full item bodies inline
    pub delta_with_items: bool,
    /// `put` with [`Precondition::Absent`] is atomic on the backend
    pub atomic_create: bool,
    /// Granularity of reported modification times
    pub timestamp_precision_ms: u64,
}

/// Optimistic concurrency guard for `put`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Only write if nothing exists at the path
    Absent,
    /// Only write if the current remote `updated_time` equals this value
    UpdatedTime(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub cursor: Option<Cursor>,
    pub limit: Option<usize>,
}

impl ListOptions {
    pub fn with_cursor(cursor: Option<Cursor>, limit: usize) -> Self {
        Self {
            cursor,
            limit: Some(limit),
        }
    }
}

/// One page of a listing or delta
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub items: Vec<RemoteItem>,
    pub has_more: bool,
    pub next_cursor: Option<Cursor>,
    /// Every live item on this page carries its serialized body inline
    pub supports_delta_with_items: bool,
}

impl ListPage {
    /// Builds a page, deriving `supports_delta_with_items` from its items
    ///
    /// An empty page never claims inline items; otherwise every live file
    /// entry must carry content.
    pub fn new(items: Vec<RemoteItem>, has_more: bool, next_cursor: Option<Cursor>) -> Self {
        let supports_delta_with_items = !items.is_empty()
            && items
                .iter()
                .filter(|i| !i.is_dir && !i.is_deleted)
                .all(|i| i.content.is_some());
        Self {
            items,
            has_more,
            next_cursor,
            supports_delta_with_items,
        }
    }
}

// ============================================================================
// Port trait
// ============================================================================

#[async_trait]
pub trait RemoteFileApi: Send + Sync {
    /// Short backend name for logs
    fn kind(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Lists `path`, or with a cursor on a native-delta backend, the changes
    /// since that cursor
    async fn list(&self, path: &str, options: ListOptions) -> Result<ListPage, RemoteError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, RemoteError>;

    async fn stat(&self, path: &str) -> Result<Option<RemoteItem>, RemoteError>;

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        precondition: Option<Precondition>,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, path: &str) -> Result<(), RemoteError>;

    async fn move_item(&self, from: &str, to: &str) -> Result<(), RemoteError>;
}

// ============================================================================
// Helpers
// ============================================================================

/// True if `url` points at a loopback server (`localhost`, `127.0.0.0/8`,
/// `[::1]`)
///
/// Used to relax transport checks for self-hosted targets.
pub fn is_local_server(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    match parsed.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    }
}
