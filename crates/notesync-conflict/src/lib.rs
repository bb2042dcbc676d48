//! notesync Conflict - Conflict classification and resolution
//!
//! Provides:
//! - Per-item classification of concurrent local and remote changes
//! - Three-way field merge against the last synced version
//! - Folder cycle detection with a root placement fallback
//! - Unique titles for conflict copies
//!
//! Everything here is pure: the orchestrator feeds in the versions it has
//! and applies the returned [`resolver::Resolution`].

pub mod error;
pub mod merge;
pub mod namer;
pub mod resolver;
pub mod tree;

pub use error::ConflictError;
pub use namer::ConflictNamer;
pub use resolver::{ConflictResolver, Decision, Resolution, ResolveInput};
pub use tree::FolderTree;
