//! notesync Core - Domain types and ports of the synchronization engine
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncItem`, `ChangeRecord`, `SyncState`, `RemoteItem`,
//!   `ConflictItem`, `LockRecord`, `SyncSession`, `SyncReport`
//! - **Port definitions** - Traits for adapters: `RemoteFileApi`, `LocalStore`,
//!   `EncryptionService`, `SyncObserver`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module holds plain data and invariants with no I/O.
//! Ports define the trait interfaces that adapter crates (`notesync-remote`,
//! `notesync-store`) implement and that `notesync-sync` drives.

pub mod config;
pub mod domain;
pub mod ports;
