//! Port definitions (hexagonal architecture interfaces)
//!
//! ## Ports Overview
//!
//! - [`RemoteFileApi`] - list/get/put/delete/move against a sync target
//! - [`LocalStore`] - items, change log and per-target sync bookkeeping
//! - [`EncryptionService`] - opaque encrypt/decrypt of item payloads
//! - [`SyncObserver`] - progress events and the final report

pub mod encryption;
pub mod local_store;
pub mod observer;
pub mod remote_file_api;

pub use encryption::{EncryptionError, EncryptionService, NoEncryption};
pub use local_store::{
    decryption_key, ApplyOutcome, DecryptionFailure, FetchStatus, LocalStore, PendingDecryption,
    ResourceState, SyncRecord,
};
pub use observer::{NullObserver, SyncEvent, SyncObserver};
pub use remote_file_api::{
    is_local_server, Capabilities, ErrorClass, ListOptions, ListPage, Precondition, RemoteError,
    RemoteFileApi,
};
