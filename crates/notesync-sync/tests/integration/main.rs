//! Integration tests for notesync-sync
//!
//! Simulates several clients, each with its own local store, syncing
//! against one shared in-memory or on-disk target.

mod common;

mod test_decryption;
mod test_delta;
mod test_errors;
mod test_locking;
mod test_resources;
mod test_scenarios;
