//! Domain error types
//!
//! Validation failures for identifiers and values, and invalid state
//! transitions of the lock and orchestrator state machines.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Item id is not 32 lowercase hex characters
    #[error("Invalid item id: {0}")]
    InvalidItemId(String),

    /// Unknown numeric item type code
    #[error("Unknown item type code: {0}")]
    InvalidItemType(i64),

    /// Unknown numeric change type code
    #[error("Unknown change type code: {0}")]
    InvalidChangeType(i64),

    /// Invalid content hash (expected SHA-256 hex)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid delta cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Invalid sync target identifier
    #[error("Invalid target id: {0}")]
    InvalidTargetId(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// UUID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
