//! Encryption service port
//!
//! The engine treats encryption as an opaque pass-through on serialized
//! item payloads. Algorithms and key management live behind this trait.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncryptionError {
    /// Ciphertext is corrupt or the key is missing; retrying may not help
    #[error("Not decryptable: {0}")]
    NotDecryptable(String),

    #[error("Encryption failed: {0}")]
    Failed(String),

    /// No key is loaded, so nothing can be encrypted
    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),
}

impl EncryptionError {
    /// True if the failure concerns the service rather than one payload
    pub fn affects_every_item(&self) -> bool {
        matches!(self, EncryptionError::KeyUnavailable(_))
    }
}

pub trait EncryptionService: Send + Sync {
    /// Whether payloads are encrypted before upload
    fn is_enabled(&self) -> bool;

    fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EncryptionError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError>;
}

/// Encryption disabled: payloads pass through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEncryption;

impl EncryptionService for NoEncryption {
    fn is_enabled(&self) -> bool {
        false
    }

    fn encrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(payload.to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, EncryptionError> {
        Ok(ciphertext.to_vec())
    }
}
