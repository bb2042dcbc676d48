//! Remote item envelope
//!
//! Each item file on the target is a small JSON envelope. Its header fields
//! are always readable; the payload is either the item's JSON or, when
//! encryption is enabled, base64 of the ciphertext of that JSON.
//!
//! ```json
//! {"id":"0123...","type":1,"updated_time":1700000000000,"parent_id":null,
//!  "is_deleted":false,"encryption_applied":false,"payload":"{...}"}
//! ```

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use notesync_core::domain::{ItemId, ItemType, SyncItem};
use notesync_core::ports::{EncryptionError, EncryptionService};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    id: ItemId,
    #[serde(rename = "type")]
    item_type: i64,
    updated_time: i64,
    parent_id: Option<ItemId>,
    #[serde(default)]
    is_deleted: bool,
    #[serde(default)]
    encryption_applied: bool,
    payload: String,
}

/// Plaintext header of an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub id: ItemId,
    pub item_type: ItemType,
    pub updated_time: i64,
    pub encrypted: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid item envelope: {0}")]
    Invalid(String),

    /// Header is readable, payload is not
    #[error("cannot decrypt item {}: {message}", header.id)]
    Undecryptable {
        header: EnvelopeHeader,
        message: String,
    },
}

pub struct ItemCodec {
    encryption: Arc<dyn EncryptionService>,
}

impl ItemCodec {
    pub fn new(encryption: Arc<dyn EncryptionService>) -> Self {
        Self { encryption }
    }

    pub fn encryption_enabled(&self) -> bool {
        self.encryption.is_enabled()
    }

    /// Serializes `item` into envelope bytes
    ///
    /// The local-only `sync_disabled_reason` is not sent.
    ///
    /// # Errors
    ///
    /// Returns the encryption service's error if the payload cannot be
    /// encrypted.
    pub fn encode(&self, item: &SyncItem) -> Result<Vec<u8>, EncryptionError> {
        let mut outgoing = item.clone();
        outgoing.set_sync_disabled_reason(None);
        let json = serde_json::to_vec(&outgoing)
            .map_err(|e| EncryptionError::Failed(format!("cannot serialize item: {e}")))?;

        let encrypted = self.encryption.is_enabled();
        let payload = if encrypted {
            STANDARD.encode(self.encryption.encrypt(&json)?)
        } else {
            String::from_utf8(json)
                .map_err(|e| EncryptionError::Failed(format!("item JSON is not UTF-8: {e}")))?
        };

        let envelope = Envelope {
            id: item.id().clone(),
            item_type: item.item_type().code(),
            updated_time: item.updated_time(),
            parent_id: item.parent_id().cloned(),
            is_deleted: item.is_deleted(),
            encryption_applied: encrypted,
            payload,
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| EncryptionError::Failed(format!("cannot serialize envelope: {e}")))
    }

    /// Reads only the plaintext header
    pub fn header(bytes: &[u8]) -> Result<EnvelopeHeader, DecodeError> {
        let envelope = parse(bytes)?;
        header_of(&envelope)
    }

    /// Restores the item from envelope bytes
    ///
    /// # Errors
    ///
    /// - `DecodeError::Invalid` for malformed envelopes or payloads that do
    ///   not match their header
    /// - `DecodeError::Undecryptable` if the payload cannot be decrypted
    pub fn decode(&self, bytes: &[u8]) -> Result<SyncItem, DecodeError> {
        let envelope = parse(bytes)?;
        let header = header_of(&envelope)?;

        let json = if envelope.encryption_applied {
            let undecryptable = |message: String| DecodeError::Undecryptable {
                header: header.clone(),
                message,
            };
            if !self.encryption.is_enabled() {
                return Err(undecryptable("encryption is not enabled on this client".into()));
            }
            let ciphertext = STANDARD
                .decode(envelope.payload.as_bytes())
                .map_err(|e| undecryptable(format!("payload is not base64: {e}")))?;
            self.encryption
                .decrypt(&ciphertext)
                .map_err(|e| undecryptable(e.to_string()))?
        } else {
            envelope.payload.into_bytes()
        };

        let item: SyncItem = serde_json::from_slice(&json)
            .map_err(|e| DecodeError::Invalid(format!("payload is not an item: {e}")))?;
        if item.id() != &header.id || item.item_type() != header.item_type {
            return Err(DecodeError::Invalid(format!(
                "payload describes {} ({}), header says {} ({})",
                item.id(),
                item.item_type(),
                header.id,
                header.item_type
            )));
        }
        Ok(item)
    }
}

fn parse(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::Invalid(e.to_string()))
}

fn header_of(envelope: &Envelope) -> Result<EnvelopeHeader, DecodeError> {
    let item_type =
        ItemType::from_code(envelope.item_type).map_err(|e| DecodeError::Invalid(e.to_string()))?;
    Ok(EnvelopeHeader {
        id: envelope.id.clone(),
        item_type,
        updated_time: envelope.updated_time,
        encrypted: envelope.encryption_applied,
    })
}
