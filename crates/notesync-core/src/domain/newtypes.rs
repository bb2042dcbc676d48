//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for identifiers and opaque values. Each newtype
//! ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

/// Identifies one client installation taking part in synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new random ClientId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a ClientId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClientId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid ClientId: {e}")))
    }
}

/// Identifier for SyncSession entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random SessionId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid SessionId: {e}")))
    }
}

// ============================================================================
// ItemId
// ============================================================================

/// Globally unique item identifier: 32 lowercase hexadecimal characters
///
/// New ids are UUID v4 values in their simple (dash-less) form, which is also
/// the file stem items are stored under on the remote target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId(String);

impl ItemId {
    /// Length of a valid item id
    pub const LEN: usize = 32;

    /// Generate a fresh random ItemId
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Validate and wrap an id string
    ///
    /// # Errors
    /// Returns `DomainError::InvalidItemId` unless the value is exactly 32
    /// lowercase hex characters.
    pub fn new(id: String) -> Result<Self, DomainError> {
        if Self::is_valid(&id) {
            Ok(Self(id))
        } else {
            Err(DomainError::InvalidItemId(id))
        }
    }

    /// True if `s` has the shape of an item id
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        s.len() == Self::LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ItemId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for ItemId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.0
    }
}

// ============================================================================
// TargetId
// ============================================================================

/// Name of a configured sync target; keys the persisted `SyncState`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetId(String);

impl TargetId {
    /// # Errors
    /// Returns `DomainError::InvalidTargetId` for empty names or names with
    /// whitespace.
    pub fn new(name: String) -> Result<Self, DomainError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidTargetId(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TargetId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl Display for TargetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TargetId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for TargetId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TargetId> for String {
    fn from(id: TargetId) -> Self {
        id.0
    }
}

// ============================================================================
// Cursor
// ============================================================================

/// Opaque token marking how much of the remote change history was consumed
///
/// Only the backend that issued a cursor can interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor(String);

impl Cursor {
    /// # Errors
    /// Returns `DomainError::InvalidCursor` for an empty token.
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.trim().is_empty() {
            return Err(DomainError::InvalidCursor(
                "cursor cannot be empty".to_string(),
            ));
        }
        Ok(Self(token))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Cursor {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// SHA-256 digest of resource content, lowercase hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash `data` with SHA-256
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(data)))
    }

    /// # Errors
    /// Returns `DomainError::InvalidHash` unless the value is 64 hex characters.
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidHash(hash));
        }
        Ok(Self(hash.to_ascii_lowercase()))
    }

    /// True if `data` hashes to this value
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::of(data) == *self
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_item_ids_are_valid() {
        let id = ItemId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(ItemId::is_valid(id.as_str()));
        assert_ne!(id, ItemId::generate());
    }

    #[test]
    fn item_id_rejects_bad_shapes() {
        assert!(ItemId::new("abc".to_string()).is_err());
        assert!(ItemId::new("0123456789ABCDEF0123456789abcdef".to_string()).is_err());
        assert!(ItemId::new("0123456789abcdef0123456789abcdeg".to_string()).is_err());
        assert!(ItemId::new("0123456789abcdef0123456789abcdef".to_string()).is_ok());
    }

    #[test]
    fn item_id_serde_validates() {
        let ok: Result<ItemId, _> = serde_json::from_str("\"0123456789abcdef0123456789abcdef\"");
        assert!(ok.is_ok());
        let bad: Result<ItemId, _> = serde_json::from_str("\"not-an-id\"");
        assert!(bad.is_err());
    }

    #[test]
    fn target_id_validation() {
        assert!(TargetId::new("work".to_string()).is_ok());
        assert!(TargetId::new(String::new()).is_err());
        assert!(TargetId::new("my target".to_string()).is_err());
        assert_eq!(TargetId::default().as_str(), "default");
    }

    #[test]
    fn cursor_rejects_empty() {
        assert!(Cursor::new("  ".to_string()).is_err());
        assert_eq!(Cursor::new("42".to_string()).unwrap().as_str(), "42");
    }

    #[test]
    fn content_hash_of_known_value() {
        let hash = ContentHash::of(b"hello");
        assert_eq!(
            hash.as_str(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert!(hash.matches(b"hello"));
        assert!(!hash.matches(b"hello!"));
    }

    #[test]
    fn content_hash_normalizes_case() {
        let upper = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        let hash = ContentHash::new(upper.to_string()).unwrap();
        assert_eq!(hash, ContentHash::of(b"hello"));
        assert!(ContentHash::new("zz".to_string()).is_err());
    }
}
