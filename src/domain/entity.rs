//! Entity Identifiers
//!
//! Tokens and wallets discovered at runtime are keyed by their on-chain
//! address. The address is only ever used as a map key, never parsed
//! beyond the base58 validity check applied at discovery time.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length in bytes of a decoded Solana address
const SOLANA_ADDRESS_BYTES: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntityIdError {
    #[error("Entity id is empty")]
    Empty,
    #[error("Entity id '{0}' is not valid base58")]
    NotBase58(String),
    #[error("Entity id '{id}' decodes to {len} bytes, expected 32")]
    WrongLength { id: String, len: usize },
}

/// Opaque address of a token or wallet
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap an address without validation (config seeds, test fixtures)
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a Solana address: base58 text decoding to exactly 32 bytes
    pub fn parse_solana(raw: &str) -> Result<Self, EntityIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EntityIdError::Empty);
        }

        let bytes = bs58::decode(trimmed)
            .into_vec()
            .map_err(|_| EntityIdError::NotBase58(trimmed.to_string()))?;

        if bytes.len() != SOLANA_ADDRESS_BYTES {
            return Err(EntityIdError::WrongLength {
                id: trimmed.to_string(),
                len: bytes.len(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What kind of entity an address refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Token,
    Wallet,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Token => f.write_str("token"),
            EntityKind::Wallet => f.write_str("wallet"),
        }
    }
}

/// Registry key: an address qualified by its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: EntityId,
}

impl EntityRef {
    pub fn token(id: EntityId) -> Self {
        Self { kind: EntityKind::Token, id }
    }

    pub fn wallet(id: EntityId) -> Self {
        Self { kind: EntityKind::Wallet, id }
    }

    /// Validate a raw address and qualify it, returning None when invalid
    pub fn discover(kind: EntityKind, raw: &str) -> Option<Self> {
        match EntityId::parse_solana(raw) {
            Ok(id) => Some(Self { kind, id }),
            Err(e) => {
                tracing::debug!("Ignoring {} discovery: {}", kind, e);
                None
            }
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WSOL: &str = "So11111111111111111111111111111111111111112";

    #[test]
    fn test_parse_valid_solana_address() {
        let id = EntityId::parse_solana(WSOL).unwrap();
        assert_eq!(id.as_str(), WSOL);
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let id = EntityId::parse_solana(&format!("  {}\n", WSOL)).unwrap();
        assert_eq!(id.as_str(), WSOL);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(EntityId::parse_solana("   "), Err(EntityIdError::Empty));
    }

    #[test]
    fn test_parse_rejects_non_base58() {
        // '0', 'O', 'I' and 'l' are outside the base58 alphabet
        let result = EntityId::parse_solana("0OIl");
        assert!(matches!(result, Err(EntityIdError::NotBase58(_))));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let short = bs58::encode([7u8; 20]).into_string();
        let result = EntityId::parse_solana(&short);
        assert!(matches!(result, Err(EntityIdError::WrongLength { len: 20, .. })));
    }

    #[test]
    fn test_discover_drops_invalid() {
        assert!(EntityRef::discover(EntityKind::Token, "not-an-address").is_none());
        let found = EntityRef::discover(EntityKind::Wallet, WSOL).unwrap();
        assert_eq!(found.kind, EntityKind::Wallet);
    }

    #[test]
    fn test_entity_ref_display() {
        let r = EntityRef::token(EntityId::new("abc"));
        assert_eq!(r.to_string(), "token:abc");
    }
}
