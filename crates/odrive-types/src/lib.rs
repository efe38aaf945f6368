//! # odrive-types
//!
//! Shared domain types used across the Object Drive workspace: the stored
//! entities, the grantee model, ACM normalization, user snippets, paging
//! requests, and the wire messages exchanged with fleet management.

pub mod acm;
pub mod caller;
pub mod grantee;
pub mod object;
pub mod paging;
pub mod permission;
pub mod snippet;
pub mod user;
pub mod wire;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Milliseconds since the Unix epoch.
pub type UnixMillis = i64;

/// Identifier length in bytes.
pub const ID_LEN: usize = 16;

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Error types for parsing and validating domain values.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid resource name: {0}")]
    InvalidResource(String),

    #[error("malformed acm: {0}")]
    MalformedAcm(String),

    #[error("invalid snippets: {0}")]
    InvalidSnippets(String),
}

pub type Result<T> = std::result::Result<T, TypeError>;

/// 16-byte opaque row identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub [u8; ID_LEN]);

impl Id {
    /// Build an id from a database blob.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ID_LEN] = bytes
            .try_into()
            .map_err(|_| TypeError::InvalidId(format!("expected {ID_LEN} bytes, got {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Parse the hex form used in APIs and logs.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidId(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.to_hex())
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Id::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_hex_roundtrip() {
        let id = Id([0xab; ID_LEN]);
        let parsed = Id::from_hex(&id.to_hex()).expect("parse");
        assert_eq!(parsed, id);
        assert_eq!(id.to_string().len(), 32);
    }

    #[test]
    fn test_id_rejects_wrong_length() {
        assert!(Id::from_slice(&[1u8; 15]).is_err());
        assert!(Id::from_hex("zz").is_err());
    }

    #[test]
    fn test_id_serde_as_hex_string() {
        let id = Id([1u8; ID_LEN]);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", "01".repeat(16)));
        let back: Id = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}
