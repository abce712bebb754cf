use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// SHA-256 digest identifying an object by content
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// zero id (useful as sentinel)
    pub const ZERO: ObjectId = ObjectId([0u8; 32]);

    /// length of the hex form
    pub const HEX_LEN: usize = 64;

    /// create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// parse from hex string
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHashHex(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidHashHex(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// true if `s` has the shape of a full hex id
    pub fn looks_like_hex(s: &str) -> bool {
        s.len() == Self::HEX_LEN && s.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// abbreviated hex for log output
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }

    /// split into path components for object store
    /// returns (first 2 hex chars, remaining 62 hex chars)
    pub fn to_path_components(&self) -> (String, String) {
        let hex = self.to_hex();
        (hex[..2].to_string(), hex[2..].to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// build the canonical byte form of an object: `"<kind> <len>\0" ++ body`
///
/// the kind and length prefix keep a blob and a tree with identical bodies
/// from colliding.
pub fn canonical_bytes(kind: &str, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind, body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    out
}

/// digest of already-canonical bytes
pub fn digest_canonical(canonical: &[u8]) -> ObjectId {
    ObjectId(Sha256::digest(canonical).into())
}

/// compute the id an object of `kind` with `body` will be stored under
pub fn compute_object_id(kind: &str, body: &[u8]) -> ObjectId {
    digest_canonical(&canonical_bytes(kind, body))
}
