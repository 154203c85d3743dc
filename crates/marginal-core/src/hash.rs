//! Fingerprints of plans and schedules.
//!
//! A fingerprint is the blake3 digest of a value's JSON encoding. Two
//! structurally identical plans built in different runs get the same digest.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl From<blake3::Hash> for Hash256 {
    fn from(h: blake3::Hash) -> Self {
        Hash256(*h.as_bytes())
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    blake3::hash(bytes).into()
}

pub fn hash_serde<T: Serialize>(value: &T) -> Result<Hash256> {
    Ok(hash_bytes(&serde_json::to_vec(value)?))
}
