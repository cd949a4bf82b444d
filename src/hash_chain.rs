//! Per-batch hash chain linkage.
//!
//! Every entry stores the hash that validates its position.  For the first
//! entry of a batch that is the all-zero genesis sentinel; for every later
//! entry it is the stored `prev_hash` of its predecessor, threaded forward
//! unchanged.  Verification is therefore an equality check against the
//! linkage recomputed from the current store contents: it detects missing,
//! reordered, or re-keyed entries but does not bind an entry's payload.
//! Payload binding lives in [`LogEntry::content_digest`](crate::types::LogEntry::content_digest)
//! and is only used by backups.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LedgerError, Result};
use crate::store::StateStore;
use crate::types::{BatchId, LogId};

pub const HASH_LEN: usize = 32;

/// Fixed-width chain hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainHash([u8; HASH_LEN]);

impl ChainHash {
    /// Previous-entry hash of log id 1 in every batch.
    pub const GENESIS: ChainHash = ChainHash([0u8; HASH_LEN]);

    pub const fn new(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; HASH_LEN] = bytes.try_into().map_err(|_| {
            LedgerError::Storage(format!(
                "chain hash must be {HASH_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| LedgerError::Validation(format!("invalid chain hash hex: {e}")))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_genesis(&self) -> bool {
        *self == Self::GENESIS
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", self.to_hex())
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ChainHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChainHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Linkage
// ---------------------------------------------------------------------------

/// Linkage hash for position `log_id` of `batch_id`.
///
/// Returns `Ok(None)` when the predecessor entry is absent, which can only
/// happen if the store has lost or re-keyed an entry.
pub fn linkage_hash<S: StateStore + ?Sized>(
    store: &S,
    batch_id: BatchId,
    log_id: LogId,
) -> Result<Option<ChainHash>> {
    if log_id <= 1 {
        return Ok(Some(ChainHash::GENESIS));
    }
    Ok(store
        .log_entry(batch_id, log_id - 1)?
        .map(|prev| prev.prev_hash))
}

/// Check the stored `prev_hash` of an entry against freshly recomputed linkage.
pub fn verify<S: StateStore + ?Sized>(store: &S, batch_id: BatchId, log_id: LogId) -> Result<bool> {
    let entry = store
        .log_entry(batch_id, log_id)?
        .ok_or(LedgerError::EntryNotFound { batch_id, log_id })?;
    Ok(linkage_hash(store, batch_id, log_id)? == Some(entry.prev_hash))
}
