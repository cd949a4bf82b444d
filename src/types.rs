//! Ledger records, identities, and field bounds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::hash_chain::ChainHash;
use crate::util;

pub type BatchId = u64;
pub type LogId = u32;

/// Logical clock value supplied by the host.
pub type Timestamp = u64;

/// Status assigned to every newly created batch.
pub const STATUS_ACTIVE: &str = "active";
/// Event type of the synthetic entry written by `create_batch`.
pub const CREATION_EVENT: &str = "creation";

/// Default per-batch ceiling on log entries.
pub const DEFAULT_MAX_LOGS_PER_BATCH: u32 = 1000;

/// Maximum lengths, in Unicode scalar values, of the bounded text fields.
pub mod limits {
    pub const PRODUCT_TYPE: usize = 50;
    pub const ORIGIN: usize = 100;
    pub const STATUS: usize = 20;
    pub const EVENT_TYPE: usize = 50;
    pub const LOCATION: usize = 100;
    pub const METADATA: usize = 500;
}

/// Reject `value` with [`LedgerError::InvalidField`] if it is longer than `max`.
pub fn check_len(field: &'static str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(LedgerError::InvalidField { field, max, len });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Opaque caller handle supplied by the execution environment.
///
/// The ledger never interprets an identity beyond equality.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Build an identity from user input, enforcing the handle format.
    pub fn parse(handle: &str) -> Result<Self> {
        util::validate_identity(handle)?;
        Ok(Self(handle.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    pub batch_id: BatchId,
    pub product_type: String,
    pub origin: String,
    pub creator: Identity,
    pub created_at: Timestamp,
    pub status: String,
    pub log_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub batch_id: BatchId,
    pub log_id: LogId,
    pub event_type: String,
    pub timestamp: Timestamp,
    pub location: String,
    /// Who physically performed the event; recorded, never authorization-checked.
    pub actor: Identity,
    pub metadata: String,
    pub prev_hash: ChainHash,
}

impl LogEntry {
    /// SHA-256 over every field of the entry, length-prefixed.
    ///
    /// Not part of chain linkage; backups carry it so a restore can detect
    /// payload edits made to the backup file.
    pub fn content_digest(&self) -> [u8; 32] {
        let mut buf = Vec::with_capacity(
            64 + self.event_type.len()
                + self.location.len()
                + self.actor.as_str().len()
                + self.metadata.len(),
        );
        buf.extend_from_slice(&self.batch_id.to_be_bytes());
        buf.extend_from_slice(&self.log_id.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        for field in [
            self.event_type.as_str(),
            self.location.as_str(),
            self.actor.as_str(),
            self.metadata.as_str(),
        ] {
            buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
            buf.extend_from_slice(field.as_bytes());
        }
        buf.extend_from_slice(self.prev_hash.as_bytes());
        util::sha256(&buf)
    }
}

/// The four ledger-wide scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalState {
    pub admin: Identity,
    pub paused: bool,
    /// Last issued batch id; zero before the first batch.
    pub batch_counter: BatchId,
    pub total_events: u64,
}

impl GlobalState {
    pub fn new(admin: Identity) -> Self {
        Self {
            admin,
            paused: false,
            batch_counter: 0,
            total_events: 0,
        }
    }
}
