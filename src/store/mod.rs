//! Storage backends for ledger state.
//!
//! A store holds three keyed tables (batches, log entries, owners) and the
//! four global scalars.  The ledger reads through the accessor methods and
//! writes exclusively through [`StateStore::commit`], which applies a whole
//! [`WriteSet`] or nothing.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreMeta, STORE_SCHEMA_VERSION};

use crate::error::Result;
use crate::types::{BatchId, BatchRecord, GlobalState, Identity, LogEntry, LogId};

/// Backing storage for one ledger instance.
pub trait StateStore {
    fn globals(&self) -> Result<GlobalState>;
    fn batch(&self, batch_id: BatchId) -> Result<Option<BatchRecord>>;
    fn log_entry(&self, batch_id: BatchId, log_id: LogId) -> Result<Option<LogEntry>>;
    fn owner(&self, batch_id: BatchId) -> Result<Option<Identity>>;

    /// Atomically apply every write in `writes`.
    ///
    /// Log entries are insert-only: a write whose key already exists fails the
    /// whole commit.
    fn commit(&mut self, writes: WriteSet) -> Result<()>;
}

/// Staged writes produced by one ledger operation.
#[derive(Debug, Clone, Default)]
pub struct WriteSet {
    pub globals: Option<GlobalState>,
    /// Batch records to insert or overwrite.
    pub batches: Vec<BatchRecord>,
    /// Log entries to insert.
    pub entries: Vec<LogEntry>,
    pub owners: Vec<(BatchId, Identity)>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.globals.is_none()
            && self.batches.is_empty()
            && self.entries.is_empty()
            && self.owners.is_empty()
    }

    pub(crate) fn with_globals(globals: GlobalState) -> Self {
        Self {
            globals: Some(globals),
            ..Self::default()
        }
    }
}
