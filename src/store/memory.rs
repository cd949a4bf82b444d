use std::collections::{BTreeMap, BTreeSet};

use crate::error::{LedgerError, Result};
use crate::store::{StateStore, WriteSet};
use crate::types::{BatchId, BatchRecord, GlobalState, Identity, LogEntry, LogId};

/// In-process store backed by ordered maps.
///
/// Each instance is an independent ledger; tests and embedded hosts create as
/// many as they need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStore {
    globals: GlobalState,
    batches: BTreeMap<BatchId, BatchRecord>,
    entries: BTreeMap<(BatchId, LogId), LogEntry>,
    owners: BTreeMap<BatchId, Identity>,
}

impl MemoryStore {
    pub fn new(admin: Identity) -> Self {
        Self {
            globals: GlobalState::new(admin),
            batches: BTreeMap::new(),
            entries: BTreeMap::new(),
            owners: BTreeMap::new(),
        }
    }

    /// Number of log entries stored under `batch_id`.
    pub fn entry_count(&self, batch_id: BatchId) -> usize {
        self.entries
            .range((batch_id, LogId::MIN)..=(batch_id, LogId::MAX))
            .count()
    }
}

impl StateStore for MemoryStore {
    fn globals(&self) -> Result<GlobalState> {
        Ok(self.globals.clone())
    }

    fn batch(&self, batch_id: BatchId) -> Result<Option<BatchRecord>> {
        Ok(self.batches.get(&batch_id).cloned())
    }

    fn log_entry(&self, batch_id: BatchId, log_id: LogId) -> Result<Option<LogEntry>> {
        Ok(self.entries.get(&(batch_id, log_id)).cloned())
    }

    fn owner(&self, batch_id: BatchId) -> Result<Option<Identity>> {
        Ok(self.owners.get(&batch_id).cloned())
    }

    fn commit(&mut self, writes: WriteSet) -> Result<()> {
        // Validate every insert before touching any map.
        let mut staged = BTreeSet::new();
        for e in &writes.entries {
            let key = (e.batch_id, e.log_id);
            if self.entries.contains_key(&key) || !staged.insert(key) {
                return Err(LedgerError::Storage(format!(
                    "log entry {}/{} already written",
                    e.batch_id, e.log_id
                )));
            }
        }

        for b in writes.batches {
            self.batches.insert(b.batch_id, b);
        }
        for e in writes.entries {
            self.entries.insert((e.batch_id, e.log_id), e);
        }
        for (batch_id, owner) in writes.owners {
            self.owners.insert(batch_id, owner);
        }
        if let Some(g) = writes.globals {
            self.globals = g;
        }
        Ok(())
    }
}
