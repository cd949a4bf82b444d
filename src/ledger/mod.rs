//! The batch custody ledger.
//!
//! [`Ledger`] wraps an injected [`StateStore`] together with the host's
//! logical clock and the transfer-agent capability.  Every mutating operation
//! takes `&mut self`, validates completely, and then hands one [`WriteSet`]
//! to the store, so a call either commits in full or leaves state untouched.
//!
//! [`WriteSet`]: crate::store::WriteSet

mod admin;
mod batch;
mod log_store;
mod ownership;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::{LedgerError, Result};
use crate::hash_chain;
use crate::policy::{self, Action, AuthContext, NoTransferAgent, TransferAgent};
use crate::report::ChainReport;
use crate::store::StateStore;
use crate::types::{
    BatchId, BatchRecord, GlobalState, Identity, LogEntry, LogId, DEFAULT_MAX_LOGS_PER_BATCH,
};

pub struct Ledger<S> {
    store: S,
    clock: Box<dyn Clock>,
    transfer_agent: Box<dyn TransferAgent>,
    max_logs_per_batch: u32,
}

impl<S: std::fmt::Debug> std::fmt::Debug for Ledger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("store", &self.store)
            .field("max_logs_per_batch", &self.max_logs_per_batch)
            .finish_non_exhaustive()
    }
}

impl<S: StateStore> Ledger<S> {
    /// Wrap `store` with the system clock, no transfer agent, and the default
    /// per-batch log ceiling.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock::default()),
            transfer_agent: Box::new(NoTransferAgent),
            max_logs_per_batch: DEFAULT_MAX_LOGS_PER_BATCH,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_transfer_agent(mut self, agent: impl TransferAgent + 'static) -> Self {
        self.transfer_agent = Box::new(agent);
        self
    }

    pub fn with_max_logs_per_batch(mut self, limit: u32) -> Self {
        self.max_logs_per_batch = limit;
        self
    }

    pub fn max_logs_per_batch(&self) -> u32 {
        self.max_logs_per_batch
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Read operations
    // -----------------------------------------------------------------------

    pub fn get_batch(&self, batch_id: BatchId) -> Result<Option<BatchRecord>> {
        self.store.batch(batch_id)
    }

    pub fn get_log(&self, batch_id: BatchId, log_id: LogId) -> Result<Option<LogEntry>> {
        self.store.log_entry(batch_id, log_id)
    }

    pub fn get_log_count(&self, batch_id: BatchId) -> Result<u32> {
        Ok(self.require_batch(batch_id)?.log_count)
    }

    pub fn get_owner(&self, batch_id: BatchId) -> Result<Option<Identity>> {
        self.store.owner(batch_id)
    }

    pub fn get_total_batches(&self) -> Result<u64> {
        Ok(self.store.globals()?.batch_counter)
    }

    pub fn get_total_events(&self) -> Result<u64> {
        Ok(self.store.globals()?.total_events)
    }

    pub fn is_paused(&self) -> Result<bool> {
        Ok(self.store.globals()?.paused)
    }

    pub fn get_admin(&self) -> Result<Identity> {
        Ok(self.store.globals()?.admin)
    }

    /// True iff the entry's stored previous-entry hash matches its linkage.
    pub fn verify(&self, batch_id: BatchId, log_id: LogId) -> Result<bool> {
        hash_chain::verify(&self.store, batch_id, log_id)
    }

    /// Every entry of a batch in log-id order.
    pub fn batch_history(&self, batch_id: BatchId) -> Result<Vec<LogEntry>> {
        let batch = self.require_batch(batch_id)?;
        let mut out = Vec::with_capacity(batch.log_count as usize);
        for log_id in 1..=batch.log_count {
            if let Some(entry) = self.store.log_entry(batch_id, log_id)? {
                out.push(entry);
            }
        }
        Ok(out)
    }

    /// Walk a batch's chain and report missing or failing entries.
    pub fn audit_batch(&self, batch_id: BatchId) -> Result<ChainReport> {
        let batch = self.require_batch(batch_id)?;
        let mut report = ChainReport::new(&batch);
        for log_id in 1..=batch.log_count {
            if self.store.log_entry(batch_id, log_id)?.is_none() {
                report.missing.push(log_id);
                continue;
            }
            report.entries_checked += 1;
            if !self.verify(batch_id, log_id)? {
                report.broken.push(log_id);
            }
        }
        if self
            .store
            .log_entry(batch_id, batch.log_count.saturating_add(1))?
            .is_some()
        {
            report.uncounted_tail = true;
        }
        if !report.is_intact() {
            tracing::warn!(
                batch_id,
                missing = report.missing.len(),
                broken = report.broken.len(),
                uncounted_tail = report.uncounted_tail,
                "chain audit failed"
            );
        }
        Ok(report)
    }

    /// Audit every batch issued so far.
    pub fn audit_all(&self) -> Result<Vec<ChainReport>> {
        let total = self.get_total_batches()?;
        let mut reports = Vec::new();
        for batch_id in 1..=total {
            match self.audit_batch(batch_id) {
                Ok(r) => reports.push(r),
                Err(LedgerError::BatchNotFound(_)) => {
                    reports.push(ChainReport::missing_batch(batch_id))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(reports)
    }

    // -----------------------------------------------------------------------
    // Shared guards
    // -----------------------------------------------------------------------

    fn require_batch(&self, batch_id: BatchId) -> Result<BatchRecord> {
        self.store
            .batch(batch_id)?
            .ok_or(LedgerError::BatchNotFound(batch_id))
    }

    fn ensure_not_paused(&self, action: Action, globals: &GlobalState) -> Result<()> {
        if action.gated_by_pause() && globals.paused {
            debug!(%action, "rejected: ledger paused");
            return Err(LedgerError::Paused);
        }
        Ok(())
    }

    fn authorize(
        &self,
        action: Action,
        caller: &Identity,
        globals: &GlobalState,
        owner: Option<&Identity>,
    ) -> Result<()> {
        let ctx = AuthContext {
            admin: &globals.admin,
            owner,
            transfer_agent: self.transfer_agent.as_ref(),
        };
        let decision = policy::authorize(action, caller, &ctx);
        if !decision.is_allowed() {
            debug!(%action, %caller, "rejected: unauthorized");
        }
        decision.require(action, caller)
    }
}

#[cfg(test)]
mod tests;
