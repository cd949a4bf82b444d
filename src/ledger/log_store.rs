//! Append path for log entries.  The only code that assigns log ids and
//! writes `prev_hash`.

use tracing::info;

use super::Ledger;
use crate::error::{LedgerError, Result};
use crate::hash_chain;
use crate::policy::Action;
use crate::store::{StateStore, WriteSet};
use crate::types::{check_len, limits, BatchId, BatchRecord, Identity, LogEntry, LogId, Timestamp};

/// Caller-supplied fields of a new entry.
pub(super) struct EventFields<'a> {
    pub event_type: &'a str,
    pub location: &'a str,
    pub actor: &'a Identity,
    pub metadata: &'a str,
}

impl<S: StateStore> Ledger<S> {
    /// Append an event to `batch_id`.  Only the batch's current owner may call
    /// this; `actor` is recorded as given.
    pub fn append_log(
        &mut self,
        caller: &Identity,
        batch_id: BatchId,
        event_type: &str,
        location: &str,
        actor: &Identity,
        metadata: &str,
    ) -> Result<LogId> {
        let mut globals = self.store.globals()?;
        self.ensure_not_paused(Action::AppendLog, &globals)?;
        let mut batch = self.require_batch(batch_id)?;
        let owner = self.store.owner(batch_id)?;
        self.authorize(Action::AppendLog, caller, &globals, owner.as_ref())?;

        let entry = self.stage_entry(
            &batch,
            EventFields {
                event_type,
                location,
                actor,
                metadata,
            },
            self.clock.now(),
        )?;
        let log_id = entry.log_id;

        batch.log_count = log_id;
        globals.total_events += 1;
        self.store.commit(WriteSet {
            globals: Some(globals),
            batches: vec![batch],
            entries: vec![entry],
            owners: Vec::new(),
        })?;

        info!(batch_id, log_id, event_type, "log appended");
        Ok(log_id)
    }

    /// Build the next entry for `batch` without committing anything.
    ///
    /// `batch` is the record as it will be seen just before the append; for a
    /// batch under construction that is the unsaved record with `log_count`
    /// zero, which links to genesis without a store lookup.
    pub(super) fn stage_entry(
        &self,
        batch: &BatchRecord,
        fields: EventFields<'_>,
        timestamp: Timestamp,
    ) -> Result<LogEntry> {
        check_len("event_type", fields.event_type, limits::EVENT_TYPE)?;
        check_len("location", fields.location, limits::LOCATION)?;
        check_len("metadata", fields.metadata, limits::METADATA)?;

        if batch.log_count >= self.max_logs_per_batch {
            return Err(LedgerError::LogLimitReached {
                batch_id: batch.batch_id,
                limit: self.max_logs_per_batch,
            });
        }

        let log_id = batch.log_count + 1;
        let prev_hash = hash_chain::linkage_hash(&self.store, batch.batch_id, log_id)?
            .ok_or_else(|| {
                LedgerError::Storage(format!(
                    "log entry {}/{} missing; cannot link entry {log_id}",
                    batch.batch_id,
                    log_id - 1
                ))
            })?;

        Ok(LogEntry {
            batch_id: batch.batch_id,
            log_id,
            event_type: fields.event_type.to_string(),
            timestamp,
            location: fields.location.to_string(),
            actor: fields.actor.clone(),
            metadata: fields.metadata.to_string(),
            prev_hash,
        })
    }
}
