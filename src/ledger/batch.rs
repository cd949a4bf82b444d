use tracing::info;

use super::log_store::EventFields;
use super::Ledger;
use crate::error::{LedgerError, Result};
use crate::policy::Action;
use crate::store::{StateStore, WriteSet};
use crate::types::{
    check_len, limits, BatchId, BatchRecord, Identity, CREATION_EVENT, STATUS_ACTIVE,
};

impl<S: StateStore> Ledger<S> {
    /// Register a new batch owned by `caller` and write its "creation" entry.
    ///
    /// The batch record, its owner, the creation entry, and both counters are
    /// committed together; if the creation entry cannot be staged nothing is
    /// written and the batch counter does not advance.
    pub fn create_batch(
        &mut self,
        caller: &Identity,
        product_type: &str,
        origin: &str,
        initial_metadata: &str,
    ) -> Result<BatchId> {
        let mut globals = self.store.globals()?;
        self.ensure_not_paused(Action::CreateBatch, &globals)?;
        self.authorize(Action::CreateBatch, caller, &globals, None)?;

        check_len("product_type", product_type, limits::PRODUCT_TYPE)?;
        check_len("origin", origin, limits::ORIGIN)?;
        check_len("metadata", initial_metadata, limits::METADATA)?;

        let batch_id = globals.batch_counter + 1;
        if self.store.batch(batch_id)?.is_some() {
            return Err(LedgerError::BatchExists(batch_id));
        }

        let now = self.clock.now();
        let mut batch = BatchRecord {
            batch_id,
            product_type: product_type.to_string(),
            origin: origin.to_string(),
            creator: caller.clone(),
            created_at: now,
            status: STATUS_ACTIVE.to_string(),
            log_count: 0,
        };
        let creation = self.stage_entry(
            &batch,
            EventFields {
                event_type: CREATION_EVENT,
                location: origin,
                actor: caller,
                metadata: initial_metadata,
            },
            now,
        )?;

        batch.log_count = creation.log_id;
        globals.batch_counter = batch_id;
        globals.total_events += 1;
        self.store.commit(WriteSet {
            globals: Some(globals),
            batches: vec![batch],
            entries: vec![creation],
            owners: vec![(batch_id, caller.clone())],
        })?;

        info!(batch_id, creator = %caller, product_type, "batch created");
        Ok(batch_id)
    }

    /// Overwrite the status label of a batch.  Owner only.
    pub fn update_status(
        &mut self,
        caller: &Identity,
        batch_id: BatchId,
        new_status: &str,
    ) -> Result<()> {
        let globals = self.store.globals()?;
        self.ensure_not_paused(Action::UpdateStatus, &globals)?;
        let mut batch = self.require_batch(batch_id)?;
        let owner = self.store.owner(batch_id)?;
        self.authorize(Action::UpdateStatus, caller, &globals, owner.as_ref())?;
        check_len("status", new_status, limits::STATUS)?;

        let previous = std::mem::replace(&mut batch.status, new_status.to_string());
        self.store.commit(WriteSet {
            batches: vec![batch],
            ..WriteSet::default()
        })?;

        info!(batch_id, %previous, status = new_status, "batch status updated");
        Ok(())
    }
}
