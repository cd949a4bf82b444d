use tracing::info;

use super::Ledger;
use crate::error::Result;
use crate::policy::Action;
use crate::store::{StateStore, WriteSet};
use crate::types::{BatchId, Identity};

impl<S: StateStore> Ledger<S> {
    /// Replace the owner of `batch_id`.
    ///
    /// Only the configured transfer agent may call this.  The current owner is
    /// not consulted.
    pub fn transfer_ownership(
        &mut self,
        caller: &Identity,
        batch_id: BatchId,
        new_owner: Identity,
    ) -> Result<()> {
        let globals = self.store.globals()?;
        self.ensure_not_paused(Action::TransferOwnership, &globals)?;
        self.authorize(Action::TransferOwnership, caller, &globals, None)?;
        self.require_batch(batch_id)?;

        let previous = self.store.owner(batch_id)?;
        self.store.commit(WriteSet {
            owners: vec![(batch_id, new_owner.clone())],
            ..WriteSet::default()
        })?;

        info!(
            batch_id,
            previous = previous.as_ref().map(Identity::as_str).unwrap_or("<none>"),
            %new_owner,
            "ownership transferred"
        );
        Ok(())
    }
}
