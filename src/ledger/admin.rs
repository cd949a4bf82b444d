use tracing::info;

use super::Ledger;
use crate::error::Result;
use crate::policy::Action;
use crate::store::{StateStore, WriteSet};
use crate::types::Identity;

impl<S: StateStore> Ledger<S> {
    /// Hand admin rights to `new_admin`.
    pub fn set_admin(&mut self, caller: &Identity, new_admin: Identity) -> Result<()> {
        let mut globals = self.store.globals()?;
        self.authorize(Action::SetAdmin, caller, &globals, None)?;

        let previous = std::mem::replace(&mut globals.admin, new_admin.clone());
        self.store.commit(WriteSet::with_globals(globals))?;
        info!(%previous, %new_admin, "admin rotated");
        Ok(())
    }

    pub fn pause(&mut self, caller: &Identity) -> Result<()> {
        self.set_paused(Action::Pause, caller, true)
    }

    pub fn unpause(&mut self, caller: &Identity) -> Result<()> {
        self.set_paused(Action::Unpause, caller, false)
    }

    fn set_paused(&mut self, action: Action, caller: &Identity, paused: bool) -> Result<()> {
        let mut globals = self.store.globals()?;
        self.authorize(action, caller, &globals, None)?;

        globals.paused = paused;
        self.store.commit(WriteSet::with_globals(globals))?;
        info!(paused, by = %caller, "pause flag set");
        Ok(())
    }
}
