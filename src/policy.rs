//! Authorization policy for mutating operations.
//!
//! Policy is a pure function of the action, the caller, and the identities
//! that hold rights over the target.  The ledger looks those identities up and
//! then asks [`authorize`]; nothing here touches storage.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::types::Identity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SetAdmin,
    Pause,
    Unpause,
    CreateBatch,
    AppendLog,
    UpdateStatus,
    TransferOwnership,
}

impl Action {
    /// Whether the global pause flag blocks this action.
    ///
    /// Admin actions stay available so a paused ledger can be unpaused.
    pub fn gated_by_pause(self) -> bool {
        !matches!(self, Self::SetAdmin | Self::Pause | Self::Unpause)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SetAdmin => "set admin",
            Self::Pause => "pause",
            Self::Unpause => "unpause",
            Self::CreateBatch => "create batch",
            Self::AppendLog => "append log",
            Self::UpdateStatus => "update status",
            Self::TransferOwnership => "transfer ownership",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }

    /// Turn a denial into [`LedgerError::Unauthorized`].
    pub fn require(self, action: Action, caller: &Identity) -> Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny => Err(LedgerError::Unauthorized {
                action,
                caller: caller.clone(),
            }),
        }
    }
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }
}

// ---------------------------------------------------------------------------
// Transfer agent capability
// ---------------------------------------------------------------------------

/// Recognizes the external collaborator allowed to transfer batch ownership.
///
/// The agent is identified out-of-band, never through the owner map.
pub trait TransferAgent {
    fn is_transfer_agent(&self, caller: &Identity) -> bool;
}

/// A single fixed agent identity.
impl TransferAgent for Identity {
    fn is_transfer_agent(&self, caller: &Identity) -> bool {
        self == caller
    }
}

/// Any of several agent identities.
impl TransferAgent for Vec<Identity> {
    fn is_transfer_agent(&self, caller: &Identity) -> bool {
        self.contains(caller)
    }
}

/// Rejects everyone; ownership is frozen at the creator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransferAgent;

impl TransferAgent for NoTransferAgent {
    fn is_transfer_agent(&self, _caller: &Identity) -> bool {
        false
    }
}

/// Adapts an arbitrary predicate.
pub struct AgentFn<F>(pub F);

impl<F: Fn(&Identity) -> bool> TransferAgent for AgentFn<F> {
    fn is_transfer_agent(&self, caller: &Identity) -> bool {
        (self.0)(caller)
    }
}

impl<F> fmt::Debug for AgentFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AgentFn(..)")
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Rights holders relevant to one authorization decision.
pub struct AuthContext<'a> {
    pub admin: &'a Identity,
    /// Current owner of the target batch, if the action targets one.
    pub owner: Option<&'a Identity>,
    pub transfer_agent: &'a dyn TransferAgent,
}

pub fn authorize(action: Action, caller: &Identity, ctx: &AuthContext<'_>) -> Decision {
    let allowed = match action {
        Action::SetAdmin | Action::Pause | Action::Unpause => caller == ctx.admin,
        Action::CreateBatch => true,
        Action::AppendLog | Action::UpdateStatus => ctx.owner == Some(caller),
        Action::TransferOwnership => ctx.transfer_agent.is_transfer_agent(caller),
    };
    Decision::from(allowed)
}
