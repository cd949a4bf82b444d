//! traceledger: a permissioned, append-only custody ledger for inventory batches.
//!
//! This crate provides:
//! - A batch store and per-batch, hash-chained log of custody events
//! - Owner-gated appends, transfer-agent-gated ownership changes, and a
//!   single admin with a global pause switch
//! - In-memory and SQLite storage backends behind one [`store::StateStore`] trait
//! - Chain audits, JSON audit packs, and JSON backup/restore
//!
//! The CLI wrapper lives in `src/main.rs`.

#![deny(unsafe_code)]

pub mod config;
pub mod error;

pub mod backup;
pub mod clock;
pub mod hash_chain;
pub mod ledger;
pub mod policy;
pub mod report;
pub mod store;
pub mod types;
pub mod util;

pub use error::{LedgerError, Result};
pub use ledger::Ledger;
