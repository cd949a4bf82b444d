//! JSON backup and restore of a whole ledger.
//!
//! A backup carries every table and scalar plus a SHA-256 content digest per
//! entry.  Restore rejects digest mismatches, replays the state into a
//! scratch [`MemoryStore`], audits every chain there, and only then writes a
//! fresh SQLite database.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LedgerError, OptionExt as _, Result, ResultExt as _};
use crate::ledger::Ledger;
use crate::store::{MemoryStore, SqliteStore, StateStore, StoreMeta, WriteSet};
use crate::types::{BatchRecord, GlobalState, Identity, LogEntry};

pub const BACKUP_FORMAT: &str = "traceledger-backup-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerBackup {
    pub format: String,
    pub exported_at_utc: String,
    pub source: Option<StoreMeta>,
    pub globals: GlobalState,
    pub batches: Vec<BackupBatch>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupBatch {
    pub record: BatchRecord,
    pub owner: Option<Identity>,
    pub entries: Vec<BackupEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub content_sha256: String,
}

impl LedgerBackup {
    /// Snapshot every batch, owner, entry, and scalar of `ledger`.
    pub fn capture<S: StateStore>(ledger: &Ledger<S>, source: Option<&StoreMeta>) -> Result<Self> {
        let globals = ledger.store().globals()?;
        let mut batches = Vec::new();
        for batch_id in 1..=globals.batch_counter {
            let Some(record) = ledger.get_batch(batch_id)? else {
                continue;
            };
            let entries = ledger
                .batch_history(batch_id)?
                .into_iter()
                .map(|entry| BackupEntry {
                    content_sha256: hex::encode(entry.content_digest()),
                    entry,
                })
                .collect();
            batches.push(BackupBatch {
                owner: ledger.get_owner(batch_id)?,
                record,
                entries,
            });
        }
        Ok(Self {
            format: BACKUP_FORMAT.to_string(),
            exported_at_utc: crate::util::now_utc_rfc3339(),
            source: source.cloned(),
            globals,
            batches,
        })
    }

    /// Check format, digests, and counters, and flatten into one write set.
    ///
    /// Batch ids must run exactly `1..=batch_counter`, each batch must carry
    /// `log_count` entries, and `total_events` must equal their sum.
    fn into_write_set(self) -> Result<WriteSet> {
        if self.format != BACKUP_FORMAT {
            return Err(LedgerError::Backup(format!(
                "unsupported backup format '{}' (expected {BACKUP_FORMAT})",
                self.format
            )));
        }
        let batch_counter = self.globals.batch_counter;
        let total_events = self.globals.total_events;
        if u64::try_from(self.batches.len()).ok() != Some(batch_counter) {
            return Err(LedgerError::Backup(format!(
                "batch_counter {batch_counter} does not match {} batches in backup",
                self.batches.len()
            )));
        }

        let mut writes = WriteSet {
            globals: Some(self.globals),
            ..WriteSet::default()
        };
        let mut counted_events = 0u64;
        for (expected_id, b) in (1..=batch_counter).zip(self.batches) {
            if b.record.batch_id != expected_id {
                return Err(LedgerError::Backup(format!(
                    "batch {} out of sequence (expected {expected_id})",
                    b.record.batch_id
                )));
            }
            if usize::try_from(b.record.log_count).ok() != Some(b.entries.len()) {
                return Err(LedgerError::Backup(format!(
                    "batch {} declares {} entries but backup holds {}",
                    b.record.batch_id,
                    b.record.log_count,
                    b.entries.len()
                )));
            }
            counted_events += u64::from(b.record.log_count);
            for e in b.entries {
                let actual = hex::encode(e.entry.content_digest());
                if actual != e.content_sha256 {
                    return Err(LedgerError::Backup(format!(
                        "content digest mismatch at {}/{}",
                        e.entry.batch_id, e.entry.log_id
                    )));
                }
                if e.entry.batch_id != b.record.batch_id {
                    return Err(LedgerError::Backup(format!(
                        "entry {}/{} filed under batch {}",
                        e.entry.batch_id, e.entry.log_id, b.record.batch_id
                    )));
                }
                writes.entries.push(e.entry);
            }
            let owner = b
                .owner
                .required_backup(&format!("batch {} has no owner", b.record.batch_id))?;
            writes.owners.push((b.record.batch_id, owner));
            writes.batches.push(b.record);
        }
        if counted_events != total_events {
            return Err(LedgerError::Backup(format!(
                "total_events {total_events} does not match {counted_events} entries in backup"
            )));
        }
        Ok(writes)
    }
}

/// Export the full ledger to a pretty-printed JSON file.
pub fn export_json<S: StateStore>(
    ledger: &Ledger<S>,
    source: Option<&StoreMeta>,
    out_path: &Path,
) -> Result<LedgerBackup> {
    let backup = LedgerBackup::capture(ledger, source)?;
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .ctx_backup(&format!("create dir {}", parent.display()))?;
        }
    }
    let json = serde_json::to_vec_pretty(&backup).ctx_backup("serialize ledger backup")?;
    std::fs::write(out_path, json).ctx_backup(&format!("write export {}", out_path.display()))?;
    info!(
        path = %out_path.display(),
        batches = backup.batches.len(),
        "ledger exported"
    );
    Ok(backup)
}

/// Restore a JSON backup into a new SQLite database at `db_path`.
pub fn import_json(json_path: &Path, db_path: &Path) -> Result<SqliteStore> {
    if db_path.exists() {
        return Err(LedgerError::Backup(format!(
            "target database {} already exists",
            db_path.display()
        )));
    }
    let bytes = std::fs::read(json_path)
        .ctx_backup(&format!("read import {}", json_path.display()))?;
    let backup: LedgerBackup = serde_json::from_slice(&bytes).ctx_backup("parse ledger backup")?;
    let admin = backup.globals.admin.clone();
    let writes = backup.into_write_set()?;

    // Dry run: every chain must audit clean before anything touches disk.
    let mut scratch = MemoryStore::new(admin.clone());
    scratch.commit(writes.clone())?;
    let reports = Ledger::new(scratch).audit_all()?;
    if let Some(bad) = reports.iter().find(|r| !r.is_intact()) {
        return Err(LedgerError::Backup(format!(
            "batch {} fails chain audit (missing {:?}, broken {:?})",
            bad.batch_id, bad.missing, bad.broken
        )));
    }

    let mut store = SqliteStore::create_new(db_path, admin)?;
    store.commit(writes)?;
    info!(
        ledger_id = %store.meta().ledger_id,
        batches = reports.len(),
        "ledger imported and verified"
    );
    Ok(store)
}
