//! Chain audit reports and the JSON audit pack.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ResultExt as _};
use crate::store::StoreMeta;
use crate::types::{BatchId, BatchRecord, LogId};

// ---------------------------------------------------------------------------
// Chain report
// ---------------------------------------------------------------------------

/// Result of walking one batch's chain from log id 1 to its log count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub batch_id: BatchId,
    /// False when the batch counter covers this id but no record exists.
    pub batch_present: bool,
    pub status: Option<String>,
    pub log_count: u32,
    pub entries_checked: u32,
    /// Ids in `1..=log_count` with no stored entry.
    pub missing: Vec<LogId>,
    /// Ids whose stored `prev_hash` fails verification.
    pub broken: Vec<LogId>,
    /// An entry exists past `log_count`.
    pub uncounted_tail: bool,
}

impl ChainReport {
    pub fn new(batch: &BatchRecord) -> Self {
        Self {
            batch_id: batch.batch_id,
            batch_present: true,
            status: Some(batch.status.clone()),
            log_count: batch.log_count,
            entries_checked: 0,
            missing: Vec::new(),
            broken: Vec::new(),
            uncounted_tail: false,
        }
    }

    pub fn missing_batch(batch_id: BatchId) -> Self {
        Self {
            batch_id,
            batch_present: false,
            status: None,
            log_count: 0,
            entries_checked: 0,
            missing: Vec::new(),
            broken: Vec::new(),
            uncounted_tail: false,
        }
    }

    pub fn is_intact(&self) -> bool {
        self.batch_present && self.missing.is_empty() && self.broken.is_empty() && !self.uncounted_tail
    }
}

// ---------------------------------------------------------------------------
// Audit pack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditManifest {
    pub format: String,
    pub generated_at_utc: String,
    pub ledger: Option<StoreMeta>,
    pub batch_count: usize,
    pub intact_batches: usize,
    pub failed_batches: Vec<BatchId>,
    pub total_entries_checked: u64,
}

impl AuditManifest {
    pub fn summarize(ledger: Option<&StoreMeta>, reports: &[ChainReport]) -> Self {
        Self {
            format: "traceledger audit-pack v1".to_string(),
            generated_at_utc: crate::util::now_utc_rfc3339(),
            ledger: ledger.cloned(),
            batch_count: reports.len(),
            intact_batches: reports.iter().filter(|r| r.is_intact()).count(),
            failed_batches: reports
                .iter()
                .filter(|r| !r.is_intact())
                .map(|r| r.batch_id)
                .collect(),
            total_entries_checked: reports.iter().map(|r| u64::from(r.entries_checked)).sum(),
        }
    }
}

/// Write `manifest.json` and `chain_reports.json` into `out_dir`.
pub fn write_audit_pack(
    out_dir: &Path,
    ledger: Option<&StoreMeta>,
    reports: &[ChainReport],
) -> Result<AuditManifest> {
    std::fs::create_dir_all(out_dir)
        .ctx_report(&format!("create out dir {}", out_dir.display()))?;

    let manifest = AuditManifest::summarize(ledger, reports);

    let manifest_path = out_dir.join("manifest.json");
    let manifest_json = serde_json::to_vec_pretty(&manifest).ctx_report("serialize manifest")?;
    std::fs::write(&manifest_path, manifest_json)
        .ctx_report(&format!("write {}", manifest_path.display()))?;

    let reports_path = out_dir.join("chain_reports.json");
    let reports_json = serde_json::to_vec_pretty(reports).ctx_report("serialize chain reports")?;
    std::fs::write(&reports_path, reports_json)
        .ctx_report(&format!("write {}", reports_path.display()))?;

    Ok(manifest)
}
