//! Hashing, time, and input validation helpers.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{LedgerError, Result};

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Identity handles: start with an alphanumeric, then up to 127 more
/// alphanumeric / hyphen / dot / underscore / colon characters.  Covers
/// principal strings like `SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7.transfer`.
static IDENTITY_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_.:]{0,127}$").unwrap()
});

/// Validate an identity handle supplied from outside the process.
pub fn validate_identity(handle: &str) -> Result<()> {
    if handle.is_empty() {
        return Err(LedgerError::Validation("identity must not be empty".into()));
    }
    if !IDENTITY_RE.is_match(handle) {
        return Err(LedgerError::Validation(format!(
            "invalid identity '{handle}': 1-128 chars, alphanumeric/hyphen/dot/underscore/colon"
        )));
    }
    Ok(())
}

/// Validate that a path is not empty and does not contain null bytes.
pub fn validate_path(p: &Path, label: &str) -> Result<()> {
    let s = p.to_string_lossy();
    if s.is_empty() {
        return Err(LedgerError::Validation(format!("{label} path is empty")));
    }
    if s.contains('\0') {
        return Err(LedgerError::Validation(format!(
            "{label} path contains null byte"
        )));
    }
    Ok(())
}

/// Canonicalize a path if it exists, otherwise return it unchanged.
pub fn canonicalize_if_exists(p: &Path, label: &str) -> Result<PathBuf> {
    validate_path(p, label)?;
    if p.exists() {
        std::fs::canonicalize(p)
            .map_err(|e| LedgerError::Validation(format!("{label} path invalid: {e}")))
    } else {
        Ok(p.to_path_buf())
    }
}

/// Maximum number of rows accepted by CSV event imports.
pub const MAX_CSV_ROWS: usize = 10_000;

// ---------------------------------------------------------------------------
// Version constants (set by build.rs)
// ---------------------------------------------------------------------------

pub const GIT_HASH: &str = env!("TRACELEDGER_GIT_HASH");
pub const BUILD_TS: &str = env!("TRACELEDGER_BUILD_TS");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One-line version string for display.
pub fn version_string() -> String {
    format!("traceledger v{VERSION} (git {GIT_HASH}, built {BUILD_TS})")
}
