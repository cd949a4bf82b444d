//! Structured error types for the traceledger library.
//!
//! Every public library function returns [`Result<T>`] which carries a
//! [`LedgerError`].  The first seven variants are the ledger's rejection
//! taxonomy: each one is recoverable by the caller and is raised before any
//! state is committed.  The remaining variants are ambient failures of the
//! storage, configuration, and backup layers.  The CLI converts every error
//! into an integer [`StatusCode`].

use thiserror::Error;

use crate::policy::Action;
use crate::types::{BatchId, Identity, LogId};

// ---------------------------------------------------------------------------
// Primary error enum
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized { action: Action, caller: Identity },

    #[error("ledger is paused")]
    Paused,

    #[error("batch {0} not found")]
    BatchNotFound(BatchId),

    #[error("log entry {batch_id}/{log_id} not found")]
    EntryNotFound { batch_id: BatchId, log_id: LogId },

    #[error("batch {0} already exists")]
    BatchExists(BatchId),

    #[error("invalid field `{field}`: {len} units exceeds maximum of {max}")]
    InvalidField {
        field: &'static str,
        max: usize,
        len: usize,
    },

    #[error("batch {batch_id} reached its log limit of {limit} entries")]
    LogLimitReached { batch_id: BatchId, limit: u32 },

    #[error("storage: {0}")]
    Storage(String),

    /// Direct database errors (auto-converted via `?` in the SQLite store).
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("backup: {0}")]
    Backup(String),

    #[error("report: {0}")]
    Report(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    /// True for the rejection taxonomy, false for ambient infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. }
                | Self::Paused
                | Self::BatchNotFound(_)
                | Self::EntryNotFound { .. }
                | Self::BatchExists(_)
                | Self::InvalidField { .. }
                | Self::LogLimitReached { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Stable integer codes for every error, used as CLI exit codes and by
/// collaborators that only see a numeric result.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok = 0,
    Unauthorized = 100,
    Paused = 101,
    BatchNotFound = 102,
    EntryNotFound = 103,
    BatchExists = 104,
    InvalidField = 105,
    LogLimitReached = 106,
    StorageError = 120,
    DatabaseError = 121,
    ConfigError = 122,
    InvalidArgument = 123,
    BackupError = 124,
    ReportError = 125,
    InternalError = 199,
}

impl From<&LedgerError> for StatusCode {
    fn from(e: &LedgerError) -> Self {
        match e {
            LedgerError::Unauthorized { .. } => Self::Unauthorized,
            LedgerError::Paused => Self::Paused,
            LedgerError::BatchNotFound(_) => Self::BatchNotFound,
            LedgerError::EntryNotFound { .. } => Self::EntryNotFound,
            LedgerError::BatchExists(_) => Self::BatchExists,
            LedgerError::InvalidField { .. } => Self::InvalidField,
            LedgerError::LogLimitReached { .. } => Self::LogLimitReached,
            LedgerError::Storage(_) => Self::StorageError,
            LedgerError::Database(_) => Self::DatabaseError,
            LedgerError::Config(_) => Self::ConfigError,
            LedgerError::Validation(_) => Self::InvalidArgument,
            LedgerError::Backup(_) => Self::BackupError,
            LedgerError::Report(_) => Self::ReportError,
        }
    }
}

// ---------------------------------------------------------------------------
// Context extension trait
// ---------------------------------------------------------------------------

/// Extension trait that adds subsystem context to any `Result<T, E>`.
///
/// ```ignore
/// std::fs::read(path).ctx_backup("read backup file")?;
/// ```
pub trait ResultExt<T> {
    fn ctx_storage(self, msg: &str) -> Result<T>;
    fn ctx_config(self, msg: &str) -> Result<T>;
    fn ctx_backup(self, msg: &str) -> Result<T>;
    fn ctx_report(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn ctx_storage(self, msg: &str) -> Result<T> {
        self.map_err(|e| LedgerError::Storage(format!("{msg}: {e}")))
    }
    fn ctx_config(self, msg: &str) -> Result<T> {
        self.map_err(|e| LedgerError::Config(format!("{msg}: {e}")))
    }
    fn ctx_backup(self, msg: &str) -> Result<T> {
        self.map_err(|e| LedgerError::Backup(format!("{msg}: {e}")))
    }
    fn ctx_report(self, msg: &str) -> Result<T> {
        self.map_err(|e| LedgerError::Report(format!("{msg}: {e}")))
    }
}

/// Same as [`ResultExt`] but for `Option<T>` (converts `None` into an error).
pub trait OptionExt<T> {
    fn required_backup(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required_backup(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| LedgerError::Backup(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_distinct_codes() {
        let errs = [
            LedgerError::Paused,
            LedgerError::BatchNotFound(7),
            LedgerError::BatchExists(7),
            LedgerError::LogLimitReached { batch_id: 7, limit: 1000 },
        ];
        let codes: Vec<i32> = errs.iter().map(|e| StatusCode::from(e) as i32).collect();
        assert_eq!(codes, vec![101, 102, 104, 106]);
        assert!(errs.iter().all(LedgerError::is_rejection));
    }

    #[test]
    fn ambient_errors_are_not_rejections() {
        let e = LedgerError::Storage("disk full".into());
        assert!(!e.is_rejection());
        assert_eq!(StatusCode::from(&e), StatusCode::StorageError);
    }

    #[test]
    fn invalid_field_message_names_field() {
        let e = LedgerError::InvalidField { field: "origin", max: 100, len: 101 };
        assert_eq!(
            e.to_string(),
            "invalid field `origin`: 101 units exceeds maximum of 100"
        );
    }

    #[test]
    fn option_ext_converts_none() {
        let none: Option<u8> = None;
        let err = none.required_backup("missing globals").unwrap_err();
        assert!(matches!(err, LedgerError::Backup(ref m) if m == "missing globals"));
    }
}
