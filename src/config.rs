//! TOML configuration file support.
//!
//! Loads from (in order):
//! 1. An explicit `--config` path
//! 2. `traceledger.toml` next to the executable
//! 3. `$HOME/.config/traceledger/config.toml` (`%LOCALAPPDATA%\traceledger\config.toml` on Windows)
//! 4. Built-in defaults
//!
//! Environment variables (`TRACELEDGER_*`) override file values; CLI
//! arguments override both.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LedgerError, Result, ResultExt as _};
use crate::types::{Identity, DEFAULT_MAX_LOGS_PER_BATCH};

// ---------------------------------------------------------------------------
// Config structs (map 1-to-1 with the TOML sections)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfigFile {
    pub paths: PathsConfig,
    pub ledger: LedgerSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub db: PathBuf,
    pub export_dir: PathBuf,
    pub audit_out_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// Admin identity written when a new ledger is initialized.
    pub admin: Option<String>,
    /// Identities trusted to transfer batch ownership.
    pub transfer_agents: Vec<String>,
    pub max_logs_per_batch: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Path to a JSON-lines structured log file.  Empty means no file logging.
    pub json_log_file: String,
    /// Emit JSON to stdout instead of human-readable stderr output.
    pub json_stdout: bool,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("traceledger.db"),
            export_dir: PathBuf::from("traceledger-backups"),
            audit_out_dir: PathBuf::from("traceledger-audit"),
        }
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            admin: None,
            transfer_agents: Vec::new(),
            max_logs_per_batch: DEFAULT_MAX_LOGS_PER_BATCH,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_log_file: String::new(),
            json_stdout: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl LedgerConfigFile {
    /// Try to load from a specific path.  Returns `Ok(default)` if the file
    /// does not exist; returns `Err` if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .ctx_config(&format!("read config file {}", path.display()))?;
        let cfg: LedgerConfigFile = toml::from_str(&text).ctx_config("parse config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }

        if let Ok(exe) = std::env::current_exe() {
            let candidate = exe.with_file_name("traceledger.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        #[cfg(windows)]
        {
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                let candidate = PathBuf::from(local).join("traceledger").join("config.toml");
                if candidate.exists() {
                    return Self::load_from(&candidate);
                }
            }
        }

        #[cfg(not(windows))]
        {
            if let Some(home) = std::env::var_os("HOME") {
                let candidate = PathBuf::from(home)
                    .join(".config")
                    .join("traceledger")
                    .join("config.toml");
                if candidate.exists() {
                    return Self::load_from(&candidate);
                }
            }
        }

        Ok(Self::default())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(db) = std::env::var("TRACELEDGER_DB") {
            self.paths.db = PathBuf::from(db);
        }
        if let Ok(level) = std::env::var("TRACELEDGER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(admin) = std::env::var("TRACELEDGER_ADMIN") {
            self.ledger.admin = Some(admin);
        }
        if let Ok(agent) = std::env::var("TRACELEDGER_TRANSFER_AGENT") {
            self.ledger.transfer_agents = agent
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.max_logs_per_batch == 0 {
            return Err(LedgerError::Config(
                "ledger.max_logs_per_batch must be at least 1".into(),
            ));
        }
        if let Some(ref admin) = self.ledger.admin {
            Identity::parse(admin).ctx_config("ledger.admin")?;
        }
        for agent in &self.ledger.transfer_agents {
            Identity::parse(agent).ctx_config("ledger.transfer_agents")?;
        }
        Ok(())
    }

    pub fn transfer_agents(&self) -> Vec<Identity> {
        self.ledger
            .transfer_agents
            .iter()
            .map(|s| Identity::new(s.as_str()))
            .collect()
    }
}
