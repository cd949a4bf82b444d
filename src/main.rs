use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn};

use traceledger_core::{
    backup,
    config::{LedgerConfigFile, LoggingConfig},
    error::StatusCode,
    report,
    store::SqliteStore,
    types::{BatchId, Identity, LogId},
    util, Ledger, LedgerError,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "traceledger",
    version = util::VERSION,
    about = "Permissioned, append-only custody ledger for inventory batches"
)]
struct Cli {
    /// Path to the ledger database (SQLite).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Identity the command is executed as.
    #[arg(long, global = true, env = "TRACELEDGER_CALLER")]
    caller: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty ledger database.
    Init {
        /// Initial admin identity (defaults to `ledger.admin` from config).
        #[arg(long)]
        admin: Option<String>,
    },

    /// Register a new batch owned by the caller.
    CreateBatch {
        #[arg(long)]
        product_type: String,
        #[arg(long)]
        origin: String,
        #[arg(long, default_value = "")]
        metadata: String,
    },

    /// Append a custody event to a batch the caller owns.
    AppendLog {
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        event_type: String,
        #[arg(long)]
        location: String,
        /// Who performed the event (defaults to the caller).
        #[arg(long)]
        actor: Option<String>,
        #[arg(long, default_value = "")]
        metadata: String,
    },

    /// Bulk-append events to one batch from a CSV file.
    ImportEvents {
        #[arg(long)]
        batch: BatchId,
        /// CSV with headers `event_type,location[,actor][,metadata]` (exact
        /// names, at most 10 000 rows).  The file is validated before any row
        /// is appended; a rejected append keeps the rows before it.
        #[arg(long)]
        csv: PathBuf,
    },

    /// Overwrite the status label of a batch the caller owns.
    UpdateStatus {
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        status: String,
    },

    /// Reassign a batch (transfer agent only).
    TransferOwnership {
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        new_owner: String,
    },

    /// Replace the admin identity (admin only).
    SetAdmin {
        #[arg(long)]
        new_admin: String,
    },

    /// Block all batch mutations (admin only).
    Pause,

    /// Lift the pause (admin only).
    Unpause,

    /// Print a batch record as JSON.
    ShowBatch {
        #[arg(long)]
        batch: BatchId,
        /// Also print every log entry.
        #[arg(long)]
        history: bool,
    },

    /// Print one log entry as JSON.
    ShowLog {
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        log: LogId,
    },

    /// Print the current owner of a batch.
    Owner {
        #[arg(long)]
        batch: BatchId,
    },

    /// Print ledger-wide counters and settings.
    Stats,

    /// Verify the chain linkage of one log entry.
    Verify {
        #[arg(long)]
        batch: BatchId,
        #[arg(long)]
        log: LogId,
    },

    /// Audit every batch chain and write an audit pack.
    Audit {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Export the ledger to a JSON backup file.
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import a ledger from a JSON backup into a new database.
    Import {
        #[arg(long)]
        json: PathBuf,
        /// Path for the new database (must not already exist).
        #[arg(long)]
        target_db: PathBuf,
    },

    /// Print version information.
    Version,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    event_type: String,
    location: String,
    #[serde(default)]
    actor: Option<String>,
    #[serde(default)]
    metadata: String,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut cfg = LedgerConfigFile::load(cli.config.as_deref()).context("load config")?;
    cfg.apply_env();
    cfg.validate().context("validate config")?;

    init_logging(&cfg.logging)?;

    let db_path = cli.db.clone().unwrap_or_else(|| cfg.paths.db.clone());
    util::validate_path(&db_path, "db")?;

    match cli.cmd {
        Commands::Init { admin } => {
            let admin = admin
                .or_else(|| cfg.ledger.admin.clone())
                .context("no admin identity: pass --admin or set ledger.admin")?;
            let admin = Identity::parse(&admin)?;
            let store = SqliteStore::create_new(&db_path, admin.clone()).context("create ledger")?;
            info!(ledger_id = %store.meta().ledger_id, %admin, "ledger initialized");
        }

        Commands::CreateBatch {
            product_type,
            origin,
            metadata,
        } => {
            let caller = require_caller(cli.caller.as_deref())?;
            let mut ledger = open_ledger(&db_path, &cfg)?;
            let id = ledger
                .create_batch(&caller, &product_type, &origin, &metadata)
                .context("create batch")?;
            println!("{id}");
        }

        Commands::AppendLog {
            batch,
            event_type,
            location,
            actor,
            metadata,
        } => {
            let caller = require_caller(cli.caller.as_deref())?;
            let actor = match actor {
                Some(a) => Identity::parse(&a)?,
                None => caller.clone(),
            };
            let mut ledger = open_ledger(&db_path, &cfg)?;
            let log_id = ledger
                .append_log(&caller, batch, &event_type, &location, &actor, &metadata)
                .context("append log")?;
            println!("{log_id}");
        }

        Commands::ImportEvents { batch, csv } => {
            let caller = require_caller(cli.caller.as_deref())?;
            let csv = util::canonicalize_if_exists(&csv, "csv")?;
            let mut ledger = open_ledger(&db_path, &cfg)?;
            let appended = import_events(&mut ledger, &caller, batch, &csv)?;
            info!(batch_id = batch, appended, "csv import complete");
            println!("{appended}");
        }

        Commands::UpdateStatus { batch, status } => {
            let caller = require_caller(cli.caller.as_deref())?;
            let mut ledger = open_ledger(&db_path, &cfg)?;
            ledger
                .update_status(&caller, batch, &status)
                .context("update status")?;
        }

        Commands::TransferOwnership { batch, new_owner } => {
            let caller = require_caller(cli.caller.as_deref())?;
            let new_owner = Identity::parse(&new_owner)?;
            let mut ledger = open_ledger(&db_path, &cfg)?;
            ledger
                .transfer_ownership(&caller, batch, new_owner)
                .context("transfer ownership")?;
        }

        Commands::SetAdmin { new_admin } => {
            let caller = require_caller(cli.caller.as_deref())?;
            let new_admin = Identity::parse(&new_admin)?;
            let mut ledger = open_ledger(&db_path, &cfg)?;
            ledger.set_admin(&caller, new_admin).context("set admin")?;
        }

        Commands::Pause => {
            let caller = require_caller(cli.caller.as_deref())?;
            open_ledger(&db_path, &cfg)?.pause(&caller).context("pause")?;
        }

        Commands::Unpause => {
            let caller = require_caller(cli.caller.as_deref())?;
            open_ledger(&db_path, &cfg)?.unpause(&caller).context("unpause")?;
        }

        Commands::ShowBatch { batch, history } => {
            let ledger = open_ledger(&db_path, &cfg)?;
            let record = ledger.get_batch(batch)?.ok_or(LedgerError::BatchNotFound(batch))?;
            print_json(&record)?;
            if history {
                print_json(&ledger.batch_history(batch)?)?;
            }
        }

        Commands::ShowLog { batch, log } => {
            let ledger = open_ledger(&db_path, &cfg)?;
            let entry = ledger.get_log(batch, log)?.ok_or(LedgerError::EntryNotFound {
                batch_id: batch,
                log_id: log,
            })?;
            print_json(&entry)?;
        }

        Commands::Owner { batch } => {
            let ledger = open_ledger(&db_path, &cfg)?;
            match ledger.get_owner(batch)? {
                Some(owner) => println!("{owner}"),
                None => return Err(LedgerError::BatchNotFound(batch).into()),
            }
        }

        Commands::Stats => {
            let ledger = open_ledger(&db_path, &cfg)?;
            let stats = serde_json::json!({
                "ledger_id": ledger.store().meta().ledger_id,
                "admin": ledger.get_admin()?,
                "paused": ledger.is_paused()?,
                "total_batches": ledger.get_total_batches()?,
                "total_events": ledger.get_total_events()?,
                "max_logs_per_batch": ledger.max_logs_per_batch(),
            });
            print_json(&stats)?;
        }

        Commands::Verify { batch, log } => {
            let ledger = open_ledger(&db_path, &cfg)?;
            let ok = ledger.verify(batch, log).context("verify entry")?;
            println!("{ok}");
            if !ok {
                warn!(batch_id = batch, log_id = log, "chain linkage mismatch");
            }
        }

        Commands::Audit { out_dir } => {
            let out = out_dir.unwrap_or_else(|| cfg.paths.audit_out_dir.clone());
            util::validate_path(&out, "audit out dir")?;
            let ledger = open_ledger(&db_path, &cfg)?;
            let meta = ledger.store().meta().clone();
            info!(ledger_id = %meta.ledger_id, "auditing");

            let reports = ledger.audit_all().context("audit chains")?;
            let manifest = report::write_audit_pack(&out, Some(&meta), &reports)
                .context("write audit pack")?;
            info!(
                out_dir = %out.display(),
                batches = manifest.batch_count,
                intact = manifest.intact_batches,
                "audit pack generated"
            );
            anyhow::ensure!(
                manifest.failed_batches.is_empty(),
                "chain audit failed for batches {:?}",
                manifest.failed_batches
            );
        }

        Commands::Export { out } => {
            let out = out.unwrap_or_else(|| {
                cfg.paths
                    .export_dir
                    .join(format!("traceledger-{}.json", util::now_utc_rfc3339().replace(':', "")))
            });
            util::validate_path(&out, "export")?;
            let ledger = open_ledger(&db_path, &cfg)?;
            let meta = ledger.store().meta().clone();
            backup::export_json(&ledger, Some(&meta), &out).context("export ledger")?;
            println!("{}", out.display());
        }

        Commands::Import { json, target_db } => {
            util::validate_path(&json, "json")?;
            util::validate_path(&target_db, "target db")?;
            let json = util::canonicalize_if_exists(&json, "json")?;
            let imported = backup::import_json(&json, &target_db).context("import ledger")?;
            info!(
                ledger_id = %imported.meta().ledger_id,
                "ledger imported to {}",
                target_db.display()
            );
        }

        Commands::Version => {
            println!("{}", util::version_string());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_ledger(db_path: &Path, cfg: &LedgerConfigFile) -> Result<Ledger<SqliteStore>> {
    let store = SqliteStore::open_existing(db_path).context("open ledger")?;
    Ok(Ledger::new(store)
        .with_transfer_agent(cfg.transfer_agents())
        .with_max_logs_per_batch(cfg.ledger.max_logs_per_batch))
}

fn require_caller(caller: Option<&str>) -> Result<Identity> {
    let caller = caller.context("this command needs --caller (or TRACELEDGER_CALLER)")?;
    Ok(Identity::parse(caller)?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("serialize output")?);
    Ok(())
}

/// Read and bound a CSV of events before anything is appended.
///
/// Headers must match the field names exactly; actors default to `caller`.
fn read_event_rows(csv: &Path, caller: &Identity) -> Result<Vec<(CsvRow, Identity)>> {
    let mut rdr =
        csv::Reader::from_path(csv).with_context(|| format!("open csv: {}", csv.display()))?;
    let headers = rdr.headers().context("read csv headers")?.clone();
    for required in ["event_type", "location"] {
        if !headers.iter().any(|h| h == required) {
            anyhow::bail!("csv missing required header '{required}'");
        }
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CsvRow>().enumerate() {
        let row_no = idx + 1;
        if row_no > util::MAX_CSV_ROWS {
            anyhow::bail!("csv exceeds maximum row limit of {}", util::MAX_CSV_ROWS);
        }
        let row = rec.with_context(|| format!("parse csv row {row_no}"))?;
        let actor = match row.actor.as_deref().filter(|a| !a.is_empty()) {
            Some(a) => Identity::parse(a).with_context(|| format!("csv row {row_no}"))?,
            None => caller.clone(),
        };
        rows.push((row, actor));
    }
    Ok(rows)
}

/// Append every CSV row to `batch_id`.  The whole file is parsed and bounded
/// first; rows are then committed one at a time, and the first rejected row
/// stops the import with earlier rows committed.
fn import_events(
    ledger: &mut Ledger<SqliteStore>,
    caller: &Identity,
    batch_id: BatchId,
    csv: &Path,
) -> Result<usize> {
    let rows = read_event_rows(csv, caller)?;
    for (idx, (row, actor)) in rows.iter().enumerate() {
        ledger
            .append_log(
                caller,
                batch_id,
                &row.event_type,
                &row.location,
                actor,
                &row.metadata,
            )
            .with_context(|| format!("append csv row {}", idx + 1))?;
    }
    Ok(rows.len())
}

/// Map the first ledger error in the chain to its status code.
fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .chain()
        .find_map(|e| e.downcast_ref::<LedgerError>())
        .map_or(StatusCode::InternalError, StatusCode::from);
    u8::try_from(code as i32).unwrap_or(1)
}

fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    let registry = tracing_subscriber::registry().with(filter);

    if cfg.json_stdout {
        let json_layer = tracing_subscriber::fmt::layer().json();
        registry.with(json_layer).init();
    } else if !cfg.json_log_file.is_empty() {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.json_log_file)
            .with_context(|| format!("open json log file {}", cfg.json_log_file))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::sync::Mutex::new(log_file));
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(file_layer).with(console_layer).init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(console_layer).init();
    }
    Ok(())
}
