//! Durable SQLite store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension as _, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{LedgerError, Result, ResultExt as _};
use crate::hash_chain::ChainHash;
use crate::store::{StateStore, WriteSet};
use crate::types::{BatchId, BatchRecord, GlobalState, Identity, LogEntry, LogId};

pub const STORE_SCHEMA_VERSION: i64 = 1;

/// Per-connection settings; applied on every open, not only at creation.
const CONNECTION_PRAGMAS: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=FULL;
    PRAGMA foreign_keys=ON;
"#;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS meta(
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS batches(
      batch_id INTEGER PRIMARY KEY,
      product_type TEXT NOT NULL,
      origin TEXT NOT NULL,
      creator TEXT NOT NULL,
      created_at INTEGER NOT NULL,
      status TEXT NOT NULL,
      log_count INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS log_entries(
      batch_id INTEGER NOT NULL REFERENCES batches(batch_id),
      log_id INTEGER NOT NULL,
      event_type TEXT NOT NULL,
      ts INTEGER NOT NULL,
      location TEXT NOT NULL,
      actor TEXT NOT NULL,
      metadata TEXT NOT NULL,
      prev_hash BLOB NOT NULL,
      PRIMARY KEY(batch_id, log_id)
    );

    CREATE TABLE IF NOT EXISTS owners(
      batch_id INTEGER PRIMARY KEY REFERENCES batches(batch_id),
      owner TEXT NOT NULL
    );
"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub ledger_id: Uuid,
    pub created_at_utc: String,
    pub schema_version: i64,
}

pub struct SqliteStore {
    conn: Connection,
    meta: StoreMeta,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Create a fresh ledger database whose admin is `admin`.
    ///
    /// Refuses an existing file: initializing over a ledger would reset its
    /// counters and admin underneath the stored rows.
    pub fn create_new(db_path: &Path, admin: Identity) -> Result<Self> {
        if db_path.exists() {
            return Err(LedgerError::Storage(format!(
                "ledger database {} already exists -- will not overwrite",
                db_path.display()
            )));
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .ctx_storage(&format!("create db parent dir {}", parent.display()))?;
            }
        }
        let conn = Connection::open(db_path)
            .ctx_storage(&format!("open db {}", db_path.display()))?;
        let store = Self::initialize(conn, admin)?;
        info!(ledger_id = %store.meta.ledger_id, path = %db_path.display(), "ledger database created");
        Ok(store)
    }

    /// Create a fresh ledger that lives only for the lifetime of the connection.
    pub fn open_in_memory(admin: Identity) -> Result<Self> {
        let conn = Connection::open_in_memory().ctx_storage("open in-memory db")?;
        Self::initialize(conn, admin)
    }

    pub fn open_existing(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(LedgerError::Storage(format!(
                "ledger database {} does not exist",
                db_path.display()
            )));
        }
        let conn = Connection::open(db_path)
            .ctx_storage(&format!("open db {}", db_path.display()))?;
        conn.execute_batch(CONNECTION_PRAGMAS)
            .ctx_storage("apply connection pragmas")?;

        let ledger_id = read_meta(&conn, "ledger_id")?;
        let created_at_utc = read_meta(&conn, "created_at_utc")?;
        let schema_version: i64 = read_meta(&conn, "schema_version")?
            .parse()
            .ctx_storage("parse schema_version")?;

        if schema_version != STORE_SCHEMA_VERSION {
            return Err(LedgerError::Storage(format!(
                "unsupported schema_version {schema_version} (expected {STORE_SCHEMA_VERSION})"
            )));
        }

        let meta = StoreMeta {
            ledger_id: Uuid::parse_str(&ledger_id).ctx_storage("parse ledger_id uuid")?,
            created_at_utc,
            schema_version,
        };
        Ok(Self { conn, meta })
    }

    pub fn meta(&self) -> &StoreMeta {
        &self.meta
    }

    fn initialize(conn: Connection, admin: Identity) -> Result<Self> {
        conn.execute_batch(CONNECTION_PRAGMAS)
            .ctx_storage("apply connection pragmas")?;
        conn.execute_batch(SCHEMA).ctx_storage("create tables")?;

        let meta = StoreMeta {
            ledger_id: Uuid::new_v4(),
            created_at_utc: crate::util::now_utc_rfc3339(),
            schema_version: STORE_SCHEMA_VERSION,
        };
        write_meta(&conn, "ledger_id", &meta.ledger_id.to_string())?;
        write_meta(&conn, "created_at_utc", &meta.created_at_utc)?;
        write_meta(&conn, "schema_version", &meta.schema_version.to_string())?;
        write_globals(&conn, &GlobalState::new(admin))?;

        Ok(Self { conn, meta })
    }
}

impl StateStore for SqliteStore {
    fn globals(&self) -> Result<GlobalState> {
        Ok(GlobalState {
            admin: Identity::new(read_meta(&self.conn, "admin")?),
            paused: read_meta(&self.conn, "paused")? == "1",
            batch_counter: read_meta(&self.conn, "batch_counter")?
                .parse()
                .ctx_storage("parse batch_counter")?,
            total_events: read_meta(&self.conn, "total_events")?
                .parse()
                .ctx_storage("parse total_events")?,
        })
    }

    fn batch(&self, batch_id: BatchId) -> Result<Option<BatchRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT batch_id, product_type, origin, creator, created_at, status, log_count
                FROM batches WHERE batch_id = ?1
                "#,
                params![to_sql_int(batch_id)?],
                batch_from_row,
            )
            .optional()
            .map_err(LedgerError::from)
    }

    fn log_entry(&self, batch_id: BatchId, log_id: LogId) -> Result<Option<LogEntry>> {
        self.conn
            .query_row(
                r#"
                SELECT batch_id, log_id, event_type, ts, location, actor, metadata, prev_hash
                FROM log_entries WHERE batch_id = ?1 AND log_id = ?2
                "#,
                params![to_sql_int(batch_id)?, log_id],
                entry_from_row,
            )
            .optional()
            .map_err(LedgerError::from)
    }

    fn owner(&self, batch_id: BatchId) -> Result<Option<Identity>> {
        let owner: Option<String> = self
            .conn
            .query_row(
                "SELECT owner FROM owners WHERE batch_id = ?1",
                params![to_sql_int(batch_id)?],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner.map(Identity::new))
    }

    fn commit(&mut self, writes: WriteSet) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .ctx_storage("begin tx")?;

        for b in &writes.batches {
            tx.execute(
                r#"
                INSERT INTO batches(
                  batch_id, product_type, origin, creator, created_at, status, log_count
                ) VALUES (?1,?2,?3,?4,?5,?6,?7)
                ON CONFLICT(batch_id) DO UPDATE SET
                  product_type = excluded.product_type,
                  origin = excluded.origin,
                  creator = excluded.creator,
                  created_at = excluded.created_at,
                  status = excluded.status,
                  log_count = excluded.log_count
                "#,
                params![
                    to_sql_int(b.batch_id)?,
                    b.product_type,
                    b.origin,
                    b.creator.as_str(),
                    to_sql_int(b.created_at)?,
                    b.status,
                    b.log_count,
                ],
            )
            .ctx_storage("upsert batch")?;
        }

        for e in &writes.entries {
            // Plain INSERT: an existing (batch_id, log_id) aborts the transaction.
            tx.execute(
                r#"
                INSERT INTO log_entries(
                  batch_id, log_id, event_type, ts, location, actor, metadata, prev_hash
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)
                "#,
                params![
                    to_sql_int(e.batch_id)?,
                    e.log_id,
                    e.event_type,
                    to_sql_int(e.timestamp)?,
                    e.location,
                    e.actor.as_str(),
                    e.metadata,
                    e.prev_hash.as_bytes().to_vec(),
                ],
            )
            .ctx_storage("insert log entry")?;
        }

        for (batch_id, owner) in &writes.owners {
            tx.execute(
                "INSERT OR REPLACE INTO owners(batch_id, owner) VALUES (?1,?2)",
                params![to_sql_int(*batch_id)?, owner.as_str()],
            )
            .ctx_storage("upsert owner")?;
        }

        if let Some(ref g) = writes.globals {
            write_globals(&tx, g)?;
        }

        tx.commit().ctx_storage("commit tx")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn to_sql_int(v: u64) -> Result<i64> {
    i64::try_from(v).ctx_storage("integer exceeds SQLite range")
}

fn get_u64(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let v: i64 = row.get(idx)?;
    u64::try_from(v).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<BatchRecord> {
    Ok(BatchRecord {
        batch_id: get_u64(row, 0)?,
        product_type: row.get(1)?,
        origin: row.get(2)?,
        creator: Identity::new(row.get::<_, String>(3)?),
        created_at: get_u64(row, 4)?,
        status: row.get(5)?,
        log_count: row.get(6)?,
    })
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let prev_hash: Vec<u8> = row.get(7)?;
    let prev_hash = ChainHash::from_slice(&prev_hash).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Blob, Box::new(e))
    })?;
    Ok(LogEntry {
        batch_id: get_u64(row, 0)?,
        log_id: row.get(1)?,
        event_type: row.get(2)?,
        timestamp: get_u64(row, 3)?,
        location: row.get(4)?,
        actor: Identity::new(row.get::<_, String>(5)?),
        metadata: row.get(6)?,
        prev_hash,
    })
}

fn read_meta(conn: &Connection, key: &str) -> Result<String> {
    conn.query_row("SELECT v FROM meta WHERE k = ?1", params![key], |row| row.get(0))
        .ctx_storage(&format!("read {key}"))
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta(k,v) VALUES (?1,?2)",
        params![key, value],
    )?;
    Ok(())
}

fn write_globals(conn: &Connection, g: &GlobalState) -> Result<()> {
    write_meta(conn, "admin", g.admin.as_str())?;
    write_meta(conn, "paused", if g.paused { "1" } else { "0" })?;
    write_meta(conn, "batch_counter", &g.batch_counter.to_string())?;
    write_meta(conn, "total_events", &g.total_events.to_string())?;
    Ok(())
}
