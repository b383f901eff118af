//! SQLite-backed local metadata store.
//!
//! Holds connection profiles and the reconciled metadata model (tables,
//! columns, relationships, diagram snapshots). Identity invariants are
//! enforced with UNIQUE constraints and deletions cascade through foreign
//! keys, so deleting a table removes its columns and every relationship
//! touching them.
//!
//! # Layout
//!
//! ```text
//! profiles ──< tables ──< columns ──< relationships (from_column_id, to_column_id)
//!     └──── diagrams (one per profile)
//! ```
//!
//! # Design
//!
//! - Versioned: the store is reset when `STORE_VERSION` changes
//! - One connection behind a mutex, so the store is `Send + Sync`
//! - No cross-call transactions; every method is one atomic write

mod diagrams;
mod metadata;
mod profiles;
mod records;

pub use records::*;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

/// Current store schema version. Bump this when the layout changes.
const STORE_VERSION: i32 = 1;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        engine TEXT NOT NULL,
        host TEXT NOT NULL,
        port INTEGER NOT NULL,
        database TEXT NOT NULL,
        username TEXT NOT NULL,
        secret TEXT NOT NULL,
        ssl TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'disconnected',
        last_sync_at INTEGER,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tables (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        profile_id INTEGER NOT NULL REFERENCES profiles(id) ON DELETE CASCADE,
        schema_name TEXT NOT NULL,
        table_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        row_count INTEGER,
        description TEXT NOT NULL DEFAULT '',
        embedding TEXT,
        UNIQUE (profile_id, schema_name, table_name)
    );

    CREATE TABLE IF NOT EXISTS columns (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_id INTEGER NOT NULL REFERENCES tables(id) ON DELETE CASCADE,
        column_name TEXT NOT NULL,
        ordinal INTEGER NOT NULL,
        data_type TEXT NOT NULL,
        is_nullable INTEGER NOT NULL,
        is_primary_key INTEGER NOT NULL,
        is_foreign_key INTEGER NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        embedding TEXT,
        UNIQUE (table_id, column_name)
    );

    CREATE TABLE IF NOT EXISTS relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        from_column_id INTEGER NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
        to_column_id INTEGER NOT NULL REFERENCES columns(id) ON DELETE CASCADE,
        kind TEXT NOT NULL,
        UNIQUE (from_column_id, to_column_id)
    );

    CREATE TABLE IF NOT EXISTS diagrams (
        profile_id INTEGER PRIMARY KEY REFERENCES profiles(id) ON DELETE CASCADE,
        data TEXT NOT NULL,
        generated_at INTEGER NOT NULL
    );
";

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Local metadata store.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    /// Open or create the store at `path`.
    ///
    /// If the stored version doesn't match, all metadata is dropped and recreated.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Initialize the schema and check version.
    fn init(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == STORE_VERSION => {}
            Some(v) => {
                tracing::warn!(
                    stored = v,
                    current = STORE_VERSION,
                    "metadata store version mismatch, resetting"
                );
                conn.execute_batch(
                    "DROP TABLE IF EXISTS diagrams;
                     DROP TABLE IF EXISTS relationships;
                     DROP TABLE IF EXISTS columns;
                     DROP TABLE IF EXISTS tables;
                     DROP TABLE IF EXISTS profiles;",
                )?;
                conn.execute_batch(SCHEMA)?;
                Self::set_version(&conn)?;
            }
            None => Self::set_version(&conn)?,
        }

        Ok(())
    }

    fn set_version(conn: &Connection) -> StoreResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![STORE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Lock the underlying connection.
    pub(crate) fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn()?;
        let count = |sql: &str| -> StoreResult<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            profiles: count("SELECT COUNT(*) FROM profiles")?,
            tables: count("SELECT COUNT(*) FROM tables")?,
            columns: count("SELECT COUNT(*) FROM columns")?,
            relationships: count("SELECT COUNT(*) FROM relationships")?,
        })
    }
}

/// Record counts across the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub profiles: usize,
    pub tables: usize,
    pub columns: usize,
    pub relationships: usize,
}

/// Current time in unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
