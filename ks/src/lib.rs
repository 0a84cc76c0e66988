//! KvStore - hash-style persistent rows on SQLite
//!
//! Every row is addressed by `(table, key, field)` and holds a single string
//! value, which is the shape daemons use for flat counter tables:
//!
//! ```text
//! COUNTERS_EVENTS
//! ├── published     { value: "1042" }
//! └── missed_cache  { value: "7" }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use kvstore::Store;
//!
//! let store = Store::open("/var/lib/eventd/counters.db")?;
//! store.hset("COUNTERS_EVENTS", "published", "value", "1042")?;
//! assert_eq!(store.hget("COUNTERS_EVENTS", "published", "value")?.as_deref(), Some("1042"));
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use tracing::debug;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rows (
    tbl   TEXT NOT NULL,
    key   TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (tbl, key, field)
);
";

/// SQLite-backed hash store
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open or create a store at the given file path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(?path, "Store::open: called");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(%mode, "Store::open: journal mode set");
        Self::init(conn, Some(path))
    }

    /// Open a throwaway store that lives only as long as the handle
    pub fn open_in_memory() -> Result<Self> {
        debug!("Store::open_in_memory: called");
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path })
    }

    /// File backing this store, `None` when in memory
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Set one field of a row, creating the row if needed
    pub fn hset(&self, table: &str, key: &str, field: &str, value: &str) -> Result<()> {
        debug!(table, key, field, value, "Store::hset: called");
        self.conn.execute(
            "INSERT INTO rows (tbl, key, field, value) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (tbl, key, field) DO UPDATE SET value = excluded.value",
            params![table, key, field, value],
        )?;
        Ok(())
    }

    /// Get one field of a row
    pub fn hget(&self, table: &str, key: &str, field: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM rows WHERE tbl = ?1 AND key = ?2 AND field = ?3",
                params![table, key, field],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Get every field of a row
    pub fn hgetall(&self, table: &str, key: &str) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT field, value FROM rows WHERE tbl = ?1 AND key = ?2")?;
        let fields = stmt
            .query_map(params![table, key], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;
        Ok(fields)
    }

    /// List the distinct row keys of a table, sorted
    pub fn keys(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT key FROM rows WHERE tbl = ?1 ORDER BY key")?;
        let keys = stmt
            .query_map(params![table], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Delete a whole row, returning how many fields were removed
    pub fn del(&self, table: &str, key: &str) -> Result<usize> {
        debug!(table, key, "Store::del: called");
        let removed = self
            .conn
            .execute("DELETE FROM rows WHERE tbl = ?1 AND key = ?2", params![table, key])?;
        Ok(removed)
    }
}
