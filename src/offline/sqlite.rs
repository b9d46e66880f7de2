//! Durable offline store backed by an embedded SQLite database.
//!
//! Rows are stored as JSON documents: the cache treats records as opaque
//! wholes, so a two-column layout (key + document) keeps the schema stable
//! while record fields evolve. The handle is constructed and closed by the
//! caller; there is no process-global connection.

use crate::error::{Result, SubtrackError};
use crate::offline::store::{
    LocalRecord, NewPendingMutation, OfflineStore, PendingMutation, RecordId,
};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Schema version written to `user_version`. Bump when the layout changes and
/// extend [`SqliteOfflineStore::initialize`] with the upgrade step.
const STORE_VERSION: i32 = 1;

/// SQLite-backed [`OfflineStore`].
pub struct SqliteOfflineStore {
    conn: Mutex<Connection>,
}

impl SqliteOfflineStore {
    /// Open (creating if needed) the store at the given path and run any
    /// outstanding schema upgrades.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an ephemeral store, mostly useful in tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize(conn: &Connection) -> Result<()> {
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(storage_err)?;

        if version < STORE_VERSION {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                     key TEXT PRIMARY KEY,
                     record TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS pending (
                     key INTEGER PRIMARY KEY AUTOINCREMENT,
                     mutation TEXT NOT NULL
                 );",
            )
            .map_err(storage_err)?;
            conn.pragma_update(None, "user_version", STORE_VERSION)
                .map_err(storage_err)?;
        }

        Ok(())
    }

    /// Close the store, flushing the underlying connection.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| SubtrackError::storage("offline store lock poisoned"))?;
        conn.close()
            .map_err(|(_, err)| storage_err(err))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SubtrackError::storage("offline store lock poisoned"))?;
        f(&conn).map_err(storage_err)
    }
}

fn storage_err(err: rusqlite::Error) -> SubtrackError {
    SubtrackError::storage(format!("offline store: {err}"))
}

fn decode_err(err: serde_json::Error) -> SubtrackError {
    SubtrackError::storage(format!("offline store: corrupt row: {err}"))
}

#[async_trait]
impl OfflineStore for SqliteOfflineStore {
    async fn list_records(&self) -> Result<Vec<LocalRecord>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT record FROM records")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(rows)
        })?;

        rows.iter()
            .map(|raw| serde_json::from_str(raw).map_err(decode_err))
            .collect()
    }

    async fn put_record(&self, record: &LocalRecord) -> Result<()> {
        let raw = serde_json::to_string(record).map_err(decode_err)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO records (key, record) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET record = excluded.record",
                params![record.id.storage_key(), raw],
            )?;
            Ok(())
        })
    }

    async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM records WHERE key = ?1",
                params![id.storage_key()],
            )?;
            Ok(())
        })
    }

    async fn clear_records(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM records", [])?;
            Ok(())
        })
    }

    async fn list_pending(&self) -> Result<Vec<PendingMutation>> {
        let rows = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, mutation FROM pending ORDER BY key ASC")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(key, raw)| {
                let new: NewPendingMutation = serde_json::from_str(&raw).map_err(decode_err)?;
                Ok(PendingMutation::from_parts(key as u64, new))
            })
            .collect()
    }

    async fn enqueue_pending(&self, mutation: NewPendingMutation) -> Result<u64> {
        let raw = serde_json::to_string(&mutation).map_err(decode_err)?;
        self.with_conn(|conn| {
            conn.execute("INSERT INTO pending (mutation) VALUES (?1)", params![raw])?;
            Ok(conn.last_insert_rowid() as u64)
        })
    }

    async fn delete_pending(&self, key: u64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM pending WHERE key = ?1", params![key as i64])?;
            Ok(())
        })
    }
}
