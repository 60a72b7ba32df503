//! SQLite backend.
//!
//! Two physical tables hold every logical table:
//!   records(tbl, key, value)            primary rows
//!   record_index(tbl, idx, val, key)    secondary index entries
//!
//! A put replaces the row and its index entries in one transaction.
//! Schema changes are numbered migrations tracked in `PRAGMA user_version`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

use super::{DurableStore, IndexEntry, IndexRange, Row, StoreError, Table, SCHEMA_VERSION};

/// Migration N brings the schema from version N to N + 1.
const MIGRATIONS: &[&str] = &[
    // 0 → 1
    "CREATE TABLE IF NOT EXISTS records (
         tbl   TEXT NOT NULL,
         key   TEXT NOT NULL,
         value BLOB NOT NULL,
         PRIMARY KEY (tbl, key)
     );
     CREATE TABLE IF NOT EXISTS record_index (
         tbl TEXT NOT NULL,
         idx TEXT NOT NULL,
         val TEXT NOT NULL,
         key TEXT NOT NULL,
         PRIMARY KEY (tbl, idx, key)
     );
     CREATE INDEX IF NOT EXISTS record_index_lookup ON record_index (tbl, idx, val);",
];

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file. Call `initialize` before use.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "sqlite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Current `user_version` of the database.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.conn();
        let version = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        Ok(version)
    }

    /// A panic while holding the connection leaves any open transaction
    /// rolled back, so the connection stays usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DurableStore for SqliteStore {
    fn initialize(&self) -> Result<u32, StoreError> {
        let mut conn = self.conn();
        let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if current > SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }
        if current == SCHEMA_VERSION {
            return Ok(current);
        }

        let tx = conn.transaction()?;
        for (step, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
            tracing::info!(from = step, to = step + 1, "migrating store schema");
            tx.execute_batch(sql)?;
        }
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;
        Ok(SCHEMA_VERSION)
    }

    fn put(
        &self,
        table: Table,
        key: &str,
        value: &[u8],
        indexes: &[IndexEntry],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO records (tbl, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (tbl, key) DO UPDATE SET value = excluded.value",
            params![table.name(), key, value],
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE tbl = ?1 AND key = ?2",
            params![table.name(), key],
        )?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO record_index (tbl, idx, val, key) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in indexes {
                insert.execute(params![table.name(), entry.index, entry.value, key])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM records WHERE tbl = ?1 AND key = ?2",
                params![table.name(), key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM records WHERE tbl = ?1 AND key = ?2",
            params![table.name(), key],
        )?;
        tx.execute(
            "DELETE FROM record_index WHERE tbl = ?1 AND key = ?2",
            params![table.name(), key],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn scan(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, value FROM records WHERE tbl = ?1 ORDER BY key")?;
        let rows = stmt
            .query_map(params![table.name()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<Row>, _>>()?;
        Ok(rows)
    }

    fn scan_index(
        &self,
        table: Table,
        index: &str,
        range: &IndexRange,
    ) -> Result<Vec<Row>, StoreError> {
        let (from, to) = range.bounds();
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.key, r.value
               FROM record_index i
               JOIN records r ON r.tbl = i.tbl AND r.key = i.key
              WHERE i.tbl = ?1 AND i.idx = ?2 AND i.val >= ?3 AND i.val <= ?4
              ORDER BY i.val, r.key",
        )?;
        let rows = stmt
            .query_map(params![table.name(), index, from, to], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<Result<Vec<Row>, _>>()?;
        Ok(rows)
    }

    fn index_values(&self, table: Table, index: &str) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT val FROM record_index WHERE tbl = ?1 AND idx = ?2 ORDER BY val",
        )?;
        let values = stmt
            .query_map(params![table.name(), index], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(values)
    }

    fn delete_by_index(
        &self,
        table: Table,
        index: &str,
        value: &str,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let keys = {
            let mut stmt = tx.prepare(
                "SELECT key FROM record_index WHERE tbl = ?1 AND idx = ?2 AND val = ?3",
            )?;
            let keys = stmt
                .query_map(params![table.name(), index, value], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            keys
        };

        let mut removed = 0;
        {
            let mut delete_row =
                tx.prepare_cached("DELETE FROM records WHERE tbl = ?1 AND key = ?2")?;
            let mut delete_entries =
                tx.prepare_cached("DELETE FROM record_index WHERE tbl = ?1 AND key = ?2")?;
            for key in &keys {
                removed += delete_row.execute(params![table.name(), key])?;
                delete_entries.execute(params![table.name(), key])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn clear(&self, table: Table) -> Result<(), StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records WHERE tbl = ?1", params![table.name()])?;
        tx.execute("DELETE FROM record_index WHERE tbl = ?1", params![table.name()])?;
        tx.commit()?;
        Ok(())
    }
}
