//! In-memory backend.
//!
//! Index scans walk the whole map; fine for tests and small ephemeral
//! caches, not for large catalogs.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;

use super::{DurableStore, IndexEntry, IndexRange, Row, StoreError, Table, SCHEMA_VERSION};

struct MemoryRow {
    value: Vec<u8>,
    indexes: Vec<IndexEntry>,
}

impl MemoryRow {
    fn index_value(&self, index: &str) -> Option<&str> {
        self.indexes
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.value.as_str())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<(Table, String), MemoryRow>,
    version: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn keys_where(&self, table: Table, index: &str, value: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.key().0 == table && r.value().index_value(index) == Some(value))
            .map(|r| r.key().1.clone())
            .collect()
    }
}

impl DurableStore for MemoryStore {
    fn initialize(&self) -> Result<u32, StoreError> {
        self.version.store(SCHEMA_VERSION, Ordering::Release);
        Ok(SCHEMA_VERSION)
    }

    fn put(
        &self,
        table: Table,
        key: &str,
        value: &[u8],
        indexes: &[IndexEntry],
    ) -> Result<(), StoreError> {
        self.rows.insert(
            (table, key.to_string()),
            MemoryRow {
                value: value.to_vec(),
                indexes: indexes.to_vec(),
            },
        );
        Ok(())
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .rows
            .get(&(table, key.to_string()))
            .map(|r| r.value.clone()))
    }

    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.rows.remove(&(table, key.to_string()));
        Ok(())
    }

    fn scan(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        let mut rows: Vec<Row> = self
            .rows
            .iter()
            .filter(|r| r.key().0 == table)
            .map(|r| (r.key().1.clone(), r.value().value.clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    fn scan_index(
        &self,
        table: Table,
        index: &str,
        range: &IndexRange,
    ) -> Result<Vec<Row>, StoreError> {
        let mut hits: Vec<(String, String, Vec<u8>)> = self
            .rows
            .iter()
            .filter(|r| r.key().0 == table)
            .filter_map(|r| {
                let v = r.value().index_value(index)?;
                range
                    .contains(v)
                    .then(|| (v.to_string(), r.key().1.clone(), r.value().value.clone()))
            })
            .collect();
        hits.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        Ok(hits.into_iter().map(|(_, k, v)| (k, v)).collect())
    }

    fn index_values(&self, table: Table, index: &str) -> Result<Vec<String>, StoreError> {
        let values: BTreeSet<String> = self
            .rows
            .iter()
            .filter(|r| r.key().0 == table)
            .filter_map(|r| r.value().index_value(index).map(str::to_string))
            .collect();
        Ok(values.into_iter().collect())
    }

    fn delete_by_index(
        &self,
        table: Table,
        index: &str,
        value: &str,
    ) -> Result<usize, StoreError> {
        let keys = self.keys_where(table, index, value);
        let mut removed = 0;
        for key in keys {
            if self.rows.remove(&(table, key)).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn clear(&self, table: Table) -> Result<(), StoreError> {
        self.rows.retain(|(t, _), _| *t != table);
        Ok(())
    }
}
