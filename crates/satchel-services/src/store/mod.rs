//! Host durable store.
//!
//! The cache is written against `DurableStore`: a small keyed store with
//! per-key upsert/get/delete, full-table scans and secondary-index scans.
//! Backends are blocking; async callers go through [`blocking`], which runs
//! the call on tokio's blocking pool and takes the handle for that one call.
//!
//! The handle is constructed once at startup and passed by reference to the
//! catalog, chunk store and pipeline. There is no process-wide instance.

use std::sync::Arc;

use satchel_core::config::{StorageBackend, StorageSettings};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Schema version written by [`DurableStore::initialize`].
pub const SCHEMA_VERSION: u32 = 1;

/// Logical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Content,
    FileChunks,
    Preferences,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::FileChunks => "file_chunks",
            Self::Preferences => "preferences",
        }
    }
}

/// One secondary-index value attached to a row on write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: &'static str,
    pub value: String,
}

impl IndexEntry {
    pub fn new(index: &'static str, value: impl Into<String>) -> Self {
        Self {
            index,
            value: value.into(),
        }
    }
}

/// Selection over index values. Bounds are inclusive and compare as strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRange {
    Exact(String),
    Between(String, String),
}

impl IndexRange {
    pub fn bounds(&self) -> (&str, &str) {
        match self {
            Self::Exact(v) => (v, v),
            Self::Between(from, to) => (from, to),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        let (from, to) = self.bounds();
        value >= from && value <= to
    }
}

/// `(key, value)` as returned by scans.
pub type Row = (String, Vec<u8>);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("store schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("malformed {table} value at {key}: {reason}")]
    Malformed {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error("blocking store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The backend refused the write for a reason of its own.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Capability set the cache needs from the host store.
pub trait DurableStore: Send + Sync {
    /// Create or migrate the schema. Idempotent; returns the schema version.
    fn initialize(&self) -> Result<u32, StoreError>;

    /// Upsert a row and replace its index entries.
    fn put(
        &self,
        table: Table,
        key: &str,
        value: &[u8],
        indexes: &[IndexEntry],
    ) -> Result<(), StoreError>;

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove a row. No-op if absent.
    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError>;

    /// All rows of a table, ordered by key.
    fn scan(&self, table: Table) -> Result<Vec<Row>, StoreError>;

    /// Rows whose `index` value falls in `range`, ordered by index value then key.
    fn scan_index(
        &self,
        table: Table,
        index: &str,
        range: &IndexRange,
    ) -> Result<Vec<Row>, StoreError>;

    /// Distinct values present for an index, ascending.
    fn index_values(&self, table: Table, index: &str) -> Result<Vec<String>, StoreError>;

    /// Remove every row whose `index` equals `value`. Returns rows removed.
    fn delete_by_index(&self, table: Table, index: &str, value: &str)
        -> Result<usize, StoreError>;

    fn clear(&self, table: Table) -> Result<(), StoreError>;
}

pub type StoreHandle = Arc<dyn DurableStore>;

/// Run a blocking store call off the async runtime.
pub async fn blocking<T, F>(store: &StoreHandle, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn DurableStore) -> Result<T, StoreError> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || f(store.as_ref())).await?
}

/// Open and initialize the configured backend.
pub fn open(settings: &StorageSettings) -> Result<StoreHandle, StoreError> {
    let store: StoreHandle = match settings.backend {
        StorageBackend::Sqlite => Arc::new(SqliteStore::open(&settings.db_path)?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };
    let version = store.initialize()?;
    tracing::info!(
        backend = ?settings.backend,
        path = %settings.db_path.display(),
        version,
        "durable store ready"
    );
    Ok(store)
}
