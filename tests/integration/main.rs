//! Satchel integration test harness.
//!
//! Every test drives the public `OfflineCache` operations end to end, over
//! a real SQLite file or the in-memory store. Fetches are served from an
//! in-process map; `FlakyStore` injects storage failures on demand.
//!
//!   cargo test --test integration

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use satchel_core::{ContentRecord, ContentType};
use satchel_services::store::{IndexEntry, IndexRange, Row, Table};
use satchel_services::{
    ContentFetcher, DownloadPipeline, DurableStore, MemoryStore, OfflineCache, SqliteStore,
    StoreError, StoreHandle, TransportError,
};

mod download;
mod failures;
mod stats;

// ── Harness ───────────────────────────────────────────────────────────────────

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

/// Fresh directory under the system temp dir, unique per process and call.
pub fn temp_dir(label: &str) -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "satchel-it-{}-{}-{}",
        label,
        std::process::id(),
        n
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Initialized SQLite store in a fresh directory.
pub fn sqlite_store(label: &str) -> (PathBuf, StoreHandle) {
    let path = temp_dir(label).join("cache.db");
    let store = SqliteStore::open(&path).unwrap();
    store.initialize().unwrap();
    (path, Arc::new(store))
}

pub fn memory_store() -> StoreHandle {
    let store = MemoryStore::new();
    store.initialize().unwrap();
    Arc::new(store)
}

/// Serves registered URLs from memory, optionally after a delay.
#[derive(Default)]
pub struct MapFetcher {
    bodies: Mutex<HashMap<String, Bytes>>,
    delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl MapFetcher {
    pub fn serve(&self, url: &str, body: Bytes) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ContentFetcher for MapFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Bytes, TransportError>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let found = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(TransportError::Status(404));
        let delay = *self.delay.lock().unwrap();
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            found
        }
        .boxed()
    }
}

/// Store wrapper that fails selected operations on demand.
pub struct FlakyStore {
    inner: StoreHandle,
    /// Chunk writes still allowed to succeed; `usize::MAX` means unlimited.
    chunk_puts_left: AtomicUsize,
    fail_content_puts: AtomicBool,
    fail_content_reads: AtomicBool,
    fail_chunk_deletes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: StoreHandle) -> Self {
        Self {
            inner,
            chunk_puts_left: AtomicUsize::new(usize::MAX),
            fail_content_puts: AtomicBool::new(false),
            fail_content_reads: AtomicBool::new(false),
            fail_chunk_deletes: AtomicBool::new(false),
        }
    }

    pub fn fail_chunk_puts_after(&self, n: usize) {
        self.chunk_puts_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_content_puts(&self, fail: bool) {
        self.fail_content_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_content_reads(&self, fail: bool) {
        self.fail_content_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_chunk_deletes(&self, fail: bool) {
        self.fail_chunk_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.fail_chunk_puts_after(usize::MAX);
        self.fail_content_puts(false);
        self.fail_content_reads(false);
        self.fail_chunk_deletes(false);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Rejected(format!("injected {what} failure"))
    }
}

impl DurableStore for FlakyStore {
    fn initialize(&self) -> Result<u32, StoreError> {
        self.inner.initialize()
    }

    fn put(
        &self,
        table: Table,
        key: &str,
        value: &[u8],
        indexes: &[IndexEntry],
    ) -> Result<(), StoreError> {
        match table {
            Table::FileChunks => {
                let allowed = self
                    .chunk_puts_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                        if left == usize::MAX {
                            Some(left)
                        } else {
                            left.checked_sub(1)
                        }
                    })
                    .is_ok();
                if !allowed {
                    return Err(Self::injected("chunk write"));
                }
            }
            Table::Content if self.fail_content_puts.load(Ordering::SeqCst) => {
                return Err(Self::injected("catalog write"));
            }
            _ => {}
        }
        self.inner.put(table, key, value, indexes)
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if table == Table::Content && self.fail_content_reads.load(Ordering::SeqCst) {
            return Err(Self::injected("catalog read"));
        }
        self.inner.get(table, key)
    }

    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.inner.delete(table, key)
    }

    fn scan(&self, table: Table) -> Result<Vec<Row>, StoreError> {
        self.inner.scan(table)
    }

    fn scan_index(
        &self,
        table: Table,
        index: &str,
        range: &IndexRange,
    ) -> Result<Vec<Row>, StoreError> {
        self.inner.scan_index(table, index, range)
    }

    fn index_values(&self, table: Table, index: &str) -> Result<Vec<String>, StoreError> {
        self.inner.index_values(table, index)
    }

    fn delete_by_index(&self, table: Table, index: &str, value: &str) -> Result<usize, StoreError> {
        if table == Table::FileChunks && self.fail_chunk_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("chunk delete"));
        }
        self.inner.delete_by_index(table, index, value)
    }

    fn clear(&self, table: Table) -> Result<(), StoreError> {
        self.inner.clear(table)
    }
}

/// Engine over `store` with a fresh `MapFetcher` and default pipeline.
pub fn engine(store: StoreHandle) -> (Arc<MapFetcher>, OfflineCache) {
    let fetcher = Arc::new(MapFetcher::default());
    let pipeline = DownloadPipeline::new(store.clone(), fetcher.clone());
    (fetcher, OfflineCache::new(store, pipeline))
}

/// Remote descriptor served at `mem://{id}`.
pub fn lesson(id: &str, subject: &str, size: &str) -> ContentRecord {
    let mut record = ContentRecord::descriptor(
        id,
        format!("Lesson {id}"),
        ContentType::Video,
        format!("mem://{id}"),
    );
    record.subject = subject.to_string();
    record.grade = "4".to_string();
    record.declared_size = size.to_string();
    record
}

/// Deterministic, non-repeating-per-chunk payload.
pub fn body(len: usize, seed: u8) -> Bytes {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i >> 12) as u8)
        .collect::<Vec<u8>>()
        .into()
}

/// Chunk indices stored under `file_id`, read straight from the store.
pub fn stored_indices(store: &StoreHandle, file_id: &str) -> Vec<String> {
    store
        .scan_index(
            Table::FileChunks,
            satchel_services::chunk_store::FILE_ID_INDEX,
            &IndexRange::Exact(file_id.to_string()),
        )
        .unwrap()
        .into_iter()
        .map(|(key, _)| key)
        .collect()
}

/// Every chunk group key present in the store.
pub fn stored_groups(store: &StoreHandle) -> Vec<String> {
    store
        .index_values(Table::FileChunks, satchel_services::chunk_store::FILE_ID_INDEX)
        .unwrap()
}

#[test]
fn temp_dirs_are_unique() {
    let a = temp_dir("unique");
    let b = temp_dir("unique");
    assert_ne!(a, b);
    assert!(a.is_dir() && b.is_dir());
}
