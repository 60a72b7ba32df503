//! Metadata catalog. One JSON row per content item, keyed by id.
//!
//! Rows carry secondary index entries for content type, subject, grade and
//! (once downloaded) the download timestamp, so filtered listings do not
//! need a full scan.

use satchel_core::{ContentRecord, ContentType};

use crate::error::CacheError;
use crate::store::{blocking, DurableStore, IndexEntry, IndexRange, StoreError, StoreHandle, Table};

pub const CONTENT_TYPE_INDEX: &str = "contentType";
pub const SUBJECT_INDEX: &str = "subject";
pub const GRADE_INDEX: &str = "grade";
pub const DOWNLOADED_AT_INDEX: &str = "downloadedAt";

/// Indexed lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogIndex {
    ContentType(ContentType),
    Subject(String),
    Grade(String),
    DownloadedAt(u64),
}

impl CatalogIndex {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ContentType(_) => CONTENT_TYPE_INDEX,
            Self::Subject(_) => SUBJECT_INDEX,
            Self::Grade(_) => GRADE_INDEX,
            Self::DownloadedAt(_) => DOWNLOADED_AT_INDEX,
        }
    }

    fn value(&self) -> String {
        match self {
            Self::ContentType(t) => t.as_str().to_string(),
            Self::Subject(s) | Self::Grade(s) => s.clone(),
            Self::DownloadedAt(ms) => timestamp_key(*ms),
        }
    }
}

/// Zero-padded so string order matches numeric order.
fn timestamp_key(ms: u64) -> String {
    format!("{ms:020}")
}

fn index_entries(record: &ContentRecord) -> Vec<IndexEntry> {
    let mut entries = vec![
        IndexEntry::new(CONTENT_TYPE_INDEX, record.content_type.as_str()),
        IndexEntry::new(SUBJECT_INDEX, record.subject.clone()),
        IndexEntry::new(GRADE_INDEX, record.grade.clone()),
    ];
    if let Some(at) = record.downloaded_at() {
        entries.push(IndexEntry::new(DOWNLOADED_AT_INDEX, timestamp_key(at)));
    }
    entries
}

fn decode_rows(rows: Vec<(String, Vec<u8>)>) -> Result<Vec<ContentRecord>, StoreError> {
    rows.into_iter()
        .map(|(_, raw)| serde_json::from_slice(&raw).map_err(StoreError::from))
        .collect()
}

/// Σ local bytes over the whole catalog, straight off a store reference.
pub(crate) fn sum_local_bytes(store: &dyn DurableStore) -> Result<u64, StoreError> {
    let records = decode_rows(store.scan(Table::Content)?)?;
    Ok(records.iter().map(ContentRecord::local_size_bytes).sum())
}

/// Subject / grade / type filter as applied by catalog browsers.
/// `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentFilter {
    pub subject: Option<String>,
    pub grade: Option<String>,
    pub content_type: Option<ContentType>,
}

impl ContentFilter {
    pub fn matches(&self, record: &ContentRecord) -> bool {
        self.subject.as_ref().map_or(true, |s| &record.subject == s)
            && self.grade.as_ref().map_or(true, |g| &record.grade == g)
            && self.content_type.map_or(true, |t| record.content_type == t)
    }

    /// Index used to narrow the scan before matching the rest in memory.
    fn primary_index(&self) -> Option<CatalogIndex> {
        if let Some(subject) = &self.subject {
            return Some(CatalogIndex::Subject(subject.clone()));
        }
        if let Some(grade) = &self.grade {
            return Some(CatalogIndex::Grade(grade.clone()));
        }
        self.content_type.map(CatalogIndex::ContentType)
    }
}

#[derive(Clone)]
pub struct Catalog {
    store: StoreHandle,
}

impl Catalog {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    /// Look up a record, failing with `NotFound` if absent.
    pub async fn get(&self, id: &str) -> Result<ContentRecord, CacheError> {
        self.find(id).await?.ok_or_else(|| CacheError::not_found(id))
    }

    pub async fn find(&self, id: &str) -> Result<Option<ContentRecord>, StoreError> {
        let key = id.to_string();
        let raw = blocking(&self.store, move |s| s.get(Table::Content, &key)).await?;
        raw.map(|raw| serde_json::from_slice(&raw).map_err(StoreError::from))
            .transpose()
    }

    /// Upsert by id.
    pub async fn put(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let key = record.id.clone();
        let value = serde_json::to_vec(record)?;
        let indexes = index_entries(record);
        blocking(&self.store, move |s| s.put(Table::Content, &key, &value, &indexes)).await?;
        tracing::debug!(id = %record.id, downloaded = record.is_downloaded(), "catalog record committed");
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<ContentRecord>, StoreError> {
        let rows = blocking(&self.store, |s| s.scan(Table::Content)).await?;
        decode_rows(rows)
    }

    pub async fn query_by_index(&self, index: CatalogIndex) -> Result<Vec<ContentRecord>, StoreError> {
        let name = index.name();
        let range = IndexRange::Exact(index.value());
        let rows = blocking(&self.store, move |s| s.scan_index(Table::Content, name, &range)).await?;
        decode_rows(rows)
    }

    /// Records downloaded within `[from, to]` unix ms, oldest first.
    pub async fn downloaded_between(&self, from: u64, to: u64) -> Result<Vec<ContentRecord>, StoreError> {
        let range = IndexRange::Between(timestamp_key(from), timestamp_key(to));
        let rows = blocking(&self.store, move |s| {
            s.scan_index(Table::Content, DOWNLOADED_AT_INDEX, &range)
        })
        .await?;
        decode_rows(rows)
    }

    pub async fn filter(&self, filter: &ContentFilter) -> Result<Vec<ContentRecord>, StoreError> {
        let candidates = match filter.primary_index() {
            Some(index) => self.query_by_index(index).await?,
            None => self.list_all().await?,
        };
        Ok(candidates.into_iter().filter(|r| filter.matches(r)).collect())
    }

    /// Remove a record. No-op if absent.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let key = id.to_string();
        blocking(&self.store, move |s| s.delete(Table::Content, &key)).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        blocking(&self.store, |s| s.clear(Table::Content)).await
    }
}
