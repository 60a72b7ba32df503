//! Download pipeline: admission → fetch → encode → chunk writes → commit.
//!
//! Every attempt writes into a fresh staging group. The catalog record is
//! only committed once every chunk of that group is stored, and a failed
//! attempt deletes whatever it staged, so a record never points at a
//! partial group. A successful re-download drops the previous group after
//! the new record is committed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashSet;
use satchel_core::{parse_size, ContentRecord, LocalCopy};

use crate::catalog::Catalog;
use crate::chunk_store::ChunkStore;
use crate::compress::{CodecError, StrategyRegistry};
use crate::error::{CacheError, Result};
use crate::fetch::ContentFetcher;
use crate::now_ms;
use crate::quota::{Admission, AdmissionController, Unreported};
use crate::store::StoreHandle;

pub const DEFAULT_PARALLELISM: usize = 4;

pub struct DownloadPipeline {
    catalog: Catalog,
    chunks: ChunkStore,
    fetcher: Arc<dyn ContentFetcher>,
    admission: AdmissionController,
    strategies: StrategyRegistry,
    parallelism: usize,
    staging: Arc<DashSet<String>>,
    attempt: AtomicU64,
}

/// Marks a file id as being written until dropped.
struct Staged {
    staging: Arc<DashSet<String>>,
    file_id: String,
}

impl Drop for Staged {
    fn drop(&mut self) {
        self.staging.remove(&self.file_id);
    }
}

impl DownloadPipeline {
    /// Pipeline with fail-open admission, identity compression and the
    /// default write parallelism.
    pub fn new(store: StoreHandle, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            chunks: ChunkStore::new(store),
            fetcher,
            admission: AdmissionController::new(Arc::new(Unreported)),
            strategies: StrategyRegistry::identity(),
            parallelism: DEFAULT_PARALLELISM,
            staging: Arc::new(DashSet::new()),
            attempt: AtomicU64::new(0),
        }
    }

    pub fn with_admission(mut self, admission: AdmissionController) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_strategies(mut self, strategies: StrategyRegistry) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Whether `file_id` belongs to an attempt that has not finished yet.
    pub fn is_staging(&self, file_id: &str) -> bool {
        self.staging.contains(file_id)
    }

    /// Download `descriptor` and commit it. Returns the committed record.
    pub async fn run(&self, descriptor: &ContentRecord) -> Result<ContentRecord> {
        let id = descriptor.id.as_str();
        let title = descriptor.title.as_str();
        let declared = parse_size(&descriptor.declared_size);

        if let Admission::Denied { available } = self.admission.admit(declared).await {
            return Err(CacheError::QuotaExceeded {
                id: id.to_string(),
                title: title.to_string(),
                required: declared,
                available,
            });
        }

        let previous = self
            .catalog
            .find(id)
            .await
            .map_err(|e| CacheError::lookup(id, title, e))?
            .and_then(|r| r.local);

        let fetched = self
            .fetcher
            .fetch(&descriptor.source_url)
            .await
            .map_err(|source| CacheError::FetchFailed {
                id: id.to_string(),
                title: title.to_string(),
                source,
            })?;
        let fetched_len = fetched.len() as u64;
        tracing::debug!(id, bytes = fetched_len, "content fetched");

        let strategy = self.strategies.for_type(descriptor.content_type);
        let codec = strategy.name();
        let (stored, content_hash) = tokio::task::spawn_blocking(move || {
            let stored = strategy.encode(fetched)?;
            let hash = hex::encode(blake3::hash(&stored).as_bytes());
            Ok::<(Bytes, String), CodecError>((stored, hash))
        })
        .await
        .map_err(|e| CodecError::Io {
            strategy: codec,
            source: std::io::Error::other(e),
        })
        .and_then(|encoded| encoded)
        .map_err(|source| CacheError::CompressionFailed {
            id: id.to_string(),
            title: title.to_string(),
            source,
        })?;

        let file_id = format!(
            "file_{id}_{}_{}",
            now_ms(),
            self.attempt.fetch_add(1, Ordering::Relaxed)
        );
        self.staging.insert(file_id.clone());
        let _staged = Staged {
            staging: self.staging.clone(),
            file_id: file_id.clone(),
        };

        let chunks = match self
            .chunks
            .write_group(&file_id, &stored, self.parallelism)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                self.discard(&file_id).await;
                return Err(CacheError::storage_write(id, title, e));
            }
        };

        let mut record = descriptor.as_descriptor();
        record.local = Some(LocalCopy {
            file_id: file_id.clone(),
            downloaded_at: now_ms(),
            local_size_bytes: stored.len() as u64,
            // An unparseable declared size falls back to what was received.
            original_size_bytes: if declared > 0 { declared } else { fetched_len },
            fetched_size_bytes: fetched_len,
            codec: codec.to_string(),
            content_hash,
        });

        if let Err(e) = self.catalog.put(&record).await {
            self.discard(&file_id).await;
            return Err(CacheError::storage_write(id, title, e));
        }

        if let Some(old) = previous.filter(|old| old.file_id != file_id) {
            if let Err(e) = self.chunks.delete_group(&old.file_id).await {
                tracing::warn!(id, file_id = %old.file_id, error = %e, "could not drop replaced chunk group");
            }
        }

        tracing::info!(
            id,
            file_id = %file_id,
            chunks,
            bytes = stored.len(),
            codec,
            "content downloaded"
        );
        Ok(record)
    }

    async fn discard(&self, file_id: &str) {
        match self.chunks.delete_group(file_id).await {
            Ok(removed) => tracing::debug!(file_id, chunks = removed, "staged group discarded"),
            Err(e) => tracing::warn!(file_id, error = %e, "could not discard staged group"),
        }
    }
}
