//! The engine facade.
//!
//! Holds the catalog and chunk store views over one store handle, the
//! per-id lock table and the download state table. State-changing
//! operations on one id are serialized by [`IdLocks`]; every per-id
//! operation holds the read side of an engine-wide gate whose write side
//! `clear_all` takes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use satchel_core::{ContentRecord, SatchelConfig};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::catalog::{Catalog, ContentFilter};
use crate::chunk_store::ChunkStore;
use crate::compress::StrategyRegistry;
use crate::error::{CacheError, OpenError, Result};
use crate::fetch::ContentFetcher;
use crate::locks::IdLocks;
use crate::pipeline::DownloadPipeline;
use crate::preferences::Preferences;
use crate::quota::AdmissionController;
use crate::stats::{storage_stats, StorageStats};
use crate::store::{self, StoreHandle};

/// Download progress of one content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "camelCase")]
pub enum DownloadState {
    NotDownloaded,
    Downloading,
    Downloaded,
    /// Last attempt failed; any earlier committed copy is still intact.
    Failed(String),
}

/// Failed states kept before older ones are dropped. A dropped id reports
/// from the catalog again.
pub const MAX_FAILED_STATES: usize = 1024;

/// A committed record with its reassembled, decoded bytes.
#[derive(Debug, Clone)]
pub struct OfflineContent {
    pub record: ContentRecord,
    pub bytes: Bytes,
}

pub struct OfflineCache {
    catalog: Catalog,
    chunks: ChunkStore,
    pipeline: DownloadPipeline,
    preferences: Preferences,
    locks: IdLocks,
    gate: RwLock<()>,
    states: DashMap<String, DownloadState>,
    failed_state_limit: usize,
}

impl OfflineCache {
    /// Engine over an already initialized store. `pipeline` must write to
    /// the same store.
    pub fn new(store: StoreHandle, pipeline: DownloadPipeline) -> Self {
        Self {
            catalog: Catalog::new(store.clone()),
            chunks: ChunkStore::new(store.clone()),
            pipeline,
            preferences: Preferences::new(store),
            locks: IdLocks::new(),
            gate: RwLock::new(()),
            states: DashMap::new(),
            failed_state_limit: MAX_FAILED_STATES,
        }
    }

    pub fn with_failed_state_limit(mut self, limit: usize) -> Self {
        self.failed_state_limit = limit.max(1);
        self
    }

    /// Open the configured store and wire every component from `config`.
    pub fn open(config: &SatchelConfig, fetcher: Arc<dyn ContentFetcher>) -> Result<Self, OpenError> {
        let store = store::open(&config.storage)?;
        let admission =
            AdmissionController::from_settings(&config.quota, &config.storage.db_path, store.clone());
        let pipeline = DownloadPipeline::new(store.clone(), fetcher)
            .with_admission(admission)
            .with_strategies(StrategyRegistry::from_settings(&config.compression)?)
            .with_parallelism(config.download.chunk_write_parallelism);
        Ok(Self::new(store, pipeline))
    }

    /// Fetch, encode and persist `descriptor`, replacing any earlier copy.
    pub async fn download_content(&self, descriptor: &ContentRecord) -> Result<ContentRecord> {
        let _gate = self.gate.read().await;
        let _id = self.locks.acquire(&descriptor.id).await;

        self.states
            .insert(descriptor.id.clone(), DownloadState::Downloading);
        match self.pipeline.run(descriptor).await {
            Ok(record) => {
                self.states
                    .insert(descriptor.id.clone(), DownloadState::Downloaded);
                Ok(record)
            }
            Err(e) => {
                tracing::warn!(id = %descriptor.id, error = %e, "download failed");
                self.record_failure(&descriptor.id, e.to_string());
                Err(e)
            }
        }
    }

    /// Once `failed_state_limit` failures are held, all of them are dropped
    /// before the new one is recorded.
    fn record_failure(&self, id: &str, message: String) {
        let failed = self
            .states
            .iter()
            .filter(|entry| matches!(entry.value(), DownloadState::Failed(_)))
            .count();
        if failed >= self.failed_state_limit {
            self.states
                .retain(|_, state| !matches!(state, DownloadState::Failed(_)));
            tracing::debug!(dropped = failed, "failed download states purged");
        }
        self.states.insert(id.to_string(), DownloadState::Failed(message));
    }

    /// Committed record plus its bytes, verified against the stored digest
    /// and decoded with the codec that wrote them.
    pub async fn get_offline_content(&self, id: &str) -> Result<OfflineContent> {
        let _gate = self.gate.read().await;
        let _id = self.locks.acquire(id).await;

        let record = self.catalog.get(id).await?;
        let local = record.local.clone().ok_or_else(|| CacheError::not_found(id))?;
        let stored = self
            .chunks
            .reconstruct(&local.file_id, local.local_size_bytes)
            .await?;

        let codec = self.pipeline.strategies().by_name(&local.codec).ok_or_else(|| {
            CacheError::ContentCorrupted {
                file_id: local.file_id.clone(),
                reason: format!("stored with unknown codec {:?}", local.codec),
            }
        })?;
        let file_id = local.file_id.clone();
        let expected = local.content_hash.clone();
        let bytes = tokio::task::spawn_blocking(move || {
            if !expected.is_empty() {
                let actual = hex::encode(blake3::hash(&stored).as_bytes());
                if actual != expected {
                    return Err(CacheError::ContentCorrupted {
                        file_id,
                        reason: format!("digest {actual} does not match {expected}"),
                    });
                }
            }
            codec.decode(stored).map_err(|e| CacheError::ContentCorrupted {
                file_id,
                reason: e.to_string(),
            })
        })
        .await
        .map_err(|e| CacheError::StorageReadFailed(e.into()))??;

        tracing::debug!(id, bytes = bytes.len(), "content served from cache");
        Ok(OfflineContent { record, bytes })
    }

    pub async fn get_all_offline_content(&self) -> Result<Vec<ContentRecord>> {
        Ok(self.catalog.list_all().await?)
    }

    /// Remove the record, then its chunk group.
    ///
    /// A group that fails to delete is reported but no longer referenced;
    /// [`sweep_orphans`](Self::sweep_orphans) reclaims it.
    pub async fn delete_offline_content(&self, id: &str) -> Result<()> {
        let _gate = self.gate.read().await;
        let _id = self.locks.acquire(id).await;

        let record = self.catalog.get(id).await?;
        self.catalog
            .delete(id)
            .await
            .map_err(|e| CacheError::storage_write(id, &record.title, e))?;
        self.states.remove(id);

        if let Some(file_id) = record.file_id() {
            match self.chunks.delete_group(file_id).await {
                Ok(chunks) => tracing::info!(id, file_id, chunks, "content deleted"),
                Err(e) => {
                    tracing::warn!(id, file_id, error = %e, "record removed but chunk group remains");
                    return Err(CacheError::storage_write(id, &record.title, e));
                }
            }
        }
        Ok(())
    }

    pub async fn get_storage_stats(&self) -> Result<StorageStats> {
        Ok(storage_stats(&self.catalog).await?)
    }

    /// Drop every record and chunk. Preferences survive.
    pub async fn clear_all(&self) -> Result<()> {
        let _gate = self.gate.write().await;
        self.catalog
            .clear()
            .await
            .map_err(|e| CacheError::storage_write("*", "all content", e))?;
        self.chunks
            .clear()
            .await
            .map_err(|e| CacheError::storage_write("*", "all content", e))?;
        self.states.clear();
        tracing::info!("offline cache cleared");
        Ok(())
    }

    pub async fn download_state(&self, id: &str) -> Result<DownloadState> {
        if let Some(state) = self.states.get(id) {
            return Ok(state.clone());
        }
        Ok(match self.catalog.find(id).await? {
            Some(record) if record.is_downloaded() => DownloadState::Downloaded,
            _ => DownloadState::NotDownloaded,
        })
    }

    pub async fn query(&self, filter: &ContentFilter) -> Result<Vec<ContentRecord>> {
        Ok(self.catalog.filter(filter).await?)
    }

    /// Records downloaded within `[from, to]` unix ms.
    pub async fn downloaded_between(&self, from: u64, to: u64) -> Result<Vec<ContentRecord>> {
        Ok(self.catalog.downloaded_between(from, to).await?)
    }

    /// The remote catalog with local copies folded in. Nothing is written.
    pub async fn merge_remote(&self, remote: Vec<ContentRecord>) -> Result<Vec<ContentRecord>> {
        let local = self.catalog.list_all().await?;
        Ok(merge_catalog(remote, local))
    }

    /// Delete chunk groups no record references and no download is writing.
    /// Returns the number of groups removed.
    pub async fn sweep_orphans(&self) -> Result<usize> {
        let _gate = self.gate.read().await;

        // Groups first, then in-flight ids, then the catalog: a download
        // that commits in between is caught by one of the later two reads.
        let groups = self.chunks.file_ids().await?;
        let staging: HashSet<&str> = groups
            .iter()
            .map(String::as_str)
            .filter(|file_id| self.pipeline.is_staging(file_id))
            .collect();
        let referenced: HashSet<String> = self
            .catalog
            .list_all()
            .await?
            .into_iter()
            .filter_map(|r| r.local.map(|l| l.file_id))
            .collect();

        let mut removed = 0;
        for file_id in &groups {
            if staging.contains(file_id.as_str()) || referenced.contains(file_id) {
                continue;
            }
            let chunks = self
                .chunks
                .delete_group(file_id)
                .await
                .map_err(|e| CacheError::storage_write(file_id, "orphaned chunk group", e))?;
            tracing::info!(file_id = %file_id, chunks, "orphaned chunk group swept");
            removed += 1;
        }
        Ok(removed)
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }
}

/// Fold local records into a remote listing.
///
/// A local record replaces the remote descriptor with the same id wholesale.
/// Remote-only descriptors pass through without local state; local-only
/// records are appended in id order.
pub fn merge_catalog(remote: Vec<ContentRecord>, local: Vec<ContentRecord>) -> Vec<ContentRecord> {
    let mut local: HashMap<String, ContentRecord> =
        local.into_iter().map(|r| (r.id.clone(), r)).collect();

    let mut merged: Vec<ContentRecord> = remote
        .into_iter()
        .map(|r| local.remove(&r.id).unwrap_or_else(|| r.as_descriptor()))
        .collect();

    let mut rest: Vec<ContentRecord> = local.into_values().collect();
    rest.sort_by(|a, b| a.id.cmp(&b.id));
    merged.extend(rest);
    merged
}
