//! Read-only aggregates over the catalog.

use std::collections::BTreeSet;

use satchel_core::ContentRecord;
use serde::Serialize;

use crate::catalog::Catalog;
use crate::store::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Σ local bytes over downloaded records.
    pub total_size: u64,
    pub content_count: usize,
    pub subjects: BTreeSet<String>,
    /// Most recent download, unix ms. `None` when nothing is downloaded.
    pub last_sync: Option<u64>,
}

pub fn compute_stats(records: &[ContentRecord]) -> StorageStats {
    StorageStats {
        total_size: records.iter().map(ContentRecord::local_size_bytes).sum(),
        content_count: records.len(),
        subjects: records.iter().map(|r| r.subject.clone()).collect(),
        last_sync: records.iter().filter_map(ContentRecord::downloaded_at).max(),
    }
}

pub async fn storage_stats(catalog: &Catalog) -> Result<StorageStats, StoreError> {
    Ok(compute_stats(&catalog.list_all().await?))
}
