//! satchel-services — the offline content cache engine.
//!
//! Everything here talks to the host through [`store::DurableStore`] and
//! [`fetch::ContentFetcher`]; [`engine::OfflineCache`] ties the pieces
//! together behind the public operations.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod catalog;
pub mod chunk_store;
pub mod compress;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod locks;
pub mod pipeline;
pub mod preferences;
pub mod quota;
pub mod stats;
pub mod store;

pub use catalog::{Catalog, CatalogIndex, ContentFilter};
pub use chunk_store::{ChunkStore, CHUNK_SIZE};
pub use compress::{CodecError, CompressionStrategy, StrategyRegistry};
pub use engine::{merge_catalog, DownloadState, OfflineCache, OfflineContent};
pub use error::{CacheError, OpenError};
pub use fetch::{ContentFetcher, FileFetcher, HttpFetcher, SchemeFetcher, TransportError};
pub use pipeline::DownloadPipeline;
pub use preferences::Preferences;
pub use quota::{AdmissionController, QuotaEstimate, QuotaReporter};
pub use stats::{compute_stats, StorageStats};
pub use store::{DurableStore, MemoryStore, SqliteStore, StoreError, StoreHandle};

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
