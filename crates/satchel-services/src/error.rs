//! Error taxonomy for cache operations.

use crate::compress::CodecError;
use crate::fetch::TransportError;
use crate::store::StoreError;

/// Errors returned by the engine's public operations.
///
/// Pipeline errors carry the content id and title so a caller can render a
/// message without another catalog lookup. Nothing here is retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Admission denied: not enough free local capacity.
    #[error("not enough space for {title} ({id}): need {required} bytes, {available} available")]
    QuotaExceeded {
        id: String,
        title: String,
        required: u64,
        available: u64,
    },

    #[error("failed to fetch {title} ({id}): {source}")]
    FetchFailed {
        id: String,
        title: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to compress {title} ({id}): {source}")]
    CompressionFailed {
        id: String,
        title: String,
        #[source]
        source: CodecError,
    },

    #[error("failed to store {title} ({id}): {source}")]
    StorageWriteFailed {
        id: String,
        title: String,
        #[source]
        source: StoreError,
    },

    /// The catalog lookup that precedes a download failed.
    #[error("failed to look up {title} ({id}): {source}")]
    LookupFailed {
        id: String,
        title: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to read from the local store: {0}")]
    StorageReadFailed(#[source] StoreError),

    /// Reassembly found a gap, a length mismatch, or a digest mismatch.
    /// Re-download to recover.
    #[error("content {file_id} is corrupted: {reason}")]
    ContentCorrupted { file_id: String, reason: String },

    #[error("content not found: {id}")]
    NotFound { id: String },
}

impl CacheError {
    pub fn storage_write(id: &str, title: &str, source: StoreError) -> Self {
        Self::StorageWriteFailed {
            id: id.to_string(),
            title: title.to_string(),
            source,
        }
    }

    pub fn lookup(id: &str, title: &str, source: StoreError) -> Self {
        Self::LookupFailed {
            id: id.to_string(),
            title: title.to_string(),
            source,
        }
    }

    pub fn not_found(id: &str) -> Self {
        Self::NotFound { id: id.to_string() }
    }

    /// Whether re-issuing the same call could succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. }
                | Self::LookupFailed { .. }
                | Self::StorageWriteFailed { .. }
                | Self::StorageReadFailed(_)
        )
    }
}

impl From<StoreError> for CacheError {
    fn from(e: StoreError) -> Self {
        Self::StorageReadFailed(e)
    }
}

/// Failure bringing an engine up from configuration.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("opening the durable store: {0}")]
    Store(#[from] StoreError),

    #[error("building compression strategies: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
