//! Compression strategies, one slot per content type.
//!
//! The pipeline encodes fetched bytes with the strategy in the record's
//! content-type slot and stores the strategy name alongside the record, so
//! retrieval decodes with whatever produced the stored bytes.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use satchel_core::config::CompressionSettings;
use satchel_core::ContentType;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown compression strategy: {0}")]
    UnknownStrategy(String),

    #[error("{strategy} failed: {source}")]
    Io {
        strategy: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Reversible transform applied before chunking.
///
/// Lossy re-encoders (video transcoding, image recompression) fit the same
/// shape: `decode` is then the identity on their output.
pub trait CompressionStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, input: Bytes) -> Result<Bytes, CodecError>;
    fn decode(&self, stored: Bytes) -> Result<Bytes, CodecError>;
}

/// Pass-through. The default for every slot.
pub struct Identity;

impl CompressionStrategy for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encode(&self, input: Bytes) -> Result<Bytes, CodecError> {
        Ok(input)
    }

    fn decode(&self, stored: Bytes) -> Result<Bytes, CodecError> {
        Ok(stored)
    }
}

pub struct Zstd {
    level: i32,
}

impl Zstd {
    pub fn new(level: i32) -> Self {
        Self { level: level.max(1) }
    }
}

impl CompressionStrategy for Zstd {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode(&self, input: Bytes) -> Result<Bytes, CodecError> {
        zstd::stream::encode_all(&input[..], self.level)
            .map(Bytes::from)
            .map_err(|source| CodecError::Io {
                strategy: "zstd",
                source,
            })
    }

    fn decode(&self, stored: Bytes) -> Result<Bytes, CodecError> {
        zstd::stream::decode_all(&stored[..])
            .map(Bytes::from)
            .map_err(|source| CodecError::Io {
                strategy: "zstd",
                source,
            })
    }
}

/// Strategy per content-type slot, plus every known strategy by name.
#[derive(Clone)]
pub struct StrategyRegistry {
    slots: HashMap<ContentType, Arc<dyn CompressionStrategy>>,
    known: HashMap<&'static str, Arc<dyn CompressionStrategy>>,
    fallback: Arc<dyn CompressionStrategy>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::identity()
    }
}

impl StrategyRegistry {
    /// Every slot passes bytes through unchanged.
    pub fn identity() -> Self {
        let identity: Arc<dyn CompressionStrategy> = Arc::new(Identity);
        let mut known = HashMap::new();
        known.insert(identity.name(), identity.clone());
        Self {
            slots: HashMap::new(),
            known,
            fallback: identity,
        }
    }

    /// Built-in strategies, slots filled from `[compression]`.
    pub fn from_settings(settings: &CompressionSettings) -> Result<Self, CodecError> {
        let mut registry = Self::identity().register(Arc::new(Zstd::new(settings.zstd_level)));
        for (content_type, name) in [
            (ContentType::Video, &settings.video),
            (ContentType::Image, &settings.image),
            (ContentType::Quiz, &settings.quiz),
            (ContentType::Document, &settings.document),
        ] {
            let strategy = registry
                .by_name(name)
                .ok_or_else(|| CodecError::UnknownStrategy(name.clone()))?;
            registry.slots.insert(content_type, strategy);
        }
        Ok(registry)
    }

    /// Make a strategy resolvable by name without assigning it a slot.
    pub fn register(mut self, strategy: Arc<dyn CompressionStrategy>) -> Self {
        self.known.insert(strategy.name(), strategy);
        self
    }

    /// Put `strategy` in the slot for `content_type`.
    pub fn with(mut self, content_type: ContentType, strategy: Arc<dyn CompressionStrategy>) -> Self {
        self.known.insert(strategy.name(), strategy.clone());
        self.slots.insert(content_type, strategy);
        self
    }

    pub fn for_type(&self, content_type: ContentType) -> Arc<dyn CompressionStrategy> {
        self.slots
            .get(&content_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn CompressionStrategy>> {
        self.known.get(name).cloned()
    }
}
