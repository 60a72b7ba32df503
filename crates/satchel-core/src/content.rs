//! Content catalog schema.
//!
//! A `ContentRecord` starts life as a remote descriptor and gains a
//! `LocalCopy` once its bytes have been cached. The local fields only ever
//! appear together, so "has a fileId" and "is downloaded" cannot disagree.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Content type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Video,
    Image,
    Quiz,
    Document,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Video,
        ContentType::Image,
        ContentType::Quiz,
        ContentType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
            Self::Quiz => "quiz",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown content type: {0}")]
pub struct UnknownContentType(pub String);

impl FromStr for ContentType {
    type Err = UnknownContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "quiz" => Ok(Self::Quiz),
            "document" => Ok(Self::Document),
            other => Err(UnknownContentType(other.to_string())),
        }
    }
}

/// Locally-owned state, present only once the content is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalCopy {
    /// Group key into the chunk store.
    pub file_id: String,

    /// Unix ms of the catalog commit.
    pub downloaded_at: u64,

    /// Bytes actually stored (after compression).
    pub local_size_bytes: u64,

    /// Parsed from the descriptor's declared size.
    pub original_size_bytes: u64,

    /// Bytes received from the fetcher, before compression.
    #[serde(default)]
    pub fetched_size_bytes: u64,

    /// Name of the compression strategy that produced the stored bytes.
    pub codec: String,

    /// Hex BLAKE3 digest of the stored bytes.
    pub content_hash: String,
}

/// Catalog entry for one piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: String,
    pub title: String,
    #[serde(alias = "type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub grade: String,
    /// Human size string as published upstream, e.g. "15MB".
    #[serde(default, alias = "size")]
    pub declared_size: String,
    #[serde(alias = "url")]
    pub source_url: String,
    #[serde(default, alias = "thumbnail", skip_serializing_if = "Option::is_none")]
    pub thumbnail_ref: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalCopy>,
}

impl ContentRecord {
    /// A bare remote descriptor with no local state.
    pub fn descriptor(
        id: impl Into<String>,
        title: impl Into<String>,
        content_type: ContentType,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content_type,
            subject: String::new(),
            grade: String::new(),
            declared_size: String::new(),
            source_url: source_url.into(),
            thumbnail_ref: None,
            tags: BTreeSet::new(),
            created_at: None,
            updated_at: None,
            local: None,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.local.is_some()
    }

    pub fn file_id(&self) -> Option<&str> {
        self.local.as_ref().map(|l| l.file_id.as_str())
    }

    pub fn local_size_bytes(&self) -> u64 {
        self.local.as_ref().map(|l| l.local_size_bytes).unwrap_or(0)
    }

    pub fn downloaded_at(&self) -> Option<u64> {
        self.local.as_ref().map(|l| l.downloaded_at)
    }

    /// `local_size_bytes / original_size_bytes`, recomputed on every call.
    ///
    /// `None` when not downloaded or when the declared size parsed to zero.
    pub fn compression_ratio(&self) -> Option<f64> {
        let local = self.local.as_ref()?;
        if local.original_size_bytes == 0 {
            return None;
        }
        Some(local.local_size_bytes as f64 / local.original_size_bytes as f64)
    }

    /// The same record with local state dropped.
    pub fn as_descriptor(&self) -> Self {
        Self {
            local: None,
            ..self.clone()
        }
    }
}
