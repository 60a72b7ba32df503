//! Configuration system for Satchel.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SATCHEL_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/satchel/config.toml
//!   3. ~/.config/satchel/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SatchelConfig {
    pub storage: StorageSettings,
    pub quota: QuotaSettings,
    pub download: DownloadSettings,
    pub compression: CompressionSettings,
}

/// Which durable store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    /// Process-local; contents vanish on exit.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// SQLite database file. Ignored by the memory backend.
    pub db_path: PathBuf,
}

/// Where admission gets its capacity figures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaMode {
    /// Free space of the filesystem holding the database.
    Filesystem,
    /// Fixed byte budget against the catalog's stored bytes.
    Budget,
    /// No reporting; admission always succeeds.
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub mode: QuotaMode,
    /// Budget mode only. 0 = unlimited.
    pub max_cache_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Chunk writes in flight per download. 0 is treated as 1.
    pub chunk_write_parallelism: usize,
    pub user_agent: String,
}

/// Strategy name per content type slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub video: String,
    pub image: String,
    pub quiz: String,
    pub document: String,
    pub zstd_level: i32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            db_path: data_dir().join("cache.db"),
        }
    }
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            mode: QuotaMode::Filesystem,
            max_cache_bytes: 0,
        }
    }
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            chunk_write_parallelism: 4,
            user_agent: format!("satchel/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            video: "identity".to_string(),
            image: "identity".to_string(),
            quiz: "identity".to_string(),
            document: "identity".to_string(),
            zstd_level: 3,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("satchel")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("satchel")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SatchelConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::file_path())
    }

    /// Load from an explicit file, still applying env overrides.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            SatchelConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SATCHEL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&SatchelConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SATCHEL_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SATCHEL_STORAGE__BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "sqlite" => self.storage.backend = StorageBackend::Sqlite,
                "memory" => self.storage.backend = StorageBackend::Memory,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("SATCHEL_STORAGE__DB_PATH") {
            self.storage.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SATCHEL_QUOTA__MODE") {
            match v.to_ascii_lowercase().as_str() {
                "filesystem" => self.quota.mode = QuotaMode::Filesystem,
                "budget" => self.quota.mode = QuotaMode::Budget,
                "none" => self.quota.mode = QuotaMode::None,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("SATCHEL_QUOTA__MAX_CACHE_BYTES") {
            if let Ok(n) = v.parse() {
                self.quota.max_cache_bytes = n;
            }
        }
        if let Ok(v) = std::env::var("SATCHEL_DOWNLOAD__CHUNK_WRITE_PARALLELISM") {
            if let Ok(n) = v.parse() {
                self.download.chunk_write_parallelism = n;
            }
        }
    }
}
