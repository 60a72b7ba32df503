use crate::*;

use satchel_core::config::{QuotaMode, StorageBackend};
use satchel_core::SatchelConfig;
use satchel_services::{CacheError, DownloadState, CHUNK_SIZE};

#[tokio::test]
async fn test_download_then_read_back_from_sqlite() -> Result<()> {
    let (_path, store) = sqlite_store("download");
    let (fetcher, cache) = engine(store.clone());
    let data = body(3 * CHUNK_SIZE + 123, 7);
    fetcher.serve("mem://a", data.clone());

    let record = cache.download_content(&lesson("a", "Math", "4MB")).await?;
    assert!(record.is_downloaded());
    assert_eq!(record.local_size_bytes(), data.len() as u64);

    let all = cache.get_all_offline_content().await?;
    assert!(all.iter().any(|r| r.id == "a" && r.is_downloaded()));

    let content = cache.get_offline_content("a").await?;
    assert_eq!(content.bytes, data);
    assert_eq!(stored_indices(&store, record.file_id().unwrap()).len(), 4);
    Ok(())
}

#[tokio::test]
async fn test_content_survives_reopen() -> Result<()> {
    let (path, store) = sqlite_store("reopen");
    let data = body(CHUNK_SIZE + 1, 1);
    {
        let (fetcher, cache) = engine(store);
        fetcher.serve("mem://a", data.clone());
        cache.download_content(&lesson("a", "Science", "2MB")).await?;
    }

    let reopened: StoreHandle = Arc::new(SqliteStore::open(&path)?);
    assert_eq!(reopened.initialize()?, satchel_services::store::SCHEMA_VERSION);
    let (fetcher, cache) = engine(reopened);

    let content = cache.get_offline_content("a").await?;
    assert_eq!(content.bytes, data);
    assert_eq!(cache.download_state("a").await?, DownloadState::Downloaded);
    assert_eq!(fetcher.fetches(), 0);
    Ok(())
}

#[tokio::test]
async fn test_redownload_replaces_group() -> Result<()> {
    let store = memory_store();
    let (fetcher, cache) = engine(store.clone());
    fetcher.serve("mem://a", body(2 * CHUNK_SIZE, 1));
    let first = cache.download_content(&lesson("a", "Math", "2MB")).await?;

    let updated = body(CHUNK_SIZE / 2, 9);
    fetcher.serve("mem://a", updated.clone());
    let second = cache.download_content(&lesson("a", "Math", "2MB")).await?;

    assert!(stored_indices(&store, first.file_id().unwrap()).is_empty());
    assert_eq!(stored_groups(&store), vec![second.file_id().unwrap().to_string()]);
    assert_eq!(cache.get_offline_content("a").await?.bytes, updated);
    assert_eq!(cache.get_all_offline_content().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_content_roundtrips() -> Result<()> {
    let (fetcher, cache) = engine(memory_store());
    fetcher.serve("mem://empty", Bytes::new());

    let record = cache.download_content(&lesson("empty", "Math", "0 Bytes")).await?;
    assert_eq!(record.local_size_bytes(), 0);
    assert_eq!(record.compression_ratio(), None);
    assert!(cache.get_offline_content("empty").await?.bytes.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_open_from_config_with_zstd_documents() -> Result<()> {
    let dir = temp_dir("config");
    let mut config = SatchelConfig::default();
    config.storage.backend = StorageBackend::Sqlite;
    config.storage.db_path = dir.join("nested").join("cache.db");
    config.quota.mode = QuotaMode::None;
    config.compression.document = "zstd".into();

    let fetcher = Arc::new(MapFetcher::default());
    let text = Bytes::from("photosynthesis ".repeat(20_000));
    fetcher.serve("mem://notes", text.clone());
    let cache = OfflineCache::open(&config, fetcher.clone())?;

    let mut notes = lesson("notes", "Biology", "300KB");
    notes.content_type = ContentType::Document;
    let record = cache.download_content(&notes).await?;

    let local = record.local.as_ref().unwrap();
    assert_eq!(local.codec, "zstd");
    assert_eq!(local.fetched_size_bytes, text.len() as u64);
    assert!(local.local_size_bytes < local.fetched_size_bytes);
    assert!(record.compression_ratio().unwrap() < 1.0);

    assert_eq!(cache.get_offline_content("notes").await?.bytes, text);
    assert!(config.storage.db_path.exists());
    Ok(())
}

#[tokio::test]
async fn test_budget_quota_from_config() -> Result<()> {
    let mut config = SatchelConfig::default();
    config.storage.backend = StorageBackend::Memory;
    config.quota.mode = QuotaMode::Budget;
    config.quota.max_cache_bytes = 3 * 1024;

    let fetcher = Arc::new(MapFetcher::default());
    fetcher.serve("mem://a", body(2 * 1024, 0));
    fetcher.serve("mem://b", body(2 * 1024, 0));
    let cache = OfflineCache::open(&config, fetcher.clone())?;

    cache.download_content(&lesson("a", "Math", "2KB")).await?;
    let err = cache
        .download_content(&lesson("b", "Math", "2KB"))
        .await
        .unwrap_err();
    match err {
        CacheError::QuotaExceeded {
            id,
            required,
            available,
            ..
        } => {
            assert_eq!(id, "b");
            assert_eq!(required, 2 * 1024);
            assert_eq!(available, 1024);
        }
        other => panic!("unexpected error: {other}"),
    }
    // Denied before fetching.
    assert_eq!(fetcher.fetches(), 1);
    Ok(())
}
