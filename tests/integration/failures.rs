use crate::*;

use satchel_services::{CacheError, DownloadState, CHUNK_SIZE};

fn flaky_engine() -> (Arc<FlakyStore>, StoreHandle, Arc<MapFetcher>, OfflineCache) {
    let flaky = Arc::new(FlakyStore::new(memory_store()));
    let store: StoreHandle = flaky.clone();
    let (fetcher, cache) = engine(store.clone());
    (flaky, store, fetcher, cache)
}

#[tokio::test]
async fn test_chunk_write_failure_leaves_nothing() -> Result<()> {
    let (flaky, store, fetcher, cache) = flaky_engine();
    fetcher.serve("mem://a", body(5 * CHUNK_SIZE, 4));
    flaky.fail_chunk_puts_after(2);

    let err = cache
        .download_content(&lesson("a", "Math", "5MB"))
        .await
        .unwrap_err();
    match &err {
        CacheError::StorageWriteFailed { id, title, .. } => {
            assert_eq!(id, "a");
            assert_eq!(title, "Lesson a");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());

    assert!(cache.get_all_offline_content().await?.is_empty());
    assert!(stored_groups(&store).is_empty());
    assert!(matches!(
        cache.download_state("a").await?,
        DownloadState::Failed(message) if message.contains("injected chunk write")
    ));

    flaky.heal();
    cache.download_content(&lesson("a", "Math", "5MB")).await?;
    assert_eq!(cache.download_state("a").await?, DownloadState::Downloaded);
    Ok(())
}

#[tokio::test]
async fn test_catalog_commit_failure_discards_chunks() -> Result<()> {
    let (flaky, store, fetcher, cache) = flaky_engine();
    fetcher.serve("mem://a", body(2 * CHUNK_SIZE, 0));
    flaky.fail_content_puts(true);

    let err = cache
        .download_content(&lesson("a", "Math", "2MB"))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::StorageWriteFailed { .. }));
    assert!(stored_groups(&store).is_empty());
    assert!(cache.get_all_offline_content().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_redownload_keeps_previous_copy() -> Result<()> {
    let (flaky, store, fetcher, cache) = flaky_engine();
    let original = body(CHUNK_SIZE + 10, 1);
    fetcher.serve("mem://a", original.clone());
    let first = cache.download_content(&lesson("a", "Math", "2MB")).await?;

    fetcher.serve("mem://a", body(3 * CHUNK_SIZE, 2));
    flaky.fail_chunk_puts_after(1);
    assert!(cache
        .download_content(&lesson("a", "Math", "2MB"))
        .await
        .is_err());

    assert_eq!(stored_groups(&store), vec![first.file_id().unwrap().to_string()]);
    assert_eq!(cache.get_offline_content("a").await?.bytes, original);
    Ok(())
}

#[tokio::test]
async fn test_catalog_lookup_failure_names_the_content() -> Result<()> {
    let (flaky, store, fetcher, cache) = flaky_engine();
    fetcher.serve("mem://a", body(CHUNK_SIZE, 0));
    flaky.fail_content_reads(true);

    let err = cache
        .download_content(&lesson("a", "Math", "1MB"))
        .await
        .unwrap_err();
    match &err {
        CacheError::LookupFailed { id, title, .. } => {
            assert_eq!(id, "a");
            assert_eq!(title, "Lesson a");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Lesson a (a)"));
    assert!(err.is_retryable());
    assert_eq!(fetcher.fetches(), 0);
    assert!(stored_groups(&store).is_empty());

    flaky.heal();
    cache.download_content(&lesson("a", "Math", "1MB")).await?;
    assert_eq!(cache.download_state("a").await?, DownloadState::Downloaded);
    Ok(())
}

#[tokio::test]
async fn test_fetch_failure_is_reported_without_writes() -> Result<()> {
    let (_flaky, store, _fetcher, cache) = flaky_engine();
    let err = cache
        .download_content(&lesson("missing", "Math", "1MB"))
        .await
        .unwrap_err();
    match err {
        CacheError::FetchFailed { id, source, .. } => {
            assert_eq!(id, "missing");
            assert!(matches!(source, TransportError::Status(404)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(stored_groups(&store).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_missing_chunk_is_corruption() -> Result<()> {
    let store = memory_store();
    let (fetcher, cache) = engine(store.clone());
    fetcher.serve("mem://a", body(3 * CHUNK_SIZE, 5));
    let record = cache.download_content(&lesson("a", "Math", "3MB")).await?;

    let keys = stored_indices(&store, record.file_id().unwrap());
    store.delete(Table::FileChunks, &keys[1])?;

    let err = cache.get_offline_content("a").await.unwrap_err();
    assert!(matches!(err, CacheError::ContentCorrupted { .. }));
    assert!(!err.is_retryable());
    Ok(())
}

#[tokio::test]
async fn test_orphan_left_by_failed_delete_is_swept() -> Result<()> {
    let (flaky, store, fetcher, cache) = flaky_engine();
    fetcher.serve("mem://a", body(2 * CHUNK_SIZE, 0));
    fetcher.serve("mem://b", body(100, 0));
    let doomed = cache.download_content(&lesson("a", "Math", "2MB")).await?;
    let kept = cache.download_content(&lesson("b", "Math", "1KB")).await?;

    flaky.fail_chunk_deletes(true);
    let err = cache.delete_offline_content("a").await.unwrap_err();
    assert!(matches!(err, CacheError::StorageWriteFailed { .. }));

    // The record is gone even though its chunks are not.
    assert!(matches!(
        cache.get_offline_content("a").await,
        Err(CacheError::NotFound { .. })
    ));
    assert_eq!(stored_indices(&store, doomed.file_id().unwrap()).len(), 2);

    flaky.heal();
    assert_eq!(cache.sweep_orphans().await?, 1);
    assert_eq!(stored_groups(&store), vec![kept.file_id().unwrap().to_string()]);
    Ok(())
}
