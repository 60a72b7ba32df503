use crate::*;

use satchel_services::ContentFilter;

#[tokio::test]
async fn test_stats_over_downloaded_content() -> Result<()> {
    let (fetcher, cache) = engine(memory_store());
    let empty = cache.get_storage_stats().await?;
    assert_eq!(empty.content_count, 0);
    assert_eq!(empty.last_sync, None);

    let mut last = None;
    for (id, subject, size) in [("a", "Math", 100), ("b", "Science", 200), ("c", "Math", 300)] {
        fetcher.serve(&format!("mem://{id}"), body(size, 0));
        let record = cache.download_content(&lesson(id, subject, "1KB")).await?;
        last = record.downloaded_at();
    }

    let stats = cache.get_storage_stats().await?;
    assert_eq!(stats.total_size, 600);
    assert_eq!(stats.content_count, 3);
    assert_eq!(stats.subjects.len(), 2);
    assert!(stats.subjects.contains("Science"));
    assert_eq!(stats.last_sync, last);

    let json = serde_json::to_value(&stats)?;
    assert_eq!(json["totalSize"], 600);
    assert_eq!(json["contentCount"], 3);
    Ok(())
}

#[tokio::test]
async fn test_filters_and_time_window() -> Result<()> {
    let (_path, store) = sqlite_store("filters");
    let (fetcher, cache) = engine(store);
    for id in ["a", "b", "c"] {
        fetcher.serve(&format!("mem://{id}"), body(10, 0));
    }

    let a = cache.download_content(&lesson("a", "Math", "10 Bytes")).await?;
    let mut quiz = lesson("b", "Math", "10 Bytes");
    quiz.content_type = ContentType::Quiz;
    quiz.grade = "5".into();
    cache.download_content(&quiz).await?;
    cache.download_content(&lesson("c", "History", "10 Bytes")).await?;

    let math = cache
        .query(&ContentFilter {
            subject: Some("Math".into()),
            ..ContentFilter::default()
        })
        .await?;
    assert_eq!(math.len(), 2);

    let grade5_quiz = cache
        .query(&ContentFilter {
            grade: Some("5".into()),
            content_type: Some(ContentType::Quiz),
            ..ContentFilter::default()
        })
        .await?;
    assert_eq!(grade5_quiz.len(), 1);
    assert_eq!(grade5_quiz[0].id, "b");

    let from_a = cache
        .downloaded_between(a.downloaded_at().unwrap(), u64::MAX)
        .await?;
    assert_eq!(from_a.len(), 3);
    assert!(cache.downloaded_between(0, 1).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_merge_remote_catalog() -> Result<()> {
    let (fetcher, cache) = engine(memory_store());
    fetcher.serve("mem://a", body(10, 0));
    let local = cache.download_content(&lesson("a", "Math", "1KB")).await?;

    let mut remote_a = lesson("a", "Math", "1KB");
    remote_a.title = "Renamed upstream".into();
    let remote = vec![remote_a, lesson("b", "Art", "2MB")];

    let merged = cache.merge_remote(remote).await?;
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0], local);
    assert_eq!(merged[1].id, "b");
    assert!(!merged[1].is_downloaded());
    Ok(())
}
