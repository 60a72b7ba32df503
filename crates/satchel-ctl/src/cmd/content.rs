//! Content commands: download, list, show, export, delete, sync.

use anyhow::{Context, Result};
use satchel_core::{format_bytes, ContentRecord};
use satchel_services::{ContentFilter, OfflineCache};

use super::source::load_descriptors;

fn ratio(record: &ContentRecord) -> String {
    record
        .compression_ratio()
        .map(|r| format!("{:.2}", r))
        .unwrap_or_else(|| "-".to_string())
}

fn print_record(record: &ContentRecord) {
    println!("  ┌─ {}", record.id);
    println!("  │  title    : {}", record.title);
    println!("  │  type     : {}", record.content_type);
    println!("  │  subject  : {} (grade {})", record.subject, record.grade);
    match &record.local {
        Some(local) => {
            println!("  │  stored   : {}", format_bytes(local.local_size_bytes));
            println!("  │  ratio    : {}", ratio(record));
            println!("  │  codec    : {}", local.codec);
            println!("  └─ file id  : {}", local.file_id);
        }
        None => println!("  └─ declared : {}", record.declared_size),
    }
}

pub async fn cmd_download(cache: &OfflineCache, source: &str, user_agent: &str) -> Result<()> {
    let descriptors = load_descriptors(source, user_agent).await?;
    let total = descriptors.len();
    let mut failed = 0;

    for descriptor in &descriptors {
        match cache.download_content(descriptor).await {
            Ok(record) => println!(
                "✓ {} ({}, ratio {})",
                record.title,
                format_bytes(record.local_size_bytes()),
                ratio(&record)
            ),
            Err(e) => {
                failed += 1;
                eprintln!("✗ {}", e);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} downloads failed", failed, total);
    }
    Ok(())
}

pub async fn cmd_list(cache: &OfflineCache, filter: &ContentFilter) -> Result<()> {
    let mut records = cache.query(filter).await?;
    if records.is_empty() {
        println!("No offline content.");
        return Ok(());
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));

    println!("═══════════════════════════════════════");
    println!("  Offline Content ({})", records.len());
    println!("═══════════════════════════════════════");
    for record in &records {
        print_record(record);
    }
    Ok(())
}

pub async fn cmd_show(cache: &OfflineCache, id: &str) -> Result<()> {
    let content = cache.get_offline_content(id).await?;
    let state = cache.download_state(id).await?;

    print_record(&content.record);
    println!("  Verified {} ({:?})", format_bytes(content.bytes.len() as u64), state);
    Ok(())
}

pub async fn cmd_export(cache: &OfflineCache, id: &str, path: &str) -> Result<()> {
    let content = cache.get_offline_content(id).await?;
    tokio::fs::write(path, &content.bytes)
        .await
        .with_context(|| format!("failed to write {}", path))?;
    println!(
        "Exported {} to {} ({})",
        content.record.title,
        path,
        format_bytes(content.bytes.len() as u64)
    );
    Ok(())
}

pub async fn cmd_delete(cache: &OfflineCache, id: &str) -> Result<()> {
    cache.delete_offline_content(id).await?;
    println!("Deleted {}.", id);
    Ok(())
}

/// Print the remote catalog with local copies folded in.
pub async fn cmd_sync(cache: &OfflineCache, source: &str, user_agent: &str) -> Result<()> {
    let remote = load_descriptors(source, user_agent).await?;
    let merged = cache.merge_remote(remote).await?;
    let offline = merged.iter().filter(|r| r.is_downloaded()).count();

    println!("═══════════════════════════════════════");
    println!("  Catalog ({} items, {} offline)", merged.len(), offline);
    println!("═══════════════════════════════════════");
    for record in &merged {
        let mark = if record.is_downloaded() { "●" } else { "○" };
        println!("  {} {:<24} {:<10} {}", mark, record.id, record.content_type, record.title);
    }
    Ok(())
}
