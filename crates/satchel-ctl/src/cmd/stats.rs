//! Storage-wide commands.

use anyhow::Result;
use satchel_core::format_bytes;
use satchel_services::OfflineCache;

pub async fn cmd_stats(cache: &OfflineCache) -> Result<()> {
    let stats = cache.get_storage_stats().await?;

    println!("═══════════════════════════════════════");
    println!("  Offline Storage");
    println!("═══════════════════════════════════════");
    println!("  Items      : {}", stats.content_count);
    println!("  Total size : {}", format_bytes(stats.total_size));
    match stats.last_sync {
        Some(ms) => println!("  Last sync  : {} (unix ms)", ms),
        None => println!("  Last sync  : never"),
    }
    if stats.subjects.is_empty() {
        println!("\n  No subjects.");
    } else {
        println!("\n  Subjects:");
        for subject in &stats.subjects {
            println!("    {}", subject);
        }
    }
    Ok(())
}

pub async fn cmd_clear(cache: &OfflineCache) -> Result<()> {
    let count = cache.get_storage_stats().await?.content_count;
    cache.clear_all().await?;
    println!("Cleared {} items from offline storage.", count);
    Ok(())
}

pub async fn cmd_sweep(cache: &OfflineCache) -> Result<()> {
    let removed = cache.sweep_orphans().await?;
    println!("Removed {} orphaned chunk groups.", removed);
    Ok(())
}
