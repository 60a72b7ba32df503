//! Preference commands.

use anyhow::{Context, Result};
use satchel_services::OfflineCache;

pub async fn cmd_pref_get(cache: &OfflineCache, key: &str) -> Result<()> {
    match cache.preferences().get::<serde_json::Value>(key).await? {
        Some(value) => println!("{}", value),
        None => println!("{} is not set.", key),
    }
    Ok(())
}

pub async fn cmd_pref_set(cache: &OfflineCache, key: &str, raw: &str) -> Result<()> {
    // Bare words are taken as strings so `pref set language sw` works.
    let value: serde_json::Value = serde_json::from_str(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    cache
        .preferences()
        .set(key, &value)
        .await
        .with_context(|| format!("failed to store preference {}", key))?;
    println!("{} = {}", key, value);
    Ok(())
}

pub async fn cmd_pref_list(cache: &OfflineCache) -> Result<()> {
    let prefs = cache.preferences().all().await?;
    if prefs.is_empty() {
        println!("No preferences set.");
        return Ok(());
    }
    for (key, value) in prefs {
        println!("  {:<20} {}", key, value);
    }
    Ok(())
}
