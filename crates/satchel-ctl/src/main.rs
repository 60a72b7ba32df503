//! satchel-ctl — command-line front end for the offline content cache.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use satchel_core::{ContentType, SatchelConfig};
use satchel_services::{ContentFilter, OfflineCache, SchemeFetcher};

mod cmd;

use cmd::content::{cmd_delete, cmd_download, cmd_export, cmd_list, cmd_show, cmd_sync};
use cmd::prefs::{cmd_pref_get, cmd_pref_list, cmd_pref_set};
use cmd::stats::{cmd_clear, cmd_stats, cmd_sweep};

fn print_usage() {
    println!("Usage: satchel-ctl [--config <path>] <command>");
    println!();
    println!("Content:");
    println!("  download <descriptor.json|url>   Download one or more described items");
    println!("  list [--subject S] [--grade G] [--type T]");
    println!("                                   List offline content");
    println!("  show <id>                        Verify and describe one item");
    println!("  export <id> <path>               Write an item's bytes to a file");
    println!("  delete <id>                      Remove an item and its chunks");
    println!("  sync <catalog.json|url>          Show a remote catalog merged with local copies");
    println!();
    println!("Storage:");
    println!("  stats                            Show storage statistics");
    println!("  clear                            Remove all offline content");
    println!("  sweep                            Delete orphaned chunk groups");
    println!();
    println!("Preferences:");
    println!("  pref                             List preferences");
    println!("  pref get <key>                   Show a preference");
    println!("  pref set <key> <json>            Set a preference");
    println!();
    println!("Options:");
    println!("  --config <path>   Config file (default: $SATCHEL_CONFIG or ~/.config/satchel/config.toml)");
}

fn load_config(path: Option<PathBuf>) -> Result<SatchelConfig> {
    if let Some(path) = path {
        return SatchelConfig::load_from(path).context("failed to load config");
    }
    if let Err(e) = SatchelConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    Ok(SatchelConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SatchelConfig::default()
    }))
}

fn parse_filter(args: &[&str]) -> Result<ContentFilter> {
    let mut filter = ContentFilter::default();
    let mut rest = args;
    loop {
        match rest {
            [] => return Ok(filter),
            ["--subject", value, tail @ ..] => {
                filter.subject = Some(value.to_string());
                rest = tail;
            }
            ["--grade", value, tail @ ..] => {
                filter.grade = Some(value.to_string());
                rest = tail;
            }
            ["--type", value, tail @ ..] => {
                filter.content_type = Some(value.parse::<ContentType>()?);
                rest = tail;
            }
            [flag, ..] => anyhow::bail!("unknown or incomplete list option: {}", flag),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --config option
    let mut config_path = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            i += 1;
            config_path = Some(PathBuf::from(
                args.get(i).context("--config requires a value")?,
            ));
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    if matches!(remaining.as_slice(), ["help"] | ["--help"] | ["-h"] | []) {
        print_usage();
        return Ok(());
    }

    let config = load_config(config_path)?;
    let user_agent = config.download.user_agent.clone();
    let fetcher = SchemeFetcher::new(&user_agent).context("failed to build http client")?;
    let cache = OfflineCache::open(&config, Arc::new(fetcher)).context("failed to open offline cache")?;

    match remaining.as_slice() {
        ["download", source]          => cmd_download(&cache, source, &user_agent).await,
        ["list", rest @ ..]           => cmd_list(&cache, &parse_filter(rest)?).await,
        ["show", id]                  => cmd_show(&cache, id).await,
        ["export", id, path]          => cmd_export(&cache, id, path).await,
        ["delete", id]                => cmd_delete(&cache, id).await,
        ["sync", source]              => cmd_sync(&cache, source, &user_agent).await,
        ["stats"]                     => cmd_stats(&cache).await,
        ["clear"]                     => cmd_clear(&cache).await,
        ["sweep"]                     => cmd_sweep(&cache).await,
        ["pref"]                      => cmd_pref_list(&cache).await,
        ["pref", "get", key]          => cmd_pref_get(&cache, key).await,
        ["pref", "set", key, value]   => cmd_pref_set(&cache, key, value).await,
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
