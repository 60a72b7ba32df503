//! Reading content descriptors from a JSON file or an HTTP(S) URL.

use anyhow::{Context, Result};
use satchel_core::ContentRecord;
use serde::Deserialize;

/// A descriptor file holds either one record or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum Descriptors {
    One(Box<ContentRecord>),
    Many(Vec<ContentRecord>),
}

impl From<Descriptors> for Vec<ContentRecord> {
    fn from(d: Descriptors) -> Self {
        match d {
            Descriptors::One(record) => vec![*record],
            Descriptors::Many(records) => records,
        }
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str, user_agent: &str) -> Result<T> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .build()?
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to reach catalog at {}", url))?
        .error_for_status()
        .with_context(|| format!("catalog at {} refused the request", url))?
        .json::<T>()
        .await
        .context("failed to parse catalog response")
}

pub async fn load_descriptors(source: &str, user_agent: &str) -> Result<Vec<ContentRecord>> {
    let descriptors: Descriptors = if is_remote(source) {
        get_json(source, user_agent).await?
    } else {
        let raw = tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read descriptor file: {}", source))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("{} is not a content descriptor or a list of them", source))?
    };
    Ok(descriptors.into())
}
