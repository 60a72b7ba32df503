//! User preferences: small JSON values next to the content catalog.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::{blocking, StoreError, StoreHandle, Table};

#[derive(Clone)]
pub struct Preferences {
    store: StoreHandle,
}

impl Preferences {
    pub fn new(store: StoreHandle) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let key = key.to_string();
        let raw = blocking(&self.store, move |s| s.get(Table::Preferences, &key)).await?;
        raw.map(|raw| serde_json::from_slice(&raw).map_err(StoreError::from))
            .transpose()
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_vec(value)?;
        let key = key.to_string();
        blocking(&self.store, move |s| s.put(Table::Preferences, &key, &value, &[])).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        blocking(&self.store, move |s| s.delete(Table::Preferences, &key)).await
    }

    /// Every stored preference as raw JSON.
    pub async fn all(&self) -> Result<Vec<(String, serde_json::Value)>, StoreError> {
        let rows = blocking(&self.store, |s| s.scan(Table::Preferences)).await?;
        rows.into_iter()
            .map(|(key, raw)| Ok((key, serde_json::from_slice(&raw)?)))
            .collect()
    }
}
