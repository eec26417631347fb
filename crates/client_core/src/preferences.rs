use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::PreferenceKey;
use storage::Storage;
use tokio::sync::Mutex;

use crate::PreferenceStore;

#[async_trait]
impl PreferenceStore for Storage {
    async fn persist(&self, key: PreferenceKey, value: &str) -> Result<()> {
        self.save_preference(key, value).await
    }

    async fn load(&self, key: PreferenceKey) -> Result<Option<String>> {
        Ok(self.load_preference(key).await?.map(|stored| stored.value))
    }
}

/// Process-local preference store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<PreferenceKey, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: PreferenceKey) -> Option<String> {
        self.values.lock().await.get(&key).cloned()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn persist(&self, key: PreferenceKey, value: &str) -> Result<()> {
        self.values.lock().await.insert(key, value.to_string());
        Ok(())
    }

    async fn load(&self, key: PreferenceKey) -> Result<Option<String>> {
        Ok(self.get(key).await)
    }
}
