//! In-process persistence backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{rank, ConfigurationPersistence, StoredConfiguration};
use crate::analyzer::TaskSignature;
use crate::error::StoreError;

/// Keeps configurations in a map; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    configurations: RwLock<HashMap<Uuid, StoredConfiguration>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.configurations.read().await.len()
    }
}

#[async_trait]
impl ConfigurationPersistence for InMemoryPersistence {
    async fn save(&self, configuration: &StoredConfiguration) -> Result<(), StoreError> {
        self.configurations
            .write()
            .await
            .insert(configuration.id, configuration.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<StoredConfiguration, StoreError> {
        self.configurations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn search(
        &self,
        signature: &TaskSignature,
        min_success_rate: f64,
    ) -> Result<Vec<StoredConfiguration>, StoreError> {
        let mut matches: Vec<StoredConfiguration> = self
            .configurations
            .read()
            .await
            .values()
            .filter(|c| &c.task_signature == signature && c.success_rate() >= min_success_rate)
            .cloned()
            .collect();
        matches.sort_by(rank);
        Ok(matches)
    }

    async fn list(&self) -> Result<Vec<StoredConfiguration>, StoreError> {
        let mut all: Vec<StoredConfiguration> =
            self.configurations.read().await.values().cloned().collect();
        all.sort_by(rank);
        Ok(all)
    }
}
