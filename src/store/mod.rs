//! Configuration store: task signature → proven composition + outcome history.
//!
//! The store sits between the orchestrator and a [`ConfigurationPersistence`]
//! backend. Every read-modify-write of a configuration is serialized per id
//! with [`KeyedLocks`]; find-or-create for a fresh plan additionally holds a
//! per-signature lock so two concurrent first executions of the same
//! composition converge on a single record.

mod configuration;
mod locks;
mod memory;
mod sqlite;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

pub use configuration::StoredConfiguration;
pub use locks::KeyedLocks;
pub use memory::InMemoryPersistence;
pub use sqlite::SqlitePersistence;

use crate::analyzer::TaskSignature;
use crate::error::StoreError;
use crate::plan::{ExecutionPlan, ExecutionResult};

/// Storage backend for stored configurations.
#[async_trait]
pub trait ConfigurationPersistence: Send + Sync {
    /// Inserts or replaces a configuration by id.
    async fn save(&self, configuration: &StoredConfiguration) -> Result<(), StoreError>;

    /// Loads a configuration, or `StoreError::NotFound`.
    async fn load(&self, id: Uuid) -> Result<StoredConfiguration, StoreError>;

    /// Configurations for `signature` with `success_rate >= min_success_rate`,
    /// best first (success rate, then usage count, descending).
    async fn search(
        &self,
        signature: &TaskSignature,
        min_success_rate: f64,
    ) -> Result<Vec<StoredConfiguration>, StoreError>;

    /// Every stored configuration, best first.
    async fn list(&self) -> Result<Vec<StoredConfiguration>, StoreError>;
}

/// Ordering shared by backends: success rate desc, usage desc, most recent
/// first, then id for stability.
pub(crate) fn rank(a: &StoredConfiguration, b: &StoredConfiguration) -> Ordering {
    b.success_rate()
        .total_cmp(&a.success_rate())
        .then_with(|| b.usage_count().cmp(&a.usage_count()))
        .then_with(|| b.last_used().cmp(&a.last_used()))
        .then_with(|| a.id.cmp(&b.id))
}

/// Learning store of compositions keyed by task signature.
pub struct ConfigurationStore {
    backend: Arc<dyn ConfigurationPersistence>,
    locks: KeyedLocks,
}

impl std::fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationStore")
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}

impl ConfigurationStore {
    pub fn new(backend: Arc<dyn ConfigurationPersistence>) -> Self {
        Self {
            backend,
            locks: KeyedLocks::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryPersistence::new()))
    }

    /// Opens the backend named by a URL: `memory` or a `sqlite:` URL.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        if url.is_empty() || url == crate::config::MEMORY_STORE_URL {
            return Ok(Self::in_memory());
        }
        let backend = SqlitePersistence::connect(url).await?;
        Ok(Self::new(Arc::new(backend)))
    }

    pub async fn search(
        &self,
        signature: &TaskSignature,
        min_success_rate: f64,
    ) -> Result<Vec<StoredConfiguration>, StoreError> {
        self.backend.search(signature, min_success_rate).await
    }

    pub async fn list(&self) -> Result<Vec<StoredConfiguration>, StoreError> {
        self.backend.list().await
    }

    /// The best configuration meeting both thresholds, if any.
    pub async fn find_reusable(
        &self,
        signature: &TaskSignature,
        min_success_rate: f64,
        min_usage: u64,
    ) -> Result<Option<StoredConfiguration>, StoreError> {
        Ok(self
            .backend
            .search(signature, min_success_rate)
            .await?
            .into_iter()
            .find(|c| c.usage_count() >= min_usage))
    }

    pub async fn load(&self, id: Uuid) -> Result<StoredConfiguration, StoreError> {
        self.backend.load(id).await
    }

    /// Writes a configuration as-is, under its id lock.
    pub async fn save(&self, configuration: &StoredConfiguration) -> Result<(), StoreError> {
        let _guard = self.locks.lock(&id_key(configuration.id)).await;
        self.backend.save(configuration).await
    }

    /// Folds an execution outcome into the configuration the plan came from
    /// (reused plans) or the one matching its composition (fresh plans),
    /// creating it on first use. Returns the updated record.
    pub async fn record_execution(
        &self,
        plan: &ExecutionPlan,
        result: &ExecutionResult,
    ) -> Result<StoredConfiguration, StoreError> {
        let quality = result.quality_score();

        if let Some(id) = plan.reused_configuration() {
            let _guard = self.locks.lock(&id_key(id)).await;
            match self.backend.load(id).await {
                Ok(mut configuration) => {
                    configuration.record_outcome(result.success, quality);
                    self.backend.save(&configuration).await?;
                    tracing::debug!(
                        configuration_id = %id,
                        usage = configuration.usage_count(),
                        success_rate = configuration.success_rate(),
                        "Updated reused configuration"
                    );
                    return Ok(configuration);
                }
                Err(StoreError::NotFound(_)) => {
                    tracing::warn!(
                        configuration_id = %id,
                        "Reused configuration disappeared; recording as fresh"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let _signature_guard = self
            .locks
            .lock(&format!("signature:{}", plan.signature))
            .await;

        let refs = plan.executor_refs();
        let candidate = self
            .backend
            .search(&plan.signature, 0.0)
            .await?
            .into_iter()
            .find(|c| c.same_composition(&refs, plan.pattern))
            .unwrap_or_else(|| StoredConfiguration::from_plan(plan));

        let _id_guard = self.locks.lock(&id_key(candidate.id)).await;
        let mut configuration = match self.backend.load(candidate.id).await {
            Ok(current) => current,
            Err(StoreError::NotFound(_)) => candidate,
            Err(e) => return Err(e),
        };
        configuration.record_outcome(result.success, quality);
        self.backend.save(&configuration).await?;

        tracing::debug!(
            configuration_id = %configuration.id,
            signature = %plan.signature.short(),
            usage = configuration.usage_count(),
            "Recorded execution outcome"
        );
        Ok(configuration)
    }
}

fn id_key(id: Uuid) -> String {
    format!("configuration:{}", id)
}
