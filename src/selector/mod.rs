//! Executor selection: cover the required capabilities from the catalog,
//! preferring a proven stored composition when one exists.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analyzer::{Complexity, TaskRequirements, TaskSignature};
use crate::catalog::{CapabilityCatalog, CostTier, ExecutorTemplate};
use crate::error::PlanValidationError;
use crate::store::{ConfigurationStore, StoredConfiguration};

/// Thresholds a stored configuration must meet to be reused.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReusePolicy {
    pub min_success_rate: f64,
    pub min_usage: u64,
}

impl Default for ReusePolicy {
    fn default() -> Self {
        Self {
            min_success_rate: 0.7,
            min_usage: 3,
        }
    }
}

/// Outcome of executor selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub executors: Vec<ExecutorTemplate>,
    /// Set when the executors (and pattern) come from a stored configuration.
    pub reused: Option<StoredConfiguration>,
}

/// Tier a task of this complexity should start at.
pub fn preferred_tier(complexity: Complexity) -> CostTier {
    match complexity {
        Complexity::Simple => CostTier::Low,
        Complexity::Moderate => CostTier::Mid,
        Complexity::Complex => CostTier::High,
    }
}

/// Picks executors for a task.
pub struct ExecutorSelector {
    catalog: Arc<CapabilityCatalog>,
    store: Arc<ConfigurationStore>,
    reuse: ReusePolicy,
}

impl ExecutorSelector {
    pub fn new(catalog: Arc<CapabilityCatalog>, store: Arc<ConfigurationStore>) -> Self {
        Self {
            catalog,
            store,
            reuse: ReusePolicy::default(),
        }
    }

    pub fn with_reuse_policy(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    /// Selects executors, reusing a stored composition when a qualifying one
    /// resolves entirely against the catalog.
    ///
    /// # Errors
    ///
    /// `UncoveredCapability` when no template provides a required capability.
    pub async fn select(
        &self,
        requirements: &TaskRequirements,
        signature: &TaskSignature,
    ) -> Result<Selection, PlanValidationError> {
        if let Some(selection) = self.try_reuse(signature).await {
            return Ok(selection);
        }

        let executors = self.cover(requirements)?;
        tracing::debug!(
            signature = %signature.short(),
            executors = ?executors.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            "Selected executors"
        );
        Ok(Selection {
            executors,
            reused: None,
        })
    }

    async fn try_reuse(&self, signature: &TaskSignature) -> Option<Selection> {
        let stored = match self
            .store
            .find_reusable(signature, self.reuse.min_success_rate, self.reuse.min_usage)
            .await
        {
            Ok(found) => found?,
            Err(e) => {
                tracing::warn!(error = %e, "Configuration store lookup failed; selecting fresh");
                return None;
            }
        };

        let resolved: Option<Vec<ExecutorTemplate>> = stored
            .executors
            .iter()
            .map(|r| self.catalog.find(&r.role, r.tier).cloned())
            .collect();

        match resolved {
            Some(executors) if !executors.is_empty() => {
                tracing::info!(
                    configuration_id = %stored.id,
                    success_rate = stored.success_rate(),
                    usage = stored.usage_count(),
                    "Reusing stored configuration"
                );
                Some(Selection {
                    executors,
                    reused: Some(stored),
                })
            }
            _ => {
                tracing::warn!(
                    configuration_id = %stored.id,
                    "Stored configuration references executors missing from the catalog"
                );
                None
            }
        }
    }

    /// Greedy cover over the sorted required capabilities.
    pub fn cover(&self, requirements: &TaskRequirements) -> Result<Vec<ExecutorTemplate>, PlanValidationError> {
        let preferred = preferred_tier(requirements.complexity);
        let mut uncovered: BTreeSet<&str> = requirements
            .required_capabilities
            .iter()
            .map(String::as_str)
            .collect();
        let mut chosen: Vec<ExecutorTemplate> = Vec::new();

        while let Some(capability) = uncovered.iter().next().copied() {
            let best = self
                .catalog
                .covering(capability)
                .max_by(|a, b| compare_candidates(a, b, preferred, &uncovered))
                .ok_or_else(|| PlanValidationError::UncoveredCapability(capability.to_string()))?;

            uncovered.retain(|cap| !best.has_capability(cap));
            chosen.push(best.clone());
        }

        if requirements.complexity == Complexity::Complex {
            let seconds = self.second_opinions(requirements, &chosen, preferred);
            chosen.extend(seconds);
        }

        Ok(chosen)
    }

    /// For complex tasks, a peer from a different role for every capability
    /// that only one chosen role provides.
    fn second_opinions(
        &self,
        requirements: &TaskRequirements,
        chosen: &[ExecutorTemplate],
        preferred: CostTier,
    ) -> Vec<ExecutorTemplate> {
        let mut seconds: Vec<ExecutorTemplate> = Vec::new();

        for capability in &requirements.required_capabilities {
            let roles: BTreeSet<&str> = chosen
                .iter()
                .chain(seconds.iter())
                .filter(|t| t.has_capability(capability))
                .map(|t| t.role.as_str())
                .collect();
            if roles.len() != 1 {
                continue;
            }

            let target = BTreeSet::from([capability.as_str()]);
            let peer = self
                .catalog
                .covering(capability)
                .filter(|t| !roles.contains(t.role.as_str()))
                .max_by(|a, b| compare_candidates(a, b, preferred, &target))
                .cloned();

            if let Some(peer) = peer {
                tracing::debug!(capability = %capability, executor_id = %peer.id, "Adding second opinion");
                seconds.push(peer);
            }
        }

        seconds
    }
}

/// Greater means better.
fn compare_candidates(
    a: &ExecutorTemplate,
    b: &ExecutorTemplate,
    preferred: CostTier,
    uncovered: &BTreeSet<&str>,
) -> Ordering {
    let covers = |t: &ExecutorTemplate| uncovered.iter().filter(|c| t.has_capability(c)).count();

    tier_fit(a.cost_tier, preferred)
        .cmp(&tier_fit(b.cost_tier, preferred))
        .then_with(|| covers(a).cmp(&covers(b)))
        .then_with(|| b.id.cmp(&a.id))
}

/// At or above the preferred tier beats below it; cheaper wins above,
/// higher wins below.
fn tier_fit(tier: CostTier, preferred: CostTier) -> (bool, i8) {
    let rank = tier as i8;
    if tier >= preferred {
        (true, -rank)
    } else {
        (false, rank)
    }
}
