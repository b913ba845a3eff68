//! Execution plans: the executors and pattern chosen for one request.

mod result;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use result::{AttemptRecord, ExecutionResult, ExecutorError, ExecutorResult};

use crate::analyzer::{TaskRequirements, TaskSignature};
use crate::catalog::{CostTier, ExecutorTemplate};
use crate::patterns::CompositionPattern;
use crate::quality::QualityGate;

/// Where a plan's composition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanSource {
    /// Built by executor selection and the pattern rule table.
    Fresh,
    /// Copied verbatim from a stored configuration.
    Reused { configuration_id: Uuid },
}

/// Role and tier of a planned executor, as persisted in stored configurations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutorRef {
    pub role: String,
    pub tier: CostTier,
}

impl From<&ExecutorTemplate> for ExecutorRef {
    fn from(template: &ExecutorTemplate) -> Self {
        Self {
            role: template.role.clone(),
            tier: template.cost_tier,
        }
    }
}

/// The executors, pattern and gates chosen for one request.
///
/// Built once per request. Retrying produces a new plan via [`ExecutionPlan::retry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub task: String,
    pub signature: TaskSignature,
    pub requirements: TaskRequirements,
    /// Ordered executors; the meaning of each position depends on the pattern.
    pub executors: Vec<ExecutorTemplate>,
    pub pattern: CompositionPattern,
    /// Copied from the requirements; may be overridden per plan.
    pub quality_gates: BTreeMap<String, QualityGate>,
    pub estimated_cost: f64,
    pub estimated_duration: Duration,
    pub source: PlanSource,
    pub created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    pub fn new(
        task: impl Into<String>,
        requirements: TaskRequirements,
        executors: Vec<ExecutorTemplate>,
        pattern: CompositionPattern,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task: task.into(),
            signature: requirements.signature(),
            quality_gates: requirements.quality_gates.clone(),
            requirements,
            executors,
            pattern,
            estimated_cost: 0.0,
            estimated_duration: Duration::ZERO,
            source: PlanSource::Fresh,
            created_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, source: PlanSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_estimates(mut self, cost: f64, duration: Duration) -> Self {
        self.estimated_cost = cost;
        self.estimated_duration = duration;
        self
    }

    /// Overrides (or adds) a quality gate for this plan only.
    pub fn with_quality_gate(mut self, metric: impl Into<String>, gate: QualityGate) -> Self {
        self.quality_gates.insert(metric.into(), gate);
        self
    }

    /// A fresh copy of this plan with a new identity, for re-execution.
    pub fn retry(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn executor_refs(&self) -> Vec<ExecutorRef> {
        self.executors.iter().map(ExecutorRef::from).collect()
    }

    pub fn executor_ids(&self) -> Vec<&str> {
        self.executors.iter().map(|e| e.id.as_str()).collect()
    }

    pub fn reused_configuration(&self) -> Option<Uuid> {
        match self.source {
            PlanSource::Reused { configuration_id } => Some(configuration_id),
            PlanSource::Fresh => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Complexity, Domain};

    fn plan() -> ExecutionPlan {
        let req = TaskRequirements::new(Domain::Testing, Complexity::Simple, ["test_generation"]);
        ExecutionPlan::new(
            "write tests",
            req,
            vec![ExecutorTemplate::new("tester", ["test_generation"], CostTier::Low)],
            CompositionPattern::Sequential,
        )
    }

    #[test]
    fn test_new_plan_copies_gates_and_signature() {
        let plan = plan();
        assert_eq!(plan.quality_gates, plan.requirements.quality_gates);
        assert_eq!(plan.signature, plan.requirements.signature());
        assert_eq!(plan.source, PlanSource::Fresh);
    }

    #[test]
    fn test_retry_is_a_new_plan() {
        let original = plan();
        let retried = original.retry();
        assert_ne!(original.id, retried.id);
        assert_eq!(original.executor_ids(), retried.executor_ids());
        assert_eq!(original.pattern, retried.pattern);
    }

    #[test]
    fn test_gate_override_leaves_requirements_untouched() {
        let plan = plan().with_quality_gate("confidence", QualityGate::at_least(0.95));
        assert_eq!(
            plan.quality_gates.get("confidence"),
            Some(&QualityGate::at_least(0.95))
        );
        assert_eq!(
            plan.requirements.quality_gates.get("confidence"),
            Some(&QualityGate::at_least(0.6))
        );
    }

    #[test]
    fn test_executor_refs() {
        let refs = plan().executor_refs();
        assert_eq!(
            refs,
            vec![ExecutorRef {
                role: "tester".to_string(),
                tier: CostTier::Low
            }]
        );
    }
}
