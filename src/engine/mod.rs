//! Execution engine: runs a plan under its composition pattern.
//!
//! Each pattern is a [`PatternStrategy`] registered in a [`StrategyRegistry`]
//! keyed by [`CompositionPattern`]. The engine validates the plan shape
//! against its strategy before any executor is invoked, runs it, then
//! aggregates cost, duration and quality gates into an [`ExecutionResult`].

mod adaptive;
mod debate;
mod parallel;
mod refinement;
mod sequential;
mod teaching;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

pub use adaptive::{routed_tier, AdaptiveStrategy, ROUTED_TIER_KEY};
pub use debate::{Consensus, DebateStrategy, CONSENSUS_KEY, DEBATE_OPINIONS_KEY};
pub use parallel::ParallelStrategy;
pub use refinement::{RefinementStrategy, INSTRUCTIONS_KEY};
pub use sequential::SequentialStrategy;
pub use teaching::TeachingStrategy;

use crate::capability::{CapabilityInvoker, TierPricing, TokenUsage};
use crate::catalog::ExecutorTemplate;
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::fallback::FallbackController;
use crate::patterns::CompositionPattern;
use crate::plan::{ExecutionPlan, ExecutionResult, ExecutorResult};
use crate::quality::{evaluate_gates, Comparator, QualityMetrics, METRIC_CONFIDENCE};

/// Context key carrying summaries of earlier stages.
pub const PREVIOUS_RESULTS_KEY: &str = "previous_results";
/// Context key carrying the previous stage's full output.
pub const PREVIOUS_OUTPUT_KEY: &str = "previous_output";

/// Pattern-level knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSettings {
    /// Parallel succeeds when at least this fraction of executors succeed.
    pub min_success_fraction: f64,
    /// Teaching accepts the junior's answer at or above this confidence,
    /// unless the plan carries its own confidence gate.
    pub teaching_threshold: f64,
}

impl Default for PatternSettings {
    fn default() -> Self {
        Self {
            min_success_fraction: 1.0,
            teaching_threshold: 0.7,
        }
    }
}

/// Shared services a strategy runs slots with.
pub struct ExecutionRuntime {
    invoker: Arc<dyn CapabilityInvoker>,
    fallback: FallbackController,
    settings: PatternSettings,
}

impl fmt::Debug for ExecutionRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRuntime")
            .field("fallback", &self.fallback)
            .field("settings", &self.settings)
            .finish()
    }
}

impl ExecutionRuntime {
    pub fn new(invoker: Arc<dyn CapabilityInvoker>, fallback: FallbackController, settings: PatternSettings) -> Self {
        Self {
            invoker,
            fallback,
            settings,
        }
    }

    pub fn settings(&self) -> &PatternSettings {
        &self.settings
    }

    /// Runs one executor slot with retry and escalation.
    pub async fn run_slot(&self, template: &ExecutorTemplate, input: &str, context: &TaskContext) -> ExecutorResult {
        self.fallback
            .run_slot(self.invoker.as_ref(), template, input, context)
            .await
    }
}

/// What a strategy reports back to the engine.
#[derive(Debug, Clone)]
pub struct PatternOutcome {
    /// Every slot that ran, in invocation order.
    pub results: Vec<ExecutorResult>,
    pub aggregated_output: Value,
    /// The pattern's own completion rule, before quality gates.
    pub success: bool,
    /// Confidence of the final answer, if one was produced.
    pub confidence: Option<f64>,
}

/// Worst-case cost and duration of a composition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Estimate {
    pub cost: f64,
    pub duration: Duration,
}

impl Estimate {
    /// Cost of a template producing its full token budget, with an equal-sized prompt.
    pub fn for_template(template: &ExecutorTemplate, pricing: &TierPricing) -> Self {
        let tokens = template.limits.max_tokens;
        Self {
            cost: pricing.cost(template.cost_tier, &TokenUsage::new(tokens, tokens)),
            duration: template.limits.timeout(),
        }
    }

    /// One after the other.
    pub fn then(self, other: Estimate) -> Self {
        Self {
            cost: self.cost + other.cost,
            duration: self.duration + other.duration,
        }
    }

    /// Side by side.
    pub fn alongside(self, other: Estimate) -> Self {
        Self {
            cost: self.cost + other.cost,
            duration: self.duration.max(other.duration),
        }
    }
}

/// One composition pattern's validation and execution.
#[async_trait]
pub trait PatternStrategy: Send + Sync {
    fn pattern(&self) -> CompositionPattern;

    /// Checks arity and tier ordering before anything runs.
    fn validate(&self, plan: &ExecutionPlan) -> Result<(), PlanValidationError>;

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome;

    /// Worst case; strictly sequential by default.
    fn estimate(&self, executors: &[ExecutorTemplate], pricing: &TierPricing) -> Estimate {
        executors
            .iter()
            .map(|e| Estimate::for_template(e, pricing))
            .fold(Estimate::default(), Estimate::then)
    }
}

pub(crate) fn invalid_shape(pattern: CompositionPattern, reason: impl Into<String>) -> PlanValidationError {
    PlanValidationError::InvalidShape {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Mean confidence of the successful results, if any.
pub(crate) fn mean_confidence<'a>(results: impl IntoIterator<Item = &'a ExecutorResult>) -> Option<f64> {
    let (sum, count) = results
        .into_iter()
        .filter(|r| r.success)
        .fold((0.0, 0usize), |(sum, count), r| (sum + r.confidence, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Pattern → strategy dispatch table.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: HashMap<CompositionPattern, Arc<dyn PatternStrategy>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut patterns: Vec<_> = self.strategies.keys().collect();
        patterns.sort();
        f.debug_struct("StrategyRegistry")
            .field("patterns", &patterns)
            .finish()
    }
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All six built-in strategies.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SequentialStrategy));
        registry.register(Arc::new(ParallelStrategy));
        registry.register(Arc::new(DebateStrategy));
        registry.register(Arc::new(TeachingStrategy));
        registry.register(Arc::new(RefinementStrategy));
        registry.register(Arc::new(AdaptiveStrategy));
        registry
    }

    /// Registers a strategy, replacing any existing one for its pattern.
    pub fn register(&mut self, strategy: Arc<dyn PatternStrategy>) {
        self.strategies.insert(strategy.pattern(), strategy);
    }

    pub fn get(&self, pattern: CompositionPattern) -> Option<&Arc<dyn PatternStrategy>> {
        self.strategies.get(&pattern)
    }

    pub fn contains(&self, pattern: CompositionPattern) -> bool {
        self.strategies.contains_key(&pattern)
    }
}

/// Validates and runs plans.
#[derive(Debug)]
pub struct ExecutionEngine {
    registry: StrategyRegistry,
    runtime: ExecutionRuntime,
}

impl ExecutionEngine {
    pub fn new(runtime: ExecutionRuntime) -> Self {
        Self {
            registry: StrategyRegistry::standard(),
            runtime,
        }
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    fn strategy(&self, pattern: CompositionPattern) -> Result<&Arc<dyn PatternStrategy>, PlanValidationError> {
        self.registry
            .get(pattern)
            .ok_or_else(|| PlanValidationError::UnsupportedPattern(pattern.to_string()))
    }

    /// Checks that the plan can run at all.
    pub fn validate(&self, plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        if plan.executors.is_empty() {
            return Err(PlanValidationError::EmptyPlan);
        }
        self.strategy(plan.pattern)?.validate(plan)
    }

    pub fn estimate(
        &self,
        pattern: CompositionPattern,
        executors: &[ExecutorTemplate],
        pricing: &TierPricing,
    ) -> Result<Estimate, PlanValidationError> {
        Ok(self.strategy(pattern)?.estimate(executors, pricing))
    }

    /// Runs a plan.
    ///
    /// # Errors
    ///
    /// Only `PlanValidationError`, raised before any executor is invoked.
    /// Executor failures and failed quality gates are reported in the result.
    pub async fn execute(&self, plan: &ExecutionPlan, context: &TaskContext) -> Result<ExecutionResult, PlanValidationError> {
        self.validate(plan)?;
        let strategy = self.strategy(plan.pattern)?;

        tracing::info!(
            plan_id = %plan.id,
            pattern = %plan.pattern,
            executors = plan.executors.len(),
            "Executing plan"
        );

        let started = Instant::now();
        let outcome = strategy.run(plan, context, &self.runtime).await;
        let total_duration = started.elapsed();

        let total_cost: f64 = outcome.results.iter().map(|r| r.cost).sum();
        let succeeded = outcome.results.iter().filter(|r| r.success).count();
        let success_ratio = if outcome.results.is_empty() {
            0.0
        } else {
            succeeded as f64 / outcome.results.len() as f64
        };

        let metrics = QualityMetrics {
            confidence: outcome.confidence,
            success_ratio,
            total_cost,
            duration_secs: total_duration.as_secs_f64(),
        };
        let quality_gates = evaluate_gates(&plan.quality_gates, &metrics);
        let gates_passed = quality_gates.iter().all(|g| g.passed);
        let success = outcome.success && gates_passed;

        if outcome.success && !gates_passed {
            for gate in quality_gates.iter().filter(|g| !g.passed) {
                tracing::warn!(plan_id = %plan.id, gate = %gate, "Quality gate failed");
            }
        }
        tracing::info!(
            plan_id = %plan.id,
            pattern = %plan.pattern,
            success,
            total_cost,
            duration_ms = total_duration.as_millis() as u64,
            "Plan finished"
        );

        Ok(ExecutionResult {
            plan_id: plan.id,
            pattern: plan.pattern,
            executor_results: outcome.results,
            aggregated_output: outcome.aggregated_output,
            success,
            confidence: outcome.confidence,
            total_cost,
            total_duration,
            quality_gates,
        })
    }
}

/// The plan's confidence threshold, if it has an at-least confidence gate.
pub(crate) fn plan_confidence_threshold(plan: &ExecutionPlan) -> Option<f64> {
    plan.quality_gates
        .get(METRIC_CONFIDENCE)
        .filter(|g| matches!(g.comparator, Comparator::Gte | Comparator::Gt))
        .map(|g| g.threshold)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted invoker shared by the strategy tests.

    use super::*;
    use crate::capability::InvocationOutput;
    use crate::catalog::CostTier;
    use crate::error::CapabilityError;
    use std::sync::Mutex;

    /// A scripted reaction for one executor id.
    #[derive(Clone)]
    pub enum Reply {
        Ok { confidence: f64, output: Value },
        Fail(CapabilityError),
        Hang,
    }

    impl Reply {
        pub fn ok(confidence: f64) -> Self {
            Reply::Ok {
                confidence,
                output: serde_json::json!({ "confidence": confidence }),
            }
        }

        pub fn with_output(confidence: f64, output: Value) -> Self {
            Reply::Ok { confidence, output }
        }
    }

    /// Replies by executor id; records every call with the context it saw.
    #[derive(Default)]
    pub struct ScriptedInvoker {
        replies: HashMap<String, Reply>,
        pub calls: Mutex<Vec<(String, CostTier, TaskContext)>>,
    }

    impl ScriptedInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, executor_id: &str, reply: Reply) -> Self {
            self.replies.insert(executor_id.to_string(), reply);
            self
        }

        pub fn called_ids(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .map(|(id, _, _)| id.clone())
                .collect()
        }

        pub fn context_for(&self, executor_id: &str) -> Option<TaskContext> {
            self.calls
                .lock()
                .expect("lock")
                .iter()
                .find(|(id, _, _)| id == executor_id)
                .map(|(_, _, ctx)| ctx.clone())
        }
    }

    #[async_trait]
    impl CapabilityInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            template: &ExecutorTemplate,
            _input: &str,
            context: &TaskContext,
            tier: CostTier,
        ) -> Result<InvocationOutput, CapabilityError> {
            self.calls
                .lock()
                .expect("lock")
                .push((template.id.clone(), tier, context.clone()));
            match self.replies.get(&template.id).cloned().unwrap_or(Reply::ok(0.9)) {
                Reply::Ok { confidence, output } => {
                    Ok(InvocationOutput::new(output, confidence).with_cost(0.01))
                }
                Reply::Fail(e) => Err(e),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(CapabilityError::Permanent("unreachable".into()))
                }
            }
        }
    }

    /// A runtime whose fallback never escalates, so each slot runs once.
    pub fn runtime(invoker: Arc<ScriptedInvoker>) -> ExecutionRuntime {
        use crate::fallback::FallbackPolicy;
        ExecutionRuntime::new(
            invoker,
            FallbackController::new(
                FallbackPolicy::default()
                    .with_max_attempts(1)
                    .with_escalate_on_timeout(false),
            ),
            PatternSettings::default(),
        )
    }

    pub fn template(role: &str, cap: &str, tier: CostTier) -> ExecutorTemplate {
        ExecutorTemplate::new(role, [cap], tier).with_timeout(Duration::from_secs(10))
    }
}
