use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Map, Value};

use super::{mean_confidence, Estimate, ExecutionRuntime, PatternOutcome, PatternStrategy};
use crate::capability::TierPricing;
use crate::catalog::ExecutorTemplate;
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::patterns::CompositionPattern;
use crate::plan::ExecutionPlan;

/// `A || B || C`: every executor starts at once with the same context; the
/// results are aggregated after all of them finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

#[async_trait]
impl PatternStrategy for ParallelStrategy {
    fn pattern(&self) -> CompositionPattern {
        CompositionPattern::Parallel
    }

    fn validate(&self, _plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        Ok(())
    }

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome {
        let slots = plan
            .executors
            .iter()
            .map(|template| runtime.run_slot(template, &plan.task, context));
        let results = join_all(slots).await;

        let launched = results.len();
        let succeeded = results.iter().filter(|r| r.success).count();
        let fraction = if launched == 0 {
            0.0
        } else {
            succeeded as f64 / launched as f64
        };
        let success = launched > 0 && fraction >= runtime.settings().min_success_fraction;

        let mut outputs = Map::new();
        let mut failures = Map::new();
        for result in &results {
            if result.success {
                outputs.insert(result.executor_id.clone(), result.output.clone());
            } else if !result.timed_out() {
                let message = result.error.as_ref().map(|e| e.message.clone()).unwrap_or_default();
                failures.insert(result.executor_id.clone(), Value::String(message));
            }
        }
        let timed_out: Vec<&str> = results
            .iter()
            .filter(|r| r.timed_out())
            .map(|r| r.executor_id.as_str())
            .collect();

        if !success {
            tracing::warn!(
                plan_id = %plan.id,
                succeeded,
                launched,
                "Parallel plan below success threshold"
            );
        }

        PatternOutcome {
            aggregated_output: json!({
                "results": outputs,
                "failures": failures,
                "timed_out": timed_out,
            }),
            confidence: mean_confidence(&results),
            success,
            results,
        }
    }

    fn estimate(&self, executors: &[ExecutorTemplate], pricing: &TierPricing) -> Estimate {
        executors
            .iter()
            .map(|e| Estimate::for_template(e, pricing))
            .fold(Estimate::default(), Estimate::alongside)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::analyzer::{Complexity, Domain, TaskRequirements};
    use crate::catalog::CostTier;
    use crate::engine::{ExecutionRuntime, PatternSettings};
    use crate::fallback::{FallbackController, FallbackPolicy};
    use std::sync::Arc;
    use std::time::Duration;

    fn plan() -> ExecutionPlan {
        let req = TaskRequirements::new(Domain::Security, Complexity::Moderate, ["work"]);
        ExecutionPlan::new(
            "checks",
            req,
            vec![
                template("a", "work", CostTier::Low),
                template("b", "work", CostTier::Low),
                template("c", "work", CostTier::Low).with_timeout(Duration::from_millis(100)),
            ],
            CompositionPattern::Parallel,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_executor_excluded_from_output() {
        let invoker = Arc::new(ScriptedInvoker::new().reply("c.low", Reply::Hang));
        let runtime = runtime(invoker.clone());
        let outcome = ParallelStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(!outcome.success);
        assert_eq!(outcome.results.len(), 3);
        let outputs = outcome.aggregated_output["results"].as_object().expect("map");
        assert!(outputs.contains_key("a.low"));
        assert!(!outputs.contains_key("c.low"));
        assert!(outcome.aggregated_output["failures"]
            .as_object()
            .map(|m| m.is_empty())
            .unwrap_or(false));
        assert_eq!(outcome.aggregated_output["timed_out"], json!(["c.low"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_fraction_threshold() {
        let invoker = Arc::new(ScriptedInvoker::new().reply("c.low", Reply::Hang));
        let runtime = ExecutionRuntime::new(
            invoker,
            FallbackController::new(FallbackPolicy::default().with_escalate_on_timeout(false)),
            PatternSettings {
                min_success_fraction: 0.6,
                ..PatternSettings::default()
            },
        );
        let outcome = ParallelStrategy.run(&plan(), &TaskContext::new(), &runtime).await;
        assert!(outcome.success);
        assert_eq!(outcome.confidence, Some(0.9));
    }
}
