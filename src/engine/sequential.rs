use async_trait::async_trait;
use serde_json::{json, Value};

use super::{ExecutionRuntime, PatternOutcome, PatternStrategy, PREVIOUS_RESULTS_KEY};
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::patterns::CompositionPattern;
use crate::plan::{ExecutionPlan, ExecutorResult};

/// `A -> B -> C`: each stage sees the summaries of the stages before it.
/// The first failed stage stops the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

#[async_trait]
impl PatternStrategy for SequentialStrategy {
    fn pattern(&self) -> CompositionPattern {
        CompositionPattern::Sequential
    }

    fn validate(&self, _plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        Ok(())
    }

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome {
        let mut results: Vec<ExecutorResult> = Vec::with_capacity(plan.executors.len());
        let mut success = true;

        for template in &plan.executors {
            let summaries: Vec<Value> = results.iter().map(ExecutorResult::summary).collect();
            let stage_context = context.clone().with(PREVIOUS_RESULTS_KEY, summaries);

            let result = runtime.run_slot(template, &plan.task, &stage_context).await;
            let failed = !result.success;
            results.push(result);

            if failed {
                tracing::warn!(
                    plan_id = %plan.id,
                    executor_id = %template.id,
                    "Sequential stage failed; skipping remaining stages"
                );
                success = false;
                break;
            }
        }

        let last = results.last().filter(|_| success);
        let stages: Vec<Value> = results
            .iter()
            .map(|r| json!({ "executor_id": r.executor_id, "output": r.output }))
            .collect();

        PatternOutcome {
            aggregated_output: json!({
                "final": last.map(|r| r.output.clone()).unwrap_or(Value::Null),
                "stages": stages,
            }),
            confidence: last.map(|r| r.confidence),
            success,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::analyzer::{Complexity, Domain, TaskRequirements};
    use crate::catalog::CostTier;
    use crate::error::{CapabilityError, ErrorKind};
    use std::sync::Arc;

    fn plan() -> ExecutionPlan {
        let req = TaskRequirements::new(Domain::Testing, Complexity::Simple, ["work"]);
        ExecutionPlan::new(
            "pipeline",
            req,
            vec![
                template("a", "work", CostTier::Low),
                template("b", "work", CostTier::Low),
                template("c", "work", CostTier::Low),
            ],
            CompositionPattern::Sequential,
        )
    }

    #[tokio::test]
    async fn test_stages_see_previous_results() {
        let invoker = Arc::new(ScriptedInvoker::new());
        let runtime = runtime(invoker.clone());
        let outcome = SequentialStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(outcome.success);
        assert_eq!(invoker.called_ids(), vec!["a.low", "b.low", "c.low"]);
        let third = invoker.context_for("c.low").expect("c ran");
        let previous = third.get(PREVIOUS_RESULTS_KEY).and_then(Value::as_array).expect("summaries");
        assert_eq!(previous.len(), 2);
        assert_eq!(previous[1]["executor_id"], "b.low");
        assert_eq!(outcome.aggregated_output["stages"].as_array().map(Vec::len), Some(3));
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline() {
        let invoker = Arc::new(
            ScriptedInvoker::new().reply("b.low", Reply::Fail(CapabilityError::Permanent("bad".into()))),
        );
        let runtime = runtime(invoker.clone());
        let outcome = SequentialStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(!outcome.success);
        assert_eq!(invoker.called_ids(), vec!["a.low", "b.low"]);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(
            outcome.results[1].error_kind(),
            Some(ErrorKind::PermanentCapabilityError)
        );
        assert_eq!(outcome.aggregated_output["final"], Value::Null);
        assert_eq!(outcome.confidence, None);
    }
}
