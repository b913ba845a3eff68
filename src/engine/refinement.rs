use async_trait::async_trait;
use serde_json::{json, Value};

use super::{invalid_shape, ExecutionRuntime, PatternOutcome, PatternStrategy, PREVIOUS_OUTPUT_KEY};
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::patterns::CompositionPattern;
use crate::plan::{ExecutionPlan, ExecutorResult};

/// Context key telling each stage what it is expected to do.
pub const INSTRUCTIONS_KEY: &str = "instructions";

const STAGES: [(&str, &str); 3] = [
    ("draft", "Produce a first complete draft."),
    ("review", "Review the previous output and improve it."),
    ("polish", "Polish the previous output into the final answer."),
];

/// Draft, review, polish: three stages on non-decreasing tiers, each
/// refining the previous stage's output.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefinementStrategy;

#[async_trait]
impl PatternStrategy for RefinementStrategy {
    fn pattern(&self) -> CompositionPattern {
        CompositionPattern::Refinement
    }

    fn validate(&self, plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        let [draft, review, polish] = plan.executors.as_slice() else {
            return Err(invalid_shape(
                self.pattern(),
                format!("expected exactly 3 executors, got {}", plan.executors.len()),
            ));
        };
        if draft.cost_tier > review.cost_tier || review.cost_tier > polish.cost_tier {
            return Err(invalid_shape(self.pattern(), "tiers must not decrease"));
        }
        if draft.cost_tier == polish.cost_tier {
            return Err(invalid_shape(
                self.pattern(),
                "polish must run on a higher tier than the draft",
            ));
        }
        Ok(())
    }

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome {
        let mut results: Vec<ExecutorResult> = Vec::with_capacity(STAGES.len());
        let mut previous: Option<Value> = None;

        for (template, (stage, instructions)) in plan.executors.iter().zip(STAGES) {
            let mut stage_context = context.clone().with(INSTRUCTIONS_KEY, instructions);
            if let Some(output) = previous.take() {
                stage_context.insert(PREVIOUS_OUTPUT_KEY, output);
            }

            let result = runtime.run_slot(template, &plan.task, &stage_context).await;
            let ok = result.success;
            previous = ok.then(|| result.output.clone());
            results.push(result);

            if !ok {
                tracing::warn!(
                    plan_id = %plan.id,
                    executor_id = %template.id,
                    stage,
                    "Refinement stage failed; aborting"
                );
                break;
            }
        }

        let success = results.len() == STAGES.len() && results.iter().all(|r| r.success);
        let last = results.last().filter(|_| success);
        let stages: Vec<Value> = results
            .iter()
            .zip(STAGES)
            .map(|(r, (stage, _))| json!({ "stage": stage, "executor_id": r.executor_id, "output": r.output }))
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
    use crate::error::CapabilityError;
    use std::sync::Arc;

    fn plan(tiers: [CostTier; 3]) -> ExecutionPlan {
        let req = TaskRequirements::new(Domain::Refactoring, Complexity::Moderate, ["refactoring"]);
        ExecutionPlan::new(
            "clean up the parser",
            req,
            tiers
                .iter()
                .map(|tier| template("refactorer", "refactoring", *tier))
                .collect(),
            CompositionPattern::Refinement,
        )
    }

    #[test]
    fn test_validate_tiers() {
        assert!(RefinementStrategy
            .validate(&plan([CostTier::Low, CostTier::Mid, CostTier::High]))
            .is_ok());
        assert!(RefinementStrategy
            .validate(&plan([CostTier::Low, CostTier::Low, CostTier::Mid]))
            .is_ok());
        assert!(RefinementStrategy
            .validate(&plan([CostTier::High, CostTier::Mid, CostTier::Low]))
            .is_err());
        assert!(RefinementStrategy
            .validate(&plan([CostTier::Mid, CostTier::Mid, CostTier::Mid]))
            .is_err());
    }

    #[tokio::test]
    async fn test_each_stage_refines_previous_output() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("refactorer.low", Reply::with_output(0.6, json!({"text": "draft"})))
                .reply("refactorer.mid", Reply::with_output(0.75, json!({"text": "reviewed"})))
                .reply("refactorer.high", Reply::with_output(0.95, json!({"text": "polished"}))),
        );
        let runtime = runtime(invoker.clone());
        let outcome = RefinementStrategy
            .run(&plan([CostTier::Low, CostTier::Mid, CostTier::High]), &TaskContext::new(), &runtime)
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.confidence, Some(0.95));
        assert_eq!(outcome.aggregated_output["final"]["text"], "polished");

        let draft = invoker.context_for("refactorer.low").expect("draft ran");
        assert!(draft.get(PREVIOUS_OUTPUT_KEY).is_none());
        let polish = invoker.context_for("refactorer.high").expect("polish ran");
        assert_eq!(polish.get(PREVIOUS_OUTPUT_KEY), Some(&json!({"text": "reviewed"})));
        assert_eq!(polish.get_str(INSTRUCTIONS_KEY), Some(STAGES[2].1));
    }

    #[tokio::test]
    async fn test_failed_review_aborts() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("refactorer.mid", Reply::Fail(CapabilityError::Permanent("rejected".into()))),
        );
        let runtime = runtime(invoker.clone());
        let outcome = RefinementStrategy
            .run(&plan([CostTier::Low, CostTier::Mid, CostTier::High]), &TaskContext::new(), &runtime)
            .await;

        assert!(!outcome.success);
        assert_eq!(invoker.called_ids(), vec!["refactorer.low", "refactorer.mid"]);
        assert_eq!(outcome.aggregated_output["final"], Value::Null);
    }
}
