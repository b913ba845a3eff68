use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    invalid_shape, plan_confidence_threshold, ExecutionRuntime, PatternOutcome, PatternStrategy,
    PREVIOUS_OUTPUT_KEY,
};
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::patterns::CompositionPattern;
use crate::plan::ExecutionPlan;

const JUNIOR_SUCCESS: &str = "junior_success";
const EXPERT_TAKEOVER: &str = "expert_takeover";

/// A cheap junior answers first; the expert is only called when the junior
/// fails or lands below the confidence threshold.
///
/// Executors: `[junior, expert]` with `junior.tier < expert.tier`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TeachingStrategy;

#[async_trait]
impl PatternStrategy for TeachingStrategy {
    fn pattern(&self) -> CompositionPattern {
        CompositionPattern::Teaching
    }

    fn validate(&self, plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        match plan.executors.as_slice() {
            [junior, expert] if junior.cost_tier < expert.cost_tier => Ok(()),
            [_, _] => Err(invalid_shape(
                self.pattern(),
                "junior must sit on a cheaper tier than the expert",
            )),
            other => Err(invalid_shape(
                self.pattern(),
                format!("expected exactly 2 executors, got {}", other.len()),
            )),
        }
    }

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome {
        let (junior, expert) = match plan.executors.as_slice() {
            [junior, expert] => (junior, expert),
            _ => {
                return PatternOutcome {
                    results: Vec::new(),
                    aggregated_output: Value::Null,
                    success: false,
                    confidence: None,
                }
            }
        };
        let threshold = plan_confidence_threshold(plan).unwrap_or(runtime.settings().teaching_threshold);

        let first = runtime.run_slot(junior, &plan.task, context).await;
        if first.success && first.confidence >= threshold {
            tracing::debug!(
                plan_id = %plan.id,
                confidence = first.confidence,
                threshold,
                "Junior answer accepted"
            );
            let output = json!({ "outcome": JUNIOR_SUCCESS, "final": first.output });
            let confidence = Some(first.confidence);
            return PatternOutcome {
                results: vec![first],
                aggregated_output: output,
                success: true,
                confidence,
            };
        }

        tracing::info!(
            plan_id = %plan.id,
            junior_success = first.success,
            confidence = first.confidence,
            threshold,
            "Expert taking over"
        );
        let mut expert_context = context.clone();
        if first.success {
            expert_context.insert(PREVIOUS_OUTPUT_KEY, first.output.clone());
        }
        let second = runtime.run_slot(expert, &plan.task, &expert_context).await;

        let output = json!({
            "outcome": EXPERT_TAKEOVER,
            "final": second.output,
        });
        let success = second.success;
        let confidence = second.success.then_some(second.confidence);
        PatternOutcome {
            results: vec![first, second],
            aggregated_output: output,
            success,
            confidence,
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
    use crate::quality::{Comparator, QualityGate};
    use std::sync::Arc;

    fn plan() -> ExecutionPlan {
        let req = TaskRequirements::new(Domain::Documentation, Complexity::Simple, ["documentation"]);
        ExecutionPlan::new(
            "document the module",
            req,
            vec![
                template("doc_writer", "documentation", CostTier::Low),
                template("doc_writer", "documentation", CostTier::Mid),
            ],
            CompositionPattern::Teaching,
        )
    }

    #[test]
    fn test_validate_tier_order() {
        assert!(TeachingStrategy.validate(&plan()).is_ok());

        let mut reversed = plan();
        reversed.executors.reverse();
        assert!(TeachingStrategy.validate(&reversed).is_err());

        let mut single = plan();
        single.executors.truncate(1);
        assert!(TeachingStrategy.validate(&single).is_err());
    }

    #[tokio::test]
    async fn test_confident_junior_skips_expert() {
        let invoker = Arc::new(ScriptedInvoker::new().reply("doc_writer.low", Reply::ok(0.85)));
        let runtime = runtime(invoker.clone());
        let outcome = TeachingStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(outcome.success);
        assert_eq!(invoker.called_ids(), vec!["doc_writer.low"]);
        assert_eq!(outcome.aggregated_output["outcome"], JUNIOR_SUCCESS);
        assert_eq!(outcome.confidence, Some(0.85));
    }

    #[tokio::test]
    async fn test_low_confidence_triggers_takeover() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("doc_writer.low", Reply::ok(0.4))
                .reply("doc_writer.mid", Reply::ok(0.9)),
        );
        let runtime = runtime(invoker.clone());
        let outcome = TeachingStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(outcome.success);
        assert_eq!(invoker.called_ids(), vec!["doc_writer.low", "doc_writer.mid"]);
        assert_eq!(outcome.aggregated_output["outcome"], EXPERT_TAKEOVER);
        let seen = invoker.context_for("doc_writer.mid").expect("expert ran");
        assert!(seen.get(PREVIOUS_OUTPUT_KEY).is_some());
    }

    #[tokio::test]
    async fn test_plan_gate_overrides_default_threshold() {
        let invoker = Arc::new(ScriptedInvoker::new().reply("doc_writer.low", Reply::ok(0.85)));
        let runtime = runtime(invoker.clone());
        let strict = plan().with_quality_gate("confidence", QualityGate::at_least(0.95));
        TeachingStrategy.run(&strict, &TaskContext::new(), &runtime).await;

        assert_eq!(invoker.called_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_upper_bound_confidence_gate_is_not_a_threshold() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("doc_writer.low", Reply::ok(0.65))
                .reply("doc_writer.mid", Reply::ok(0.9)),
        );
        let runtime = runtime(invoker.clone());
        let capped = plan().with_quality_gate("confidence", QualityGate::new(Comparator::Lte, 0.3));
        let outcome = TeachingStrategy.run(&capped, &TaskContext::new(), &runtime).await;

        assert_eq!(invoker.called_ids(), vec!["doc_writer.low", "doc_writer.mid"]);
        assert_eq!(outcome.aggregated_output["outcome"], EXPERT_TAKEOVER);
    }

    #[tokio::test]
    async fn test_failed_junior_hands_over_without_output() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("doc_writer.low", Reply::Fail(CapabilityError::Permanent("no".into()))),
        );
        let runtime = runtime(invoker.clone());
        let outcome = TeachingStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 2);
        let seen = invoker.context_for("doc_writer.mid").expect("expert ran");
        assert!(seen.get(PREVIOUS_OUTPUT_KEY).is_none());
    }
}
