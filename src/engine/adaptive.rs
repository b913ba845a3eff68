use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{invalid_shape, Estimate, ExecutionRuntime, PatternOutcome, PatternStrategy, PREVIOUS_OUTPUT_KEY};
use crate::analyzer::Complexity;
use crate::capability::TierPricing;
use crate::catalog::{CostTier, ExecutorTemplate, CLASSIFICATION_CAPABILITY};
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::patterns::CompositionPattern;
use crate::plan::{ExecutionPlan, ExecutorResult};

/// Context key carrying the tier the classifier routed to.
pub const ROUTED_TIER_KEY: &str = "routed_tier";

/// Tier the classifier's verdict routes to.
///
/// An explicit `difficulty` in the output wins; otherwise a confident
/// classifier means an easy task. A failed classifier routes to `High`.
pub fn routed_tier(classification: &ExecutorResult) -> CostTier {
    if !classification.success {
        return CostTier::High;
    }
    let difficulty = classification
        .output
        .get("difficulty")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Complexity>().ok());
    match difficulty {
        Some(Complexity::Simple) => CostTier::Low,
        Some(Complexity::Moderate) => CostTier::Mid,
        Some(Complexity::Complex) => CostTier::High,
        None if classification.confidence >= 0.8 => CostTier::Low,
        None if classification.confidence >= 0.5 => CostTier::Mid,
        None => CostTier::High,
    }
}

/// Specialist at `tier`, else the nearest above it, else the highest one.
fn pick_specialist(specialists: &[ExecutorTemplate], tier: CostTier) -> Option<&ExecutorTemplate> {
    specialists
        .iter()
        .filter(|s| s.cost_tier >= tier)
        .min_by_key(|s| s.cost_tier)
        .or_else(|| specialists.iter().max_by_key(|s| s.cost_tier))
}

/// A classifier decides how hard the task is; exactly one specialist at
/// the matching tier then answers.
///
/// Executors: `[classifier, specialist_1, .., specialist_n]`, specialists on
/// distinct tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveStrategy;

#[async_trait]
impl PatternStrategy for AdaptiveStrategy {
    fn pattern(&self) -> CompositionPattern {
        CompositionPattern::Adaptive
    }

    fn validate(&self, plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        let Some((classifier, specialists)) = plan.executors.split_first() else {
            return Err(invalid_shape(self.pattern(), "no executors"));
        };
        if !classifier.has_capability(CLASSIFICATION_CAPABILITY) {
            return Err(invalid_shape(
                self.pattern(),
                format!("first executor must provide '{}'", CLASSIFICATION_CAPABILITY),
            ));
        }
        if specialists.is_empty() {
            return Err(invalid_shape(self.pattern(), "needs at least one specialist"));
        }
        let tiers: BTreeSet<CostTier> = specialists.iter().map(|s| s.cost_tier).collect();
        if tiers.len() != specialists.len() {
            return Err(invalid_shape(self.pattern(), "specialists must sit on distinct tiers"));
        }
        Ok(())
    }

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome {
        let Some((classifier, specialists)) = plan.executors.split_first() else {
            return PatternOutcome {
                results: Vec::new(),
                aggregated_output: Value::Null,
                success: false,
                confidence: None,
            };
        };

        let classification = runtime.run_slot(classifier, &plan.task, context).await;
        let tier = routed_tier(&classification);

        let Some(specialist) = pick_specialist(specialists, tier) else {
            return PatternOutcome {
                results: vec![classification],
                aggregated_output: json!({ "routed_tier": tier, "specialist": Value::Null, "final": Value::Null }),
                success: false,
                confidence: None,
            };
        };

        tracing::info!(
            plan_id = %plan.id,
            classifier_success = classification.success,
            routed_tier = %tier,
            specialist = %specialist.id,
            "Adaptive routing"
        );

        let mut specialist_context = context.clone().with(ROUTED_TIER_KEY, tier.as_str());
        if classification.success {
            specialist_context.insert(PREVIOUS_OUTPUT_KEY, classification.output.clone());
        }
        let answer = runtime.run_slot(specialist, &plan.task, &specialist_context).await;

        let output = json!({
            "routed_tier": tier,
            "specialist": specialist.id,
            "final": answer.output,
        });
        let success = answer.success;
        let confidence = answer.success.then_some(answer.confidence);

        PatternOutcome {
            results: vec![classification, answer],
            aggregated_output: output,
            success,
            confidence,
        }
    }

    /// Classifier, then the most expensive specialist it could route to.
    fn estimate(&self, executors: &[ExecutorTemplate], pricing: &TierPricing) -> Estimate {
        let Some((classifier, specialists)) = executors.split_first() else {
            return Estimate::default();
        };
        let worst = specialists
            .iter()
            .map(|s| Estimate::for_template(s, pricing))
            .max_by(|a, b| a.cost.total_cmp(&b.cost))
            .unwrap_or_default();
        Estimate::for_template(classifier, pricing).then(worst)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::analyzer::{Domain, TaskRequirements};
    use crate::error::CapabilityError;
    use std::sync::Arc;

    fn plan() -> ExecutionPlan {
        let req = TaskRequirements::new(Domain::Debugging, Complexity::Moderate, ["debugging"]);
        ExecutionPlan::new(
            "find the leak",
            req,
            vec![
                template("classifier", CLASSIFICATION_CAPABILITY, CostTier::Low),
                template("debugger", "debugging", CostTier::Low),
                template("debugger", "debugging", CostTier::Mid),
                template("debugger", "debugging", CostTier::High),
            ],
            CompositionPattern::Adaptive,
        )
    }

    #[test]
    fn test_validate_shape() {
        assert!(AdaptiveStrategy.validate(&plan()).is_ok());

        let mut no_classifier = plan();
        no_classifier.executors.remove(0);
        assert!(AdaptiveStrategy.validate(&no_classifier).is_err());

        let mut duplicate = plan();
        duplicate.executors[2] = template("debugger", "debugging", CostTier::Low);
        assert!(AdaptiveStrategy.validate(&duplicate).is_err());
    }

    #[test]
    fn test_routed_tier_from_confidence() {
        let classifier = template("classifier", CLASSIFICATION_CAPABILITY, CostTier::Low);
        let verdict = |confidence: f64| {
            routed_tier(&ExecutorResult::succeeded(&classifier, CostTier::Low, json!({}), confidence, 0.0))
        };
        assert_eq!(verdict(0.9), CostTier::Low);
        assert_eq!(verdict(0.6), CostTier::Mid);
        assert_eq!(verdict(0.2), CostTier::High);

        let explicit = ExecutorResult::succeeded(
            &classifier,
            CostTier::Low,
            json!({"difficulty": "complex"}),
            0.95,
            0.0,
        );
        assert_eq!(routed_tier(&explicit), CostTier::High);
    }

    #[test]
    fn test_pick_specialist_prefers_nearest_above() {
        let specialists = vec![
            template("debugger", "debugging", CostTier::Mid),
            template("debugger", "debugging", CostTier::High),
        ];
        assert_eq!(pick_specialist(&specialists, CostTier::Low).map(|s| s.cost_tier), Some(CostTier::Mid));

        let only_low = vec![template("debugger", "debugging", CostTier::Low)];
        assert_eq!(pick_specialist(&only_low, CostTier::High).map(|s| s.cost_tier), Some(CostTier::Low));
    }

    #[tokio::test]
    async fn test_only_routed_specialist_runs() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("classifier.low", Reply::with_output(0.9, json!({"difficulty": "moderate"}))),
        );
        let runtime = runtime(invoker.clone());
        let outcome = AdaptiveStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(outcome.success);
        assert_eq!(invoker.called_ids(), vec!["classifier.low", "debugger.mid"]);
        assert_eq!(outcome.aggregated_output["routed_tier"], "mid");
        assert_eq!(outcome.results.len(), 2);
        let seen = invoker.context_for("debugger.mid").expect("specialist ran");
        assert_eq!(seen.get_str(ROUTED_TIER_KEY), Some("mid"));
    }

    #[tokio::test]
    async fn test_failed_classifier_routes_high() {
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .reply("classifier.low", Reply::Fail(CapabilityError::Permanent("down".into()))),
        );
        let runtime = runtime(invoker.clone());
        let outcome = AdaptiveStrategy.run(&plan(), &TaskContext::new(), &runtime).await;

        assert!(outcome.success);
        assert_eq!(invoker.called_ids(), vec!["classifier.low", "debugger.high"]);
        assert!(!outcome.results[0].success);
    }
}
