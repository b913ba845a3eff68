use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};

use super::{invalid_shape, Estimate, ExecutionRuntime, PatternOutcome, PatternStrategy};
use crate::capability::TierPricing;
use crate::catalog::{ExecutorTemplate, SYNTHESIS_CAPABILITY};
use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::patterns::CompositionPattern;
use crate::plan::{ExecutionPlan, ExecutorResult};

/// Context key carrying the opinions handed to the synthesizer.
pub const DEBATE_OPINIONS_KEY: &str = "debate_opinions";
/// Context key carrying the consensus block handed to the synthesizer.
pub const CONSENSUS_KEY: &str = "consensus";

/// Confidence at or above which an opinion without a verdict counts as "agree".
const AGREE_CONFIDENCE: f64 = 0.5;

/// Tally of the opinion round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consensus {
    /// Verdict → number of votes.
    pub votes: BTreeMap<String, usize>,
    pub participants: usize,
    pub succeeded: usize,
    pub average_confidence: f64,
    /// The verdict held by a strict majority of participants, if any.
    pub majority: Option<String>,
}

impl Consensus {
    pub fn tally(opinions: &[ExecutorResult]) -> Self {
        let mut votes: BTreeMap<String, usize> = BTreeMap::new();
        let mut confidence_sum = 0.0;
        let mut succeeded = 0usize;

        for opinion in opinions.iter().filter(|o| o.success) {
            succeeded += 1;
            confidence_sum += opinion.confidence;
            *votes.entry(verdict(opinion)).or_default() += 1;
        }

        let participants = opinions.len();
        let majority = votes
            .iter()
            .find(|(_, count)| **count * 2 > participants)
            .map(|(verdict, _)| verdict.clone());

        Self {
            votes,
            participants,
            succeeded,
            average_confidence: if succeeded > 0 {
                confidence_sum / succeeded as f64
            } else {
                0.0
            },
            majority,
        }
    }

    /// A strict majority of the opinions completed.
    pub fn quorum(&self) -> bool {
        self.succeeded * 2 > self.participants
    }
}

fn verdict(opinion: &ExecutorResult) -> String {
    match opinion.output.get("verdict").and_then(Value::as_str) {
        Some(v) if !v.trim().is_empty() => v.trim().to_lowercase(),
        _ if opinion.confidence >= AGREE_CONFIDENCE => "agree".to_string(),
        _ => "disagree".to_string(),
    }
}

/// Opinions run concurrently, then one synthesizer reconciles them.
///
/// Executors: `[opinion_1, .., opinion_n, synthesizer]` with `n >= 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebateStrategy;

#[async_trait]
impl PatternStrategy for DebateStrategy {
    fn pattern(&self) -> CompositionPattern {
        CompositionPattern::Debate
    }

    fn validate(&self, plan: &ExecutionPlan) -> Result<(), PlanValidationError> {
        if plan.executors.len() < 2 {
            return Err(invalid_shape(
                self.pattern(),
                "needs at least one opinion and a synthesizer",
            ));
        }
        match plan.executors.last() {
            Some(last) if last.has_capability(SYNTHESIS_CAPABILITY) => Ok(()),
            _ => Err(invalid_shape(
                self.pattern(),
                format!("last executor must provide '{}'", SYNTHESIS_CAPABILITY),
            )),
        }
    }

    async fn run(&self, plan: &ExecutionPlan, context: &TaskContext, runtime: &ExecutionRuntime) -> PatternOutcome {
        let (synthesizer, debaters) = match plan.executors.split_last() {
            Some(split) => split,
            None => {
                return PatternOutcome {
                    results: Vec::new(),
                    aggregated_output: Value::Null,
                    success: false,
                    confidence: None,
                }
            }
        };

        let opinions = join_all(
            debaters
                .iter()
                .map(|template| runtime.run_slot(template, &plan.task, context)),
        )
        .await;
        let consensus = Consensus::tally(&opinions);

        tracing::debug!(
            plan_id = %plan.id,
            participants = consensus.participants,
            succeeded = consensus.succeeded,
            majority = ?consensus.majority,
            "Debate opinions collected"
        );

        let consensus_value = serde_json::to_value(&consensus).unwrap_or(Value::Null);
        let mut results = opinions;

        if consensus.succeeded == 0 {
            tracing::warn!(plan_id = %plan.id, "No opinion succeeded; skipping synthesis");
            return PatternOutcome {
                results,
                aggregated_output: json!({ "synthesis": Value::Null, "consensus": consensus_value }),
                success: false,
                confidence: None,
            };
        }

        let opinion_summaries: Vec<Value> = results
            .iter()
            .filter(|r| r.success)
            .map(ExecutorResult::summary)
            .collect();
        let synthesis_context = context
            .clone()
            .with(DEBATE_OPINIONS_KEY, opinion_summaries)
            .with(CONSENSUS_KEY, consensus_value.clone());

        let synthesis = runtime.run_slot(synthesizer, &plan.task, &synthesis_context).await;
        let success = consensus.quorum() && synthesis.success;
        let confidence = synthesis.success.then_some(synthesis.confidence);
        let synthesis_output = synthesis.output.clone();
        results.push(synthesis);

        PatternOutcome {
            results,
            aggregated_output: json!({
                "synthesis": synthesis_output,
                "consensus": consensus_value,
            }),
            success,
            confidence,
        }
    }

    fn estimate(&self, executors: &[ExecutorTemplate], pricing: &TierPricing) -> Estimate {
        match executors.split_last() {
            Some((synthesizer, debaters)) => debaters
                .iter()
                .map(|e| Estimate::for_template(e, pricing))
                .fold(Estimate::default(), Estimate::alongside)
                .then(Estimate::for_template(synthesizer, pricing)),
            None => Estimate::default(),
        }
    }
}
