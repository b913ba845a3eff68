//! Deterministic offline invoker for dry runs and demos.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::{CapabilityInvoker, InvocationOutput, TierPricing, TokenUsage};
use crate::catalog::{CostTier, ExecutorTemplate, CLASSIFICATION_CAPABILITY};
use crate::context::TaskContext;
use crate::error::CapabilityError;

/// Produces canned, tier-dependent results without calling any model.
#[derive(Debug, Clone, Default)]
pub struct SimulatedInvoker {
    pricing: TierPricing,
    latency: Duration,
    failing_tiers: HashSet<CostTier>,
}

impl SimulatedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pricing(mut self, pricing: TierPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Sleeps this long inside every invocation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every invocation at `tier` fails with a transient error.
    pub fn with_failing_tier(mut self, tier: CostTier) -> Self {
        self.failing_tiers.insert(tier);
        self
    }

    fn confidence(tier: CostTier) -> f64 {
        match tier {
            CostTier::Low => 0.65,
            CostTier::Mid => 0.8,
            CostTier::High => 0.92,
        }
    }

    fn classify(input: &str, context: &TaskContext) -> &'static str {
        if let Some(hint) = context.get_str("complexity") {
            match hint.to_lowercase().as_str() {
                "simple" => return "simple",
                "moderate" => return "moderate",
                "complex" => return "complex",
                _ => {}
            }
        }
        match input.split_whitespace().count() {
            0..=12 => "simple",
            13..=40 => "moderate",
            _ => "complex",
        }
    }
}

#[async_trait]
impl CapabilityInvoker for SimulatedInvoker {
    async fn invoke(
        &self,
        template: &ExecutorTemplate,
        input: &str,
        context: &TaskContext,
        tier: CostTier,
    ) -> Result<InvocationOutput, CapabilityError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failing_tiers.contains(&tier) {
            return Err(CapabilityError::Transient(format!(
                "simulated outage at {} tier",
                tier
            )));
        }

        let confidence = Self::confidence(tier);
        let mut output = json!({
            "summary": format!("{} ({}) handled: {}", template.role, tier, input),
            "capabilities": template.capabilities,
            "confidence": confidence,
            "verdict": "agree",
        });
        if template.has_capability(CLASSIFICATION_CAPABILITY) {
            output["difficulty"] = json!(Self::classify(input, context));
        }

        let input_tokens = (input.len() / 4) as u32 + context.to_value().to_string().len() as u32 / 4;
        let output_tokens = match tier {
            CostTier::Low => 200,
            CostTier::Mid => 400,
            CostTier::High => 800,
        }
        .min(template.limits.max_tokens);
        let usage = TokenUsage::new(input_tokens, output_tokens);

        Ok(InvocationOutput::new(output, confidence)
            .with_usage(usage)
            .with_cost(self.pricing.cost(tier, &usage)))
    }
}
