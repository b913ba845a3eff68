//! Capability invocation: the seam between the engine and whatever actually
//! does the work for an executor.

mod llm;
mod pricing;
mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use llm::{LlmCapabilityInvoker, TierModels};
pub use pricing::{TierPricing, TokenPrice};
pub use simulated::SimulatedInvoker;

use crate::catalog::{CostTier, ExecutorTemplate};
use crate::context::TaskContext;
use crate::error::CapabilityError;

/// Tokens consumed by one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// What a successful invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutput {
    pub output: Value,
    /// Self-reported confidence in [0, 1].
    pub confidence: f64,
    pub usage: TokenUsage,
    pub cost: f64,
}

impl InvocationOutput {
    pub fn new(output: Value, confidence: f64) -> Self {
        Self {
            output,
            confidence: confidence.clamp(0.0, 1.0),
            usage: TokenUsage::default(),
            cost: 0.0,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }
}

/// Runs one executor template at a given tier.
///
/// Implementations classify their failures: transient errors may be retried
/// or escalated by the fallback controller, permanent ones never are.
/// Timeouts are enforced by the caller.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(
        &self,
        template: &ExecutorTemplate,
        input: &str,
        context: &TaskContext,
        tier: CostTier,
    ) -> Result<InvocationOutput, CapabilityError>;
}
