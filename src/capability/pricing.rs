//! Per-tier token pricing.

use serde::{Deserialize, Serialize};

use super::TokenUsage;
use crate::catalog::CostTier;

const TOKENS_PER_MILLION: f64 = 1_000_000.0;

/// Dollar price per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl TokenPrice {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million
            + usage.output_tokens as f64 * self.output_per_million)
            / TOKENS_PER_MILLION
    }
}

/// Price table indexed by tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPricing {
    pub low: TokenPrice,
    pub mid: TokenPrice,
    pub high: TokenPrice,
}

impl Default for TierPricing {
    fn default() -> Self {
        Self {
            low: TokenPrice::new(0.15, 0.60),
            mid: TokenPrice::new(3.0, 15.0),
            high: TokenPrice::new(15.0, 75.0),
        }
    }
}

impl TierPricing {
    pub fn for_tier(&self, tier: CostTier) -> TokenPrice {
        match tier {
            CostTier::Low => self.low,
            CostTier::Mid => self.mid,
            CostTier::High => self.high,
        }
    }

    pub fn cost(&self, tier: CostTier, usage: &TokenUsage) -> f64 {
        self.for_tier(tier).cost(usage)
    }
}
