//! Executor templates and cost tiers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cost/capability level an executor runs at.
///
/// Ordering follows escalation order: `Low < Mid < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Low,
    Mid,
    High,
}

impl CostTier {
    /// All tiers in escalation order.
    pub fn all() -> [CostTier; 3] {
        [CostTier::Low, CostTier::Mid, CostTier::High]
    }

    /// The next tier up, or `None` when already at the ceiling.
    pub fn next(self) -> Option<CostTier> {
        match self {
            Self::Low => Some(Self::Mid),
            Self::Mid => Some(Self::High),
            Self::High => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
        }
    }
}

impl fmt::Display for CostTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CostTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "mid" | "medium" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            other => Err(format!("unknown cost tier '{}'", other)),
        }
    }
}

/// Resource limits applied to every invocation of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Per-invocation timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum tokens (work units) a single invocation may produce.
    pub max_tokens: u32,
}

impl ResourceLimits {
    pub fn new(timeout: Duration, max_tokens: u32) -> Self {
        Self {
            timeout_ms: timeout.as_millis() as u64,
            max_tokens,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Default limits for a tier: more expensive tiers get more room.
    pub fn for_tier(tier: CostTier) -> Self {
        match tier {
            CostTier::Low => Self::new(Duration::from_secs(60), 2_000),
            CostTier::Mid => Self::new(Duration::from_secs(120), 4_000),
            CostTier::High => Self::new(Duration::from_secs(300), 8_000),
        }
    }
}

/// A capability-tagged executor definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorTemplate {
    /// Unique identifier (e.g. "security_auditor.mid").
    pub id: String,
    /// Role name shared by all tiers of the same executor.
    pub role: String,
    /// Capability tags this executor provides.
    pub capabilities: BTreeSet<String>,
    /// Tier the executor starts at.
    pub cost_tier: CostTier,
    /// Resource limits per invocation.
    pub limits: ResourceLimits,
    /// Human-readable description used in prompts and listings.
    #[serde(default)]
    pub description: String,
}

impl ExecutorTemplate {
    /// Creates a template with tier-default limits and id `role.tier`.
    pub fn new<I, S>(role: impl Into<String>, capabilities: I, cost_tier: CostTier) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let role = role.into();
        Self {
            id: format!("{}.{}", role, cost_tier),
            role,
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            cost_tier,
            limits: ResourceLimits::for_tier(cost_tier),
            description: String::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.limits.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.limits.max_tokens = max_tokens;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
