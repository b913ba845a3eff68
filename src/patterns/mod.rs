//! Composition patterns and the rules that choose between them.
//!
//! A composition pattern is the concurrency/ordering topology a plan runs
//! under. The [`rules`] module holds the ordered, data-driven rule table and
//! [`compose`] shapes a selected executor set into the positional layout each
//! pattern expects.

pub mod compose;
pub mod rules;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use compose::{shape_executors, Composition};
pub use rules::{PatternRule, PatternSelector, RuleCondition};

use crate::error::PlanValidationError;

/// The six supported topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionPattern {
    /// A → B → C, each stage sees the previous results.
    Sequential,
    /// A ‖ B ‖ C with a barrier before aggregation.
    Parallel,
    /// Concurrent opinions, then one synthesizer.
    Debate,
    /// Cheap attempt first, expert only on low confidence.
    Teaching,
    /// Draft → review → polish at increasing tiers.
    Refinement,
    /// Classifier routes to exactly one specialist.
    Adaptive,
}

impl CompositionPattern {
    pub fn all() -> [CompositionPattern; 6] {
        [
            Self::Sequential,
            Self::Parallel,
            Self::Debate,
            Self::Teaching,
            Self::Refinement,
            Self::Adaptive,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Debate => "debate",
            Self::Teaching => "teaching",
            Self::Refinement => "refinement",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for CompositionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompositionPattern {
    type Err = PlanValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            "debate" => Ok(Self::Debate),
            "teaching" => Ok(Self::Teaching),
            "refinement" => Ok(Self::Refinement),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(PlanValidationError::UnsupportedPattern(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_round_trips_through_str() {
        for pattern in CompositionPattern::all() {
            assert_eq!(pattern.as_str().parse::<CompositionPattern>(), Ok(pattern));
        }
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        assert_eq!(
            "swarm".parse::<CompositionPattern>(),
            Err(PlanValidationError::UnsupportedPattern("swarm".to_string()))
        );
    }
}
