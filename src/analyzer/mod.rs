//! Task analysis: classify a task description into requirements.
//!
//! Classification is deterministic: identical task text and context always
//! produce identical requirements. Lexical signals (see `signals`) map
//! recognized concerns to capability tags and domains; explicit context hints
//! override inference.
//!
//! Recognized context keys:
//! - `domain`: forces the domain (e.g. "security")
//! - `complexity`: forces the complexity ("simple", "moderate", "complex")
//! - `capabilities`: extra capability tags (list or comma-separated string)
//! - `parallelizable`: marks the concerns as independent
//! - `quality_gates`: object of metric → threshold or `{comparator, threshold}`

mod signals;
mod signature;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use signature::TaskSignature;

use crate::context::TaskContext;
use crate::error::PlanValidationError;
use crate::quality::{QualityGate, METRIC_CONFIDENCE};
use signals::{ESCALATION_WORDS, PARALLEL_HINTS, SIGNALS, SIMPLIFICATION_WORDS};

/// How demanding a task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }

    /// Default minimum confidence for tasks of this complexity.
    pub fn default_min_confidence(&self) -> f64 {
        match self {
            Self::Simple => 0.6,
            Self::Moderate => 0.7,
            Self::Complex => 0.8,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "simple" | "low" | "easy" => Ok(Self::Simple),
            "moderate" | "medium" => Ok(Self::Moderate),
            "complex" | "high" | "hard" => Ok(Self::Complex),
            other => Err(format!("unknown complexity '{}'", other)),
        }
    }
}

/// Problem area a task belongs to.
///
/// Declaration order is the tie-break priority when several domains are
/// equally represented in a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Security,
    ArchitectureReview,
    Refactoring,
    Performance,
    Debugging,
    Testing,
    Documentation,
    Development,
    General,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::ArchitectureReview => "architecture_review",
            Self::Refactoring => "refactoring",
            Self::Performance => "performance",
            Self::Debugging => "debugging",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::Development => "development",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "security" => Ok(Self::Security),
            "architecture_review" | "architecture" => Ok(Self::ArchitectureReview),
            "refactoring" | "refactor" => Ok(Self::Refactoring),
            "performance" => Ok(Self::Performance),
            "debugging" | "debug" => Ok(Self::Debugging),
            "testing" | "test" | "tests" => Ok(Self::Testing),
            "documentation" | "docs" => Ok(Self::Documentation),
            "development" | "dev" => Ok(Self::Development),
            "general" => Ok(Self::General),
            other => Err(format!("unknown domain '{}'", other)),
        }
    }
}

/// What a task needs, as derived by the analyzer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequirements {
    pub complexity: Complexity,
    pub domain: Domain,
    pub required_capabilities: BTreeSet<String>,
    pub quality_gates: BTreeMap<String, QualityGate>,
    /// The concerns are independent and may run concurrently.
    pub parallelizable: bool,
}

impl TaskRequirements {
    /// Builds requirements directly, with complexity-default quality gates.
    pub fn new<I, S>(domain: Domain, complexity: Complexity, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut quality_gates = BTreeMap::new();
        quality_gates.insert(
            METRIC_CONFIDENCE.to_string(),
            QualityGate::at_least(complexity.default_min_confidence()),
        );
        Self {
            complexity,
            domain,
            required_capabilities: capabilities.into_iter().map(Into::into).collect(),
            quality_gates,
            parallelizable: false,
        }
    }

    pub fn with_parallelizable(mut self, parallelizable: bool) -> Self {
        self.parallelizable = parallelizable;
        self
    }

    pub fn with_gate(mut self, metric: impl Into<String>, gate: QualityGate) -> Self {
        self.quality_gates.insert(metric.into(), gate);
        self
    }

    /// Fingerprint of domain + complexity + capability set.
    pub fn signature(&self) -> TaskSignature {
        TaskSignature::compute(self.domain, self.complexity, &self.required_capabilities)
    }
}

/// Classifies task descriptions into [`TaskRequirements`].
#[derive(Debug, Clone, Default)]
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyzes a task description and its context.
    ///
    /// # Errors
    ///
    /// Returns `PlanValidationError::NoCapabilities` when neither the text nor
    /// the context yields a single capability.
    pub fn analyze(
        &self,
        task: &str,
        context: &TaskContext,
    ) -> Result<TaskRequirements, PlanValidationError> {
        let mut capabilities = BTreeSet::new();
        let mut domain_hits: HashMap<Domain, usize> = HashMap::new();

        for signal in SIGNALS.iter() {
            if signal.pattern.is_match(task) {
                capabilities.insert(signal.capability.to_string());
                *domain_hits.entry(signal.domain).or_default() += 1;
            }
        }

        for extra in context.get_string_list("capabilities") {
            let tag = extra.trim().to_lowercase();
            if !tag.is_empty() {
                capabilities.insert(tag);
            }
        }

        if capabilities.is_empty() {
            return Err(PlanValidationError::NoCapabilities);
        }

        let domain = context
            .get_str("domain")
            .and_then(|d| d.parse().ok())
            .unwrap_or_else(|| Self::dominant_domain(&domain_hits));

        let complexity = context
            .get_str("complexity")
            .and_then(|c| c.parse().ok())
            .unwrap_or_else(|| Self::score_complexity(task, capabilities.len()));

        let parallelizable = context.get_bool("parallelizable").unwrap_or_else(|| {
            PARALLEL_HINTS.is_match(task) || domain_hits.len() >= 3
        });

        let mut requirements = TaskRequirements::new(domain, complexity, capabilities)
            .with_parallelizable(parallelizable);

        if let Some(serde_json::Value::Object(gates)) = context.get("quality_gates") {
            for (metric, value) in gates {
                match QualityGate::from_value(value) {
                    Some(gate) => {
                        requirements.quality_gates.insert(metric.clone(), gate);
                    }
                    None => {
                        tracing::warn!(metric = %metric, "Ignoring malformed quality gate in context");
                    }
                }
            }
        }

        tracing::debug!(
            domain = %requirements.domain,
            complexity = %requirements.complexity,
            capabilities = ?requirements.required_capabilities,
            parallelizable = requirements.parallelizable,
            "Analyzed task"
        );

        Ok(requirements)
    }

    fn dominant_domain(hits: &HashMap<Domain, usize>) -> Domain {
        hits.iter()
            // Highest count first, then declaration-order priority.
            .max_by(|(da, ca), (db, cb)| ca.cmp(cb).then_with(|| db.cmp(da)))
            .map(|(domain, _)| *domain)
            .unwrap_or(Domain::General)
    }

    fn score_complexity(task: &str, capability_count: usize) -> Complexity {
        let mut score: i64 = match capability_count {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        };
        score += ESCALATION_WORDS.find_iter(task).count() as i64;
        score -= SIMPLIFICATION_WORDS.find_iter(task).count() as i64;

        match score {
            s if s <= 0 => Complexity::Simple,
            1 | 2 => Complexity::Moderate,
            _ => Complexity::Complex,
        }
    }
}
