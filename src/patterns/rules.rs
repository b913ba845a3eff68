//! Ordered, data-driven pattern selection rules.
//!
//! Rules are evaluated top to bottom and the first match wins. Conditions are
//! plain data so a rule table can be loaded from YAML:
//!
//! ```yaml
//! rules:
//!   - name: independent-concerns
//!     pattern: parallel
//!     condition:
//!       kind: any
//!       conditions:
//!         - kind: parallelizable
//!         - kind: domain_in
//!           domains: [security, architecture_review]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::compose::{shape_executors, Composition};
use super::CompositionPattern;
use crate::analyzer::{Complexity, Domain, TaskRequirements};
use crate::catalog::{CapabilityCatalog, ExecutorTemplate};
use crate::error::{ConfigError, PlanValidationError};

/// A declarative predicate over the task and its selected executors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCondition {
    Always,
    /// The task was marked (or inferred) as independently parallelizable.
    Parallelizable,
    DomainIn {
        domains: Vec<Domain>,
    },
    ComplexityIs {
        complexity: Complexity,
    },
    /// Exactly this many executors were selected.
    ExecutorCount {
        count: usize,
    },
    /// Two or more selected executors carry an identical capability tag.
    SharedCapability,
    All {
        conditions: Vec<RuleCondition>,
    },
    Any {
        conditions: Vec<RuleCondition>,
    },
}

impl RuleCondition {
    pub fn matches(&self, requirements: &TaskRequirements, executors: &[ExecutorTemplate]) -> bool {
        match self {
            Self::Always => true,
            Self::Parallelizable => requirements.parallelizable,
            Self::DomainIn { domains } => domains.contains(&requirements.domain),
            Self::ComplexityIs { complexity } => requirements.complexity == *complexity,
            Self::ExecutorCount { count } => executors.len() == *count,
            Self::SharedCapability => {
                let mut seen: HashMap<&str, usize> = HashMap::new();
                for capability in executors.iter().flat_map(|e| e.capabilities.iter()) {
                    *seen.entry(capability.as_str()).or_default() += 1;
                }
                seen.values().any(|count| *count >= 2)
            }
            Self::All { conditions } => conditions
                .iter()
                .all(|c| c.matches(requirements, executors)),
            Self::Any { conditions } => conditions
                .iter()
                .any(|c| c.matches(requirements, executors)),
        }
    }
}

/// One row of the rule table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub name: String,
    pub condition: RuleCondition,
    pub pattern: CompositionPattern,
}

impl PatternRule {
    pub fn new(name: impl Into<String>, condition: RuleCondition, pattern: CompositionPattern) -> Self {
        Self {
            name: name.into(),
            condition,
            pattern,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<PatternRule>,
}

/// First-match-wins rule engine choosing a composition pattern.
#[derive(Debug, Clone)]
pub struct PatternSelector {
    rules: Vec<PatternRule>,
}

/// Pattern used when no rule matches.
const FALLBACK_PATTERN: CompositionPattern = CompositionPattern::Sequential;

impl Default for PatternSelector {
    fn default() -> Self {
        Self::new(Self::default_rules())
    }
}

impl PatternSelector {
    pub fn new(rules: Vec<PatternRule>) -> Self {
        Self { rules }
    }

    /// Parses a rule table from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let file: RuleFile = serde_yaml::from_str(yaml)?;
        if file.rules.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "rule table must contain at least one rule".to_string(),
            ));
        }
        Ok(Self::new(file.rules))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// The standard table.
    pub fn default_rules() -> Vec<PatternRule> {
        use CompositionPattern::*;
        use RuleCondition as C;

        vec![
            PatternRule::new(
                "independent-concerns",
                C::Any {
                    conditions: vec![
                        C::Parallelizable,
                        C::DomainIn {
                            domains: vec![Domain::Security, Domain::ArchitectureReview],
                        },
                    ],
                },
                Parallel,
            ),
            PatternRule::new(
                "low-stakes-generation",
                C::DomainIn {
                    domains: vec![Domain::Documentation],
                },
                Teaching,
            ),
            PatternRule::new(
                "multi-stage-improvement",
                C::DomainIn {
                    domains: vec![Domain::Refactoring],
                },
                Refinement,
            ),
            PatternRule::new("single-executor", C::ExecutorCount { count: 1 }, Sequential),
            PatternRule::new("duplicate-expertise", C::SharedCapability, Debate),
            PatternRule::new(
                "pipeline",
                C::DomainIn {
                    domains: vec![Domain::Testing],
                },
                Sequential,
            ),
            PatternRule::new(
                "variable-depth",
                C::All {
                    conditions: vec![
                        C::ComplexityIs {
                            complexity: Complexity::Complex,
                        },
                        C::DomainIn {
                            domains: vec![Domain::Development, Domain::Performance, Domain::Debugging],
                        },
                    ],
                },
                Adaptive,
            ),
            PatternRule::new("default", C::Always, Sequential),
        ]
    }

    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Evaluates the table; returns the pattern and the name of the rule that fired.
    pub fn select(
        &self,
        requirements: &TaskRequirements,
        executors: &[ExecutorTemplate],
    ) -> (CompositionPattern, &str) {
        for rule in &self.rules {
            if rule.condition.matches(requirements, executors) {
                tracing::debug!(rule = %rule.name, pattern = %rule.pattern, "Pattern rule matched");
                return (rule.pattern, rule.name.as_str());
            }
        }
        (FALLBACK_PATTERN, "fallback")
    }

    /// Picks the first matching rule whose pattern can be laid out over
    /// `selected` without losing a required capability.
    ///
    /// Rules that match but cannot be shaped are skipped; the fallback
    /// pattern is tried last.
    ///
    /// # Errors
    ///
    /// The shaping error of the fallback pattern when nothing could be shaped.
    pub fn compose(
        &self,
        requirements: &TaskRequirements,
        selected: Vec<ExecutorTemplate>,
        catalog: &CapabilityCatalog,
    ) -> Result<Composition, PlanValidationError> {
        let candidates = self
            .rules
            .iter()
            .filter(|rule| rule.condition.matches(requirements, &selected))
            .map(|rule| (rule.pattern, rule.name.as_str()))
            .chain(std::iter::once((FALLBACK_PATTERN, "fallback")));

        let mut last_error = PlanValidationError::EmptyPlan;
        for (pattern, rule) in candidates {
            match shape_executors(pattern, selected.clone(), requirements, catalog) {
                Ok(executors) => {
                    tracing::debug!(rule, %pattern, "Pattern rule matched");
                    return Ok(Composition {
                        pattern,
                        rule: rule.to_string(),
                        executors,
                    });
                }
                Err(e) => {
                    tracing::debug!(rule, %pattern, error = %e, "Rule matched but cannot be shaped");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CostTier;

    fn exec(role: &str, caps: &[&str]) -> ExecutorTemplate {
        ExecutorTemplate::new(role, caps.iter().copied(), CostTier::Mid)
    }

    fn select(req: &TaskRequirements, executors: &[ExecutorTemplate]) -> CompositionPattern {
        PatternSelector::default().select(req, executors).0
    }

    #[test]
    fn test_parallel_for_security_even_single_executor() {
        let req = TaskRequirements::new(Domain::Security, Complexity::Simple, ["security_scan"]);
        assert_eq!(
            select(&req, &[exec("auditor", &["security_scan"])]),
            CompositionPattern::Parallel
        );
    }

    #[test]
    fn test_parallel_when_marked_independent() {
        let req = TaskRequirements::new(Domain::Testing, Complexity::Moderate, ["a", "b"])
            .with_parallelizable(true);
        assert_eq!(
            select(&req, &[exec("x", &["a"]), exec("y", &["b"])]),
            CompositionPattern::Parallel
        );
    }

    #[test]
    fn test_teaching_and_refinement_domains() {
        let docs = TaskRequirements::new(Domain::Documentation, Complexity::Simple, ["doc_check"]);
        assert_eq!(select(&docs, &[exec("w", &["doc_check"])]), CompositionPattern::Teaching);

        let refactor = TaskRequirements::new(Domain::Refactoring, Complexity::Complex, ["refactoring"]);
        assert_eq!(
            select(&refactor, &[exec("r", &["refactoring"])]),
            CompositionPattern::Refinement
        );
    }

    #[test]
    fn test_single_executor_is_sequential() {
        let req = TaskRequirements::new(Domain::Development, Complexity::Complex, ["code_generation"]);
        assert_eq!(
            select(&req, &[exec("dev", &["code_generation"])]),
            CompositionPattern::Sequential
        );
    }

    #[test]
    fn test_duplicate_expertise_is_debate() {
        let req = TaskRequirements::new(Domain::General, Complexity::Complex, ["architecture_review"]);
        let executors = [
            exec("architect_a", &["architecture_review"]),
            exec("architect_b", &["architecture_review", "design"]),
        ];
        assert_eq!(select(&req, &executors), CompositionPattern::Debate);
    }

    #[test]
    fn test_testing_pipeline_and_adaptive() {
        let testing = TaskRequirements::new(Domain::Testing, Complexity::Moderate, ["a", "b"]);
        assert_eq!(
            select(&testing, &[exec("x", &["a"]), exec("y", &["b"])]),
            CompositionPattern::Sequential
        );

        let complex = TaskRequirements::new(Domain::Debugging, Complexity::Complex, ["a", "b"]);
        assert_eq!(
            select(&complex, &[exec("x", &["a"]), exec("y", &["b"])]),
            CompositionPattern::Adaptive
        );

        let general = TaskRequirements::new(Domain::General, Complexity::Moderate, ["a", "b"]);
        assert_eq!(
            select(&general, &[exec("x", &["a"]), exec("y", &["b"])]),
            CompositionPattern::Sequential
        );
    }

    #[test]
    fn test_rules_load_from_yaml() {
        let yaml = r#"
rules:
  - name: everything-debates
    pattern: debate
    condition: { kind: always }
"#;
        let selector = PatternSelector::from_yaml_str(yaml).expect("valid rules");
        let req = TaskRequirements::new(Domain::Security, Complexity::Simple, ["x"]);
        assert_eq!(
            selector.select(&req, &[exec("x", &["x"])]),
            (CompositionPattern::Debate, "everything-debates")
        );
    }

    #[test]
    fn test_unknown_pattern_in_yaml_rejected() {
        let yaml = "rules:\n  - name: bad\n    pattern: swarm\n    condition: { kind: always }\n";
        assert!(PatternSelector::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_compose_skips_rules_that_would_drop_capabilities() {
        let catalog = CapabilityCatalog::builtin();
        let req = TaskRequirements::new(
            Domain::Refactoring,
            Complexity::Moderate,
            ["refactoring", "test_generation"],
        );
        let selected = vec![
            catalog.get("refactorer.mid").cloned().expect("builtin"),
            catalog.get("test_engineer.mid").cloned().expect("builtin"),
        ];
        let selector = PatternSelector::default();
        assert_eq!(selector.select(&req, &selected).0, CompositionPattern::Refinement);

        let composition = selector.compose(&req, selected, &catalog).expect("compose");
        assert_eq!(composition.pattern, CompositionPattern::Sequential);
        assert_eq!(composition.rule, "default");
        let ids: Vec<&str> = composition.executors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["refactorer.mid", "test_engineer.mid"]);
    }

    #[test]
    fn test_compose_keeps_first_shapeable_rule() {
        let catalog = CapabilityCatalog::builtin();
        let req = TaskRequirements::new(Domain::Refactoring, Complexity::Moderate, ["refactoring"]);
        let selected = vec![catalog.get("refactorer.mid").cloned().expect("builtin")];
        let composition = PatternSelector::default()
            .compose(&req, selected, &catalog)
            .expect("compose");
        assert_eq!(composition.pattern, CompositionPattern::Refinement);
        assert_eq!(composition.rule, "multi-stage-improvement");
        assert_eq!(composition.executors.len(), 3);
    }

    #[test]
    fn test_no_match_falls_back_to_sequential() {
        let selector = PatternSelector::new(vec![PatternRule::new(
            "never",
            RuleCondition::Any { conditions: vec![] },
            CompositionPattern::Debate,
        )]);
        let req = TaskRequirements::new(Domain::Security, Complexity::Simple, ["x"]);
        assert_eq!(
            selector.select(&req, &[]),
            (CompositionPattern::Sequential, "fallback")
        );
    }
}
