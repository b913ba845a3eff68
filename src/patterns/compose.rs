//! Shapes a selected executor set into the positional layout a pattern expects.
//!
//! | pattern    | layout                                  |
//! |------------|-----------------------------------------|
//! | sequential | selected executors, unchanged           |
//! | parallel   | selected executors, unchanged           |
//! | debate     | selected opinions + synthesizer         |
//! | teaching   | `[junior, expert]`, junior cheaper      |
//! | refinement | `[draft, review, polish]`, tiers rising |
//! | adaptive   | `[classifier, specialist per tier..]`   |

use std::cmp::Ordering;

use super::CompositionPattern;
use crate::analyzer::TaskRequirements;
use crate::catalog::{
    CapabilityCatalog, CostTier, ExecutorTemplate, CLASSIFICATION_CAPABILITY, SYNTHESIS_CAPABILITY,
};
use crate::error::PlanValidationError;

fn cheapest(a: &&ExecutorTemplate, b: &&ExecutorTemplate) -> Ordering {
    a.cost_tier.cmp(&b.cost_tier).then_with(|| a.id.cmp(&b.id))
}

/// The capability the single-track patterns operate on.
fn primary_capability<'a>(
    requirements: &'a TaskRequirements,
    selected: &'a [ExecutorTemplate],
) -> Option<&'a str> {
    requirements
        .required_capabilities
        .iter()
        .map(String::as_str)
        .find(|cap| selected.iter().any(|e| e.has_capability(cap)))
        .or_else(|| {
            selected
                .first()
                .and_then(|e| e.capabilities.iter().next())
                .map(String::as_str)
        })
}

/// A shaped executor list and the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub pattern: CompositionPattern,
    pub rule: String,
    pub executors: Vec<ExecutorTemplate>,
}

/// Arranges `selected` for `pattern`, pulling extra templates from the catalog.
///
/// # Errors
///
/// `EmptyPlan` when nothing was selected, `UncoveredCapability` when the
/// catalog lacks a synthesizer or classifier, `InvalidShape` when the catalog
/// cannot provide the tier spread a pattern requires or the layout would lose
/// a required capability the selection covered.
pub fn shape_executors(
    pattern: CompositionPattern,
    selected: Vec<ExecutorTemplate>,
    requirements: &TaskRequirements,
    catalog: &CapabilityCatalog,
) -> Result<Vec<ExecutorTemplate>, PlanValidationError> {
    if selected.is_empty() {
        return Err(PlanValidationError::EmptyPlan);
    }

    // Everything the selection covers must survive shaping.
    let must_cover: Vec<String> = requirements
        .required_capabilities
        .iter()
        .filter(|cap| selected.iter().any(|e| e.has_capability(cap)))
        .cloned()
        .collect();

    let shaped = match pattern {
        CompositionPattern::Sequential | CompositionPattern::Parallel => selected,
        CompositionPattern::Debate => shape_debate(selected, catalog)?,
        CompositionPattern::Teaching => shape_teaching(&selected, requirements, catalog)?,
        CompositionPattern::Refinement => shape_refinement(&selected, requirements, catalog)?,
        CompositionPattern::Adaptive => shape_adaptive(&selected, requirements, catalog)?,
    };

    if let Some(dropped) = must_cover
        .iter()
        .find(|cap| !shaped.iter().any(|e| e.has_capability(cap)))
    {
        return Err(PlanValidationError::InvalidShape {
            pattern: pattern.to_string(),
            reason: format!("layout drops required capability '{}'", dropped),
        });
    }
    Ok(shaped)
}

fn shape_debate(
    mut selected: Vec<ExecutorTemplate>,
    catalog: &CapabilityCatalog,
) -> Result<Vec<ExecutorTemplate>, PlanValidationError> {
    let synthesizer = catalog
        .covering(SYNTHESIS_CAPABILITY)
        .filter(|t| t.cost_tier >= CostTier::Mid)
        .min_by(cheapest)
        .or_else(|| catalog.covering(SYNTHESIS_CAPABILITY).max_by(cheapest))
        .ok_or_else(|| PlanValidationError::UncoveredCapability(SYNTHESIS_CAPABILITY.to_string()))?;

    selected.push(synthesizer.clone());
    Ok(selected)
}

fn shape_teaching(
    selected: &[ExecutorTemplate],
    requirements: &TaskRequirements,
    catalog: &CapabilityCatalog,
) -> Result<Vec<ExecutorTemplate>, PlanValidationError> {
    let capability = primary_capability(requirements, selected).ok_or(PlanValidationError::EmptyPlan)?;

    let junior = selected
        .iter()
        .filter(|e| e.has_capability(capability) && e.cost_tier < CostTier::High)
        .min_by(cheapest)
        .or_else(|| catalog.covering(capability).min_by(cheapest))
        .ok_or_else(|| PlanValidationError::UncoveredCapability(capability.to_string()))?;

    let expert = catalog
        .covering(capability)
        .filter(|t| t.cost_tier > junior.cost_tier)
        .min_by(cheapest)
        .ok_or_else(|| PlanValidationError::InvalidShape {
            pattern: CompositionPattern::Teaching.to_string(),
            reason: format!("no template above {} covers '{}'", junior.cost_tier, capability),
        })?;

    Ok(vec![junior.clone(), expert.clone()])
}

fn shape_refinement(
    selected: &[ExecutorTemplate],
    requirements: &TaskRequirements,
    catalog: &CapabilityCatalog,
) -> Result<Vec<ExecutorTemplate>, PlanValidationError> {
    let capability = primary_capability(requirements, selected).ok_or(PlanValidationError::EmptyPlan)?;

    let available: Vec<&ExecutorTemplate> = CostTier::all()
        .into_iter()
        .filter_map(|tier| catalog.covering_at(capability, tier))
        .collect();

    let (draft, polish) = match (available.first(), available.last()) {
        (Some(first), Some(last)) if first.cost_tier < last.cost_tier => (*first, *last),
        _ => {
            return Err(PlanValidationError::InvalidShape {
                pattern: CompositionPattern::Refinement.to_string(),
                reason: format!("'{}' is not offered at two distinct tiers", capability),
            })
        }
    };
    let review = catalog.covering_at(capability, CostTier::Mid).unwrap_or(draft);

    Ok(vec![draft.clone(), review.clone(), polish.clone()])
}

fn shape_adaptive(
    selected: &[ExecutorTemplate],
    requirements: &TaskRequirements,
    catalog: &CapabilityCatalog,
) -> Result<Vec<ExecutorTemplate>, PlanValidationError> {
    let capability = primary_capability(requirements, selected).ok_or(PlanValidationError::EmptyPlan)?;

    let classifier = catalog
        .covering(CLASSIFICATION_CAPABILITY)
        .min_by(cheapest)
        .ok_or_else(|| {
            PlanValidationError::UncoveredCapability(CLASSIFICATION_CAPABILITY.to_string())
        })?;

    let mut shaped = vec![classifier.clone()];
    shaped.extend(
        CostTier::all()
            .into_iter()
            .filter_map(|tier| catalog.covering_at(capability, tier))
            .cloned(),
    );

    if shaped.len() < 2 {
        return Err(PlanValidationError::UncoveredCapability(capability.to_string()));
    }
    Ok(shaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{Complexity, Domain};

    fn catalog() -> CapabilityCatalog {
        CapabilityCatalog::builtin()
    }

    fn ids(executors: &[ExecutorTemplate]) -> Vec<&str> {
        executors.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_sequential_and_parallel_unchanged() {
        let catalog = catalog();
        let req = TaskRequirements::new(Domain::Testing, Complexity::Simple, ["test_generation"]);
        let selected = vec![catalog.get("test_engineer.low").cloned().expect("builtin")];
        for pattern in [CompositionPattern::Sequential, CompositionPattern::Parallel] {
            let shaped = shape_executors(pattern, selected.clone(), &req, &catalog).expect("shape");
            assert_eq!(ids(&shaped), vec!["test_engineer.low"]);
        }
    }

    #[test]
    fn test_empty_selection_rejected() {
        let req = TaskRequirements::new(Domain::General, Complexity::Simple, ["x"]);
        assert_eq!(
            shape_executors(CompositionPattern::Sequential, vec![], &req, &catalog()),
            Err(PlanValidationError::EmptyPlan)
        );
    }

    #[test]
    fn test_debate_appends_synthesizer() {
        let catalog = catalog();
        let req = TaskRequirements::new(Domain::General, Complexity::Complex, ["architecture_review"]);
        let selected = vec![
            catalog.get("architect.mid").cloned().expect("builtin"),
            catalog.get("architect.high").cloned().expect("builtin"),
        ];
        let shaped = shape_executors(CompositionPattern::Debate, selected, &req, &catalog).expect("shape");
        assert_eq!(
            ids(&shaped),
            vec!["architect.mid", "architect.high", "synthesizer.mid"]
        );
    }

    #[test]
    fn test_debate_without_synthesizer_fails() {
        let catalog = CapabilityCatalog::new(vec![ExecutorTemplate::new(
            "a",
            ["x"],
            CostTier::Low,
        )])
        .expect("catalog");
        let req = TaskRequirements::new(Domain::General, Complexity::Simple, ["x"]);
        let selected = catalog.templates().to_vec();
        assert_eq!(
            shape_executors(CompositionPattern::Debate, selected, &req, &catalog),
            Err(PlanValidationError::UncoveredCapability("synthesis".to_string()))
        );
    }

    #[test]
    fn test_teaching_pairs_junior_with_expert() {
        let catalog = catalog();
        let req = TaskRequirements::new(Domain::Documentation, Complexity::Complex, ["doc_check"]);
        let selected = vec![catalog.get("doc_writer.high").cloned().expect("builtin")];
        let shaped = shape_executors(CompositionPattern::Teaching, selected, &req, &catalog).expect("shape");
        assert_eq!(ids(&shaped), vec!["doc_writer.low", "doc_writer.mid"]);
    }

    #[test]
    fn test_refinement_rises_through_tiers() {
        let catalog = catalog();
        let req = TaskRequirements::new(Domain::Refactoring, Complexity::Moderate, ["refactoring"]);
        let selected = vec![catalog.get("refactorer.mid").cloned().expect("builtin")];
        let shaped =
            shape_executors(CompositionPattern::Refinement, selected, &req, &catalog).expect("shape");
        assert_eq!(
            ids(&shaped),
            vec!["refactorer.low", "refactorer.mid", "refactorer.high"]
        );
    }

    #[test]
    fn test_refinement_needs_two_tiers() {
        let catalog = CapabilityCatalog::new(vec![ExecutorTemplate::new(
            "r",
            ["refactoring"],
            CostTier::Mid,
        )])
        .expect("catalog");
        let req = TaskRequirements::new(Domain::Refactoring, Complexity::Moderate, ["refactoring"]);
        let selected = catalog.templates().to_vec();
        assert!(matches!(
            shape_executors(CompositionPattern::Refinement, selected, &req, &catalog),
            Err(PlanValidationError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_single_track_layout_cannot_drop_capabilities() {
        let catalog = catalog();
        let req = TaskRequirements::new(
            Domain::Refactoring,
            Complexity::Moderate,
            ["refactoring", "test_generation"],
        );
        let selected = vec![
            catalog.get("refactorer.mid").cloned().expect("builtin"),
            catalog.get("test_engineer.mid").cloned().expect("builtin"),
        ];
        for pattern in [
            CompositionPattern::Teaching,
            CompositionPattern::Refinement,
            CompositionPattern::Adaptive,
        ] {
            let shaped = shape_executors(pattern, selected.clone(), &req, &catalog);
            assert!(
                matches!(&shaped, Err(PlanValidationError::InvalidShape { reason, .. }) if reason.contains("test_generation")),
                "{} kept {:?}",
                pattern,
                shaped
            );
        }
        let debate = shape_executors(CompositionPattern::Debate, selected, &req, &catalog).expect("shape");
        assert_eq!(
            ids(&debate),
            vec!["refactorer.mid", "test_engineer.mid", "synthesizer.mid"]
        );
    }

    #[test]
    fn test_adaptive_prepends_classifier() {
        let catalog = catalog();
        let req = TaskRequirements::new(Domain::Debugging, Complexity::Complex, ["debugging"]);
        let selected = vec![catalog.get("debugger.high").cloned().expect("builtin")];
        let shaped = shape_executors(CompositionPattern::Adaptive, selected, &req, &catalog).expect("shape");
        assert_eq!(
            ids(&shaped),
            vec!["classifier.low", "debugger.low", "debugger.mid", "debugger.high"]
        );
    }
}
