//! Built-in executor table.

use super::template::{CostTier, ExecutorTemplate};
use super::{CLASSIFICATION_CAPABILITY, SYNTHESIS_CAPABILITY};

const ALL_TIERS: &[CostTier] = &[CostTier::Low, CostTier::Mid, CostTier::High];
const UPPER_TIERS: &[CostTier] = &[CostTier::Mid, CostTier::High];

/// (role, capabilities, tiers, description)
const ROLES: &[(&str, &[&str], &[CostTier], &str)] = &[
    (
        "security_auditor",
        &["security_scan", "dependency_audit"],
        ALL_TIERS,
        "Finds vulnerabilities, leaked secrets and risky dependencies",
    ),
    (
        "coverage_analyst",
        &["coverage_analysis"],
        ALL_TIERS,
        "Measures test coverage and reports untested paths",
    ),
    (
        "test_engineer",
        &["test_generation"],
        ALL_TIERS,
        "Designs and writes unit and integration tests",
    ),
    (
        "doc_writer",
        &["doc_check", "doc_generation"],
        ALL_TIERS,
        "Checks and writes documentation",
    ),
    (
        "architect",
        &["architecture_review"],
        UPPER_TIERS,
        "Reviews system structure, boundaries and coupling",
    ),
    (
        "refactorer",
        &["refactoring"],
        ALL_TIERS,
        "Restructures code without changing behavior",
    ),
    (
        "code_reviewer",
        &["code_review"],
        ALL_TIERS,
        "Reviews changes for correctness and style",
    ),
    (
        "principal_reviewer",
        &["code_review"],
        UPPER_TIERS,
        "Reviews risky changes for design fit and long-term maintainability",
    ),
    (
        "performance_engineer",
        &["performance_analysis"],
        UPPER_TIERS,
        "Profiles hot paths and proposes optimizations",
    ),
    (
        "debugger",
        &["debugging"],
        ALL_TIERS,
        "Reproduces and isolates defects",
    ),
    (
        "developer",
        &["code_generation"],
        ALL_TIERS,
        "Implements features and fixes",
    ),
    (
        "synthesizer",
        &[SYNTHESIS_CAPABILITY],
        UPPER_TIERS,
        "Merges competing opinions into one recommendation",
    ),
    (
        "classifier",
        &[CLASSIFICATION_CAPABILITY],
        &[CostTier::Low],
        "Estimates task difficulty from early signals",
    ),
];

pub(super) fn templates() -> Vec<ExecutorTemplate> {
    ROLES
        .iter()
        .flat_map(|(role, capabilities, tiers, description)| {
            tiers.iter().map(move |tier| {
                ExecutorTemplate::new(*role, capabilities.iter().copied(), *tier)
                    .with_description(*description)
            })
        })
        .collect()
}
