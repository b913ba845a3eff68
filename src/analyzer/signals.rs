//! Lexical signal table mapping task wording to capabilities and domains.

use std::sync::LazyLock;

use regex::Regex;

use super::Domain;

/// One recognized concern: a pattern, the capability it implies and its domain.
pub(super) struct CapabilitySignal {
    pub capability: &'static str,
    pub domain: Domain,
    pub pattern: Regex,
}

const SIGNAL_TABLE: &[(&str, Domain, &str)] = &[
    (
        "security_scan",
        Domain::Security,
        r"(?i)\b(security|vulnerab\w*|cves?|exploits?|secrets?|injection|xss|csrf|authentication|authorization)\b",
    ),
    (
        "dependency_audit",
        Domain::Security,
        r"(?i)\b(dependency audit|audit (the )?dependencies|supply[- ]chain|outdated (packages?|dependencies)|licen[cs]e audit)\b",
    ),
    ("coverage_analysis", Domain::Testing, r"(?i)\bcoverage\b"),
    (
        "test_generation",
        Domain::Testing,
        r"(?i)\b(unit tests?|integration tests?|write tests?|add tests?|test suite|tests? for|regression tests?|test cases?)\b",
    ),
    (
        "doc_check",
        Domain::Documentation,
        r"(?i)\b(documentation|docs?|readme|docstrings?|changelog|api reference)\b",
    ),
    (
        "doc_generation",
        Domain::Documentation,
        r"(?i)\b(write|generate|draft|update)\s+(the\s+)?(docs?|documentation|readme|guide|tutorial|changelog)\b",
    ),
    (
        "architecture_review",
        Domain::ArchitectureReview,
        r"(?i)\b(architecture|architectural|design review|system design|module boundar(y|ies)|coupling)\b",
    ),
    (
        "refactoring",
        Domain::Refactoring,
        r"(?i)\b(refactor\w*|restructur\w*|clean ?up|simplif(y|ies)|deduplicat\w*|technical debt|tech debt)\b",
    ),
    (
        "code_review",
        Domain::Development,
        r"(?i)\b(code review|review (the |this )?(pr|pull request|change|changes|diff|patch)|pull request)\b",
    ),
    (
        "performance_analysis",
        Domain::Performance,
        r"(?i)\b(performance|latency|throughput|profil(e|ing)|benchmarks?|optimi[sz]\w*|slow)\b",
    ),
    (
        "debugging",
        Domain::Debugging,
        r"(?i)\b(bugs?|debug\w*|crash\w*|fix|panics?|stack ?traces?|failing|broken)\b",
    ),
    (
        "code_generation",
        Domain::Development,
        r"(?i)\b(implement\w*|build (a|an|the)|add (a |an )?(new )?(feature|endpoint|command|api)|create (a|an)|new feature|endpoint)\b",
    ),
];

pub(super) static SIGNALS: LazyLock<Vec<CapabilitySignal>> = LazyLock::new(|| {
    SIGNAL_TABLE
        .iter()
        .map(|(capability, domain, pattern)| CapabilitySignal {
            capability: *capability,
            domain: *domain,
            pattern: Regex::new(pattern).expect("Invalid regex in signal table"),
        })
        .collect()
});

/// Words that push complexity up.
pub(super) static ESCALATION_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(complex|entire|across|comprehensive|large|system[- ]wide|migrat\w*|end[- ]to[- ]end|multi[- ]service)\b",
    )
    .expect("Invalid regex for escalation words")
});

/// Words that push complexity down.
pub(super) static SIMPLIFICATION_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(simple|quick|small|minor|typo|trivial|one[- ]line)\b")
        .expect("Invalid regex for simplification words")
});

/// Explicit hints that the concerns can run independently.
pub(super) static PARALLEL_HINTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(in parallel|independent(ly)?|concurrent(ly)?|simultaneous(ly)?)\b")
        .expect("Invalid regex for parallel hints")
});
