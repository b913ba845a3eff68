//! Quality gates: named metric thresholds checked against execution results.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metric: mean confidence of the executors that produced the final answer.
pub const METRIC_CONFIDENCE: &str = "confidence";
/// Metric: fraction of invoked executors that succeeded.
pub const METRIC_SUCCESS_RATIO: &str = "success_ratio";
/// Metric: total cost across every attempt.
pub const METRIC_TOTAL_COST: &str = "total_cost";
/// Metric: wall-clock duration in seconds.
pub const METRIC_DURATION_SECS: &str = "duration_secs";

/// How an observed metric is compared with its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Comparator {
    pub fn check(&self, observed: f64, threshold: f64) -> bool {
        match self {
            Self::Gte => observed >= threshold,
            Self::Gt => observed > threshold,
            Self::Lte => observed <= threshold,
            Self::Lt => observed < threshold,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Gte => ">=",
            Self::Gt => ">",
            Self::Lte => "<=",
            Self::Lt => "<",
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A threshold a metric must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    pub comparator: Comparator,
    pub threshold: f64,
}

impl QualityGate {
    pub fn new(comparator: Comparator, threshold: f64) -> Self {
        Self {
            comparator,
            threshold,
        }
    }

    pub fn at_least(threshold: f64) -> Self {
        Self::new(Comparator::Gte, threshold)
    }

    pub fn at_most(threshold: f64) -> Self {
        Self::new(Comparator::Lte, threshold)
    }

    /// Parses a gate from context JSON.
    ///
    /// A bare number means "at least"; an object carries an explicit
    /// comparator, e.g. `{"comparator": "lte", "threshold": 0.5}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::at_least),
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// Metrics observed on one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityMetrics {
    pub confidence: Option<f64>,
    pub success_ratio: f64,
    pub total_cost: f64,
    pub duration_secs: f64,
}

impl QualityMetrics {
    pub fn get(&self, metric: &str) -> Option<f64> {
        match metric {
            METRIC_CONFIDENCE => self.confidence,
            METRIC_SUCCESS_RATIO => Some(self.success_ratio),
            METRIC_TOTAL_COST => Some(self.total_cost),
            METRIC_DURATION_SECS => Some(self.duration_secs),
            _ => None,
        }
    }
}

/// Result of checking one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
    pub metric: String,
    pub comparator: Comparator,
    pub threshold: f64,
    /// `None` when the metric was not observable (unknown or absent).
    pub observed: Option<f64>,
    pub passed: bool,
}

impl fmt::Display for GateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observed = self
            .observed
            .map(|v| format!("{:.3}", v))
            .unwrap_or_else(|| "n/a".to_string());
        write!(
            f,
            "{} {} {} (observed {}): {}",
            self.metric,
            self.comparator,
            self.threshold,
            observed,
            if self.passed { "pass" } else { "FAIL" }
        )
    }
}

/// Checks every gate; a metric that cannot be observed fails its gate.
pub fn evaluate_gates(
    gates: &BTreeMap<String, QualityGate>,
    metrics: &QualityMetrics,
) -> Vec<GateOutcome> {
    gates
        .iter()
        .map(|(metric, gate)| {
            let observed = metrics.get(metric);
            let passed = observed
                .map(|value| gate.comparator.check(value, gate.threshold))
                .unwrap_or(false);
            GateOutcome {
                metric: metric.clone(),
                comparator: gate.comparator,
                threshold: gate.threshold,
                observed,
                passed,
            }
        })
        .collect()
}
