//! Quality gates for execution results.
//!
//! Gate failures are recorded on the result and never raised as errors.

mod gates;

pub use gates::{
    evaluate_gates, Comparator, GateOutcome, QualityGate, QualityMetrics, METRIC_CONFIDENCE,
    METRIC_DURATION_SECS, METRIC_SUCCESS_RATIO, METRIC_TOTAL_COST,
};
