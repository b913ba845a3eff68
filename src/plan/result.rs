//! Per-executor and per-plan execution results.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::catalog::{CostTier, ExecutorTemplate};
use crate::error::{CapabilityError, ErrorKind};
use crate::patterns::CompositionPattern;
use crate::quality::GateOutcome;

/// A classified failure attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CapabilityError> for ExecutorError {
    fn from(err: &CapabilityError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One attempt inside an executor slot's fallback chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub tier: CostTier,
    pub duration: Duration,
    pub error: Option<ExecutorError>,
}

/// Outcome of one executor slot, including any fallback attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorResult {
    pub executor_id: String,
    pub role: String,
    pub success: bool,
    /// Confidence reported by the capability, in [0, 1]. Zero on failure.
    pub confidence: f64,
    pub output: Value,
    pub cost: f64,
    pub duration: Duration,
    /// Tier of the final attempt.
    pub tier: CostTier,
    pub error: Option<ExecutorError>,
    /// Originating tier when the result was produced after escalation.
    pub fallback_from: Option<CostTier>,
    pub attempts: Vec<AttemptRecord>,
}

impl ExecutorResult {
    pub fn succeeded(
        template: &ExecutorTemplate,
        tier: CostTier,
        output: Value,
        confidence: f64,
        cost: f64,
    ) -> Self {
        Self {
            executor_id: template.id.clone(),
            role: template.role.clone(),
            success: true,
            confidence: confidence.clamp(0.0, 1.0),
            output,
            cost,
            duration: Duration::ZERO,
            tier,
            error: None,
            fallback_from: None,
            attempts: Vec::new(),
        }
    }

    pub fn failed(template: &ExecutorTemplate, tier: CostTier, error: &CapabilityError) -> Self {
        Self {
            executor_id: template.id.clone(),
            role: template.role.clone(),
            success: false,
            confidence: 0.0,
            output: Value::Null,
            cost: 0.0,
            duration: Duration::ZERO,
            tier,
            error: Some(error.into()),
            fallback_from: None,
            attempts: Vec::new(),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn timed_out(&self) -> bool {
        self.error_kind() == Some(ErrorKind::TimeoutError)
    }

    /// Compact view handed to downstream executors.
    pub fn summary(&self) -> Value {
        serde_json::json!({
            "executor_id": self.executor_id,
            "role": self.role,
            "success": self.success,
            "confidence": self.confidence,
            "output": self.output,
        })
    }
}

/// Terminal artifact of executing a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plan_id: Uuid,
    pub pattern: CompositionPattern,
    /// Every executor slot that ran, in invocation order.
    pub executor_results: Vec<ExecutorResult>,
    pub aggregated_output: Value,
    /// Pattern completion rule AND every quality gate passed.
    pub success: bool,
    /// Confidence of the final answer, when one was produced.
    pub confidence: Option<f64>,
    pub total_cost: f64,
    pub total_duration: Duration,
    pub quality_gates: Vec<GateOutcome>,
}

impl ExecutionResult {
    pub fn failed_gates(&self) -> impl Iterator<Item = &GateOutcome> {
        self.quality_gates.iter().filter(|g| !g.passed)
    }

    /// Score fed into the stored configuration's running average.
    pub fn quality_score(&self) -> f64 {
        if self.success {
            self.confidence.unwrap_or(0.0)
        } else {
            0.0
        }
    }

    pub fn first_failure(&self) -> Option<&ExecutorResult> {
        self.executor_results.iter().find(|r| !r.success)
    }

    pub fn invoked_executor_ids(&self) -> Vec<&str> {
        self.executor_results
            .iter()
            .map(|r| r.executor_id.as_str())
            .collect()
    }

    pub fn result_for(&self, executor_id: &str) -> Option<&ExecutorResult> {
        self.executor_results
            .iter()
            .find(|r| r.executor_id == executor_id)
    }
}
