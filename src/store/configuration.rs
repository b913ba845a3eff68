//! Stored compositions and their outcome history.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::analyzer::TaskSignature;
use crate::error::StoreError;
use crate::patterns::CompositionPattern;
use crate::plan::{ExecutionPlan, ExecutorRef};
use crate::quality::QualityGate;

/// A composition previously used for a task signature, with its track record.
///
/// Counts are private: they only move through [`StoredConfiguration::record_outcome`],
/// so `success_count <= usage_count` always holds and the success rate is
/// always derived.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredConfiguration {
    pub id: Uuid,
    pub task_signature: TaskSignature,
    pub executors: Vec<ExecutorRef>,
    pub pattern: CompositionPattern,
    pub quality_gates: BTreeMap<String, QualityGate>,
    usage_count: u64,
    success_count: u64,
    average_quality: f64,
    pub created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

impl StoredConfiguration {
    pub fn new(
        task_signature: TaskSignature,
        executors: Vec<ExecutorRef>,
        pattern: CompositionPattern,
        quality_gates: BTreeMap<String, QualityGate>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_signature,
            executors,
            pattern,
            quality_gates,
            usage_count: 0,
            success_count: 0,
            average_quality: 0.0,
            created_at: now,
            last_used: now,
        }
    }

    /// A new, unused configuration mirroring a plan's composition.
    pub fn from_plan(plan: &ExecutionPlan) -> Self {
        Self::new(
            plan.signature.clone(),
            plan.executor_refs(),
            plan.pattern,
            plan.quality_gates.clone(),
        )
    }

    /// Restores persisted history.
    ///
    /// # Errors
    ///
    /// `InvalidCounts` when `success > usage`, `Corrupt` when the average is
    /// not a finite value in `[0, 1]`.
    pub fn with_history(mut self, usage: u64, success: u64, average_quality: f64) -> Result<Self, StoreError> {
        if success > usage {
            return Err(StoreError::InvalidCounts { usage, success });
        }
        if !average_quality.is_finite() || !(0.0..=1.0).contains(&average_quality) {
            return Err(StoreError::Corrupt(format!(
                "average quality {} out of range",
                average_quality
            )));
        }
        self.usage_count = usage;
        self.success_count = success;
        self.average_quality = average_quality;
        Ok(self)
    }

    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, last_used: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.last_used = last_used;
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Folds one execution outcome into the history.
    pub fn record_outcome(&mut self, success: bool, quality: f64) {
        let quality = if quality.is_finite() {
            quality.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        }
        self.average_quality += (quality - self.average_quality) / self.usage_count as f64;
        self.last_used = Utc::now();
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn success_count(&self) -> u64 {
        self.success_count
    }

    pub fn average_quality(&self) -> f64 {
        self.average_quality
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        self.last_used
    }

    /// `success_count / usage_count`, or 0 for an unused configuration.
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.usage_count as f64
        }
    }

    pub fn same_composition(&self, executors: &[ExecutorRef], pattern: CompositionPattern) -> bool {
        self.pattern == pattern && self.executors == executors
    }
}
