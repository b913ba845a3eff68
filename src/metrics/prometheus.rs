//! Prometheus metric registration and export.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

use crate::plan::ExecutionResult;

/// Counters and histograms describing plan executions.
#[derive(Debug, Clone)]
pub struct OrchestratorMetrics {
    registry: Registry,
    executions_total: IntCounterVec,
    execution_duration: HistogramVec,
    invocations_total: IntCounterVec,
    escalations_total: IntCounterVec,
    cost_total: CounterVec,
    plans_total: IntCounterVec,
}

impl OrchestratorMetrics {
    /// Creates and registers every metric on a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a `prometheus::Error` if a metric definition is invalid.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let executions_total = IntCounterVec::new(
            Opts::new("compose_executions_total", "Total plan executions"),
            &["pattern", "status"],
        )?;

        let execution_duration = HistogramVec::new(
            HistogramOpts::new(
                "compose_execution_duration_seconds",
                "Plan execution duration in seconds",
            )
            .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
            &["pattern"],
        )?;

        let invocations_total = IntCounterVec::new(
            Opts::new(
                "compose_executor_invocations_total",
                "Executor slots finished, by final tier",
            ),
            &["tier", "status"],
        )?;

        let escalations_total = IntCounterVec::new(
            Opts::new(
                "compose_fallback_escalations_total",
                "Executor slots that ended on a higher tier than they started",
            ),
            &["from", "to"],
        )?;

        let cost_total = CounterVec::new(
            Opts::new("compose_cost_total", "Accumulated invocation cost"),
            &["tier"],
        )?;

        let plans_total = IntCounterVec::new(
            Opts::new("compose_plans_total", "Plans composed, by source"),
            &["pattern", "source"],
        )?;

        registry.register(Box::new(executions_total.clone()))?;
        registry.register(Box::new(execution_duration.clone()))?;
        registry.register(Box::new(invocations_total.clone()))?;
        registry.register(Box::new(escalations_total.clone()))?;
        registry.register(Box::new(cost_total.clone()))?;
        registry.register(Box::new(plans_total.clone()))?;

        Ok(Self {
            registry,
            executions_total,
            execution_duration,
            invocations_total,
            escalations_total,
            cost_total,
            plans_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Counts a composed plan.
    pub fn record_plan(&self, pattern: &str, reused: bool) {
        let source = if reused { "reused" } else { "fresh" };
        self.plans_total.with_label_values(&[pattern, source]).inc();
    }

    /// Records a finished execution and every slot inside it.
    pub fn record_execution(&self, result: &ExecutionResult) {
        let pattern = result.pattern.as_str();
        let status = if result.success { "success" } else { "failure" };

        self.executions_total.with_label_values(&[pattern, status]).inc();
        self.execution_duration
            .with_label_values(&[pattern])
            .observe(result.total_duration.as_secs_f64());

        for slot in &result.executor_results {
            let tier = slot.tier.as_str();
            let status = if slot.success {
                "success"
            } else if slot.timed_out() {
                "timeout"
            } else {
                "failure"
            };
            self.invocations_total.with_label_values(&[tier, status]).inc();
            if slot.cost > 0.0 {
                self.cost_total.with_label_values(&[tier]).inc_by(slot.cost);
            }
            if let Some(from) = slot.fallback_from {
                self.escalations_total
                    .with_label_values(&[from.as_str(), tier])
                    .inc();
            }
        }
    }

    /// Encodes all metrics in the Prometheus text exposition format.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            return format!("# Error encoding metrics: {}\n", e);
        }

        String::from_utf8(buffer)
            .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
    }
}
