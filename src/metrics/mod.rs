//! Prometheus metrics for orchestrated executions.
//!
//! Metrics live on an owned [`prometheus::Registry`] so several orchestrators
//! (and tests) can coexist in one process. [`OrchestratorMetrics::export`]
//! renders the text exposition format for scraping.

pub mod prometheus;

pub use self::prometheus::OrchestratorMetrics;
