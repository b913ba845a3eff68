//! The meta-orchestrator: analyze, select, compose, execute, learn.
//!
//! ```text
//! task ─► TaskAnalyzer ─► ExecutorSelector ──reuse──► stored pattern + executors
//!                              │ fresh
//!                              ▼
//!                        PatternSelector::compose ─► ExecutionPlan
//!                                                          │
//!       ConfigurationStore ◄── record ◄── ExecutionEngine ◄──┘
//! ```

use std::sync::Arc;

use crate::analyzer::TaskAnalyzer;
use crate::capability::{CapabilityInvoker, TierPricing};
use crate::catalog::CapabilityCatalog;
use crate::config::OrchestratorConfig;
use crate::context::TaskContext;
use crate::engine::{ExecutionEngine, ExecutionRuntime};
use crate::error::{OrchestratorError, PlanValidationError};
use crate::fallback::FallbackController;
use crate::metrics::OrchestratorMetrics;
use crate::patterns::PatternSelector;
use crate::plan::{ExecutionPlan, ExecutionResult, PlanSource};
use crate::selector::ExecutorSelector;
use crate::store::ConfigurationStore;

/// Composes and runs executor pipelines for natural-language tasks.
pub struct MetaOrchestrator {
    analyzer: TaskAnalyzer,
    catalog: Arc<CapabilityCatalog>,
    store: Arc<ConfigurationStore>,
    selector: ExecutorSelector,
    patterns: PatternSelector,
    engine: ExecutionEngine,
    pricing: TierPricing,
    metrics: Option<Arc<OrchestratorMetrics>>,
}

impl std::fmt::Debug for MetaOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaOrchestrator")
            .field("catalog", &self.catalog.len())
            .field("store", &self.store)
            .field("rules", &self.patterns.rules().len())
            .field("engine", &self.engine)
            .finish()
    }
}

impl MetaOrchestrator {
    /// Wires the components together from explicit dependencies.
    pub fn new(
        catalog: Arc<CapabilityCatalog>,
        store: Arc<ConfigurationStore>,
        invoker: Arc<dyn CapabilityInvoker>,
        config: &OrchestratorConfig,
    ) -> Self {
        let selector = ExecutorSelector::new(catalog.clone(), store.clone()).with_reuse_policy(config.reuse);
        let runtime = ExecutionRuntime::new(invoker, FallbackController::new(config.fallback), config.patterns);

        Self {
            analyzer: TaskAnalyzer::new(),
            catalog,
            store,
            selector,
            patterns: PatternSelector::default(),
            engine: ExecutionEngine::new(runtime),
            pricing: config.pricing,
            metrics: None,
        }
    }

    /// Builds the catalog, rule table and store described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configuration is invalid, a YAML file cannot be loaded,
    /// or the store cannot be opened.
    pub async fn from_config(
        config: &OrchestratorConfig,
        invoker: Arc<dyn CapabilityInvoker>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;

        let mut catalog = match &config.catalog_path {
            Some(path) => CapabilityCatalog::from_path(path)?,
            None => CapabilityCatalog::builtin(),
        };
        if let Some(cap) = config.timeout_cap() {
            catalog = catalog.with_timeout_cap(cap);
        }

        let store = ConfigurationStore::open(&config.store_url).await?;
        let mut orchestrator = Self::new(Arc::new(catalog), Arc::new(store), invoker, config);

        if let Some(path) = &config.rules_path {
            orchestrator = orchestrator.with_pattern_selector(PatternSelector::from_path(path)?);
        }
        Ok(orchestrator)
    }

    pub fn with_pattern_selector(mut self, patterns: PatternSelector) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<OrchestratorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &ConfigurationStore {
        &self.store
    }

    pub fn metrics(&self) -> Option<&OrchestratorMetrics> {
        self.metrics.as_deref()
    }

    pub fn analyzer(&self) -> &TaskAnalyzer {
        &self.analyzer
    }

    /// Turns a task description into a validated plan without running it.
    ///
    /// A qualifying stored configuration is reused verbatim (executors and
    /// pattern); otherwise the rule table picks the pattern for a fresh cover.
    ///
    /// # Errors
    ///
    /// `PlanValidationError` when no capability is recognized, the catalog
    /// cannot cover the task, or the composed plan violates its pattern's shape.
    pub async fn analyze_and_compose(
        &self,
        task: &str,
        context: &TaskContext,
    ) -> Result<ExecutionPlan, PlanValidationError> {
        let requirements = self.analyzer.analyze(task, context)?;
        let signature = requirements.signature();
        let selection = self.selector.select(&requirements, &signature).await?;

        let (pattern, executors, source) = match selection.reused {
            Some(stored) => (
                stored.pattern,
                selection.executors,
                PlanSource::Reused {
                    configuration_id: stored.id,
                },
            ),
            None => {
                let composition = self
                    .patterns
                    .compose(&requirements, selection.executors, &self.catalog)?;
                tracing::debug!(rule = %composition.rule, pattern = %composition.pattern, "Pattern chosen");
                (composition.pattern, composition.executors, PlanSource::Fresh)
            }
        };

        let estimate = self.engine.estimate(pattern, &executors, &self.pricing)?;
        let plan = ExecutionPlan::new(task, requirements, executors, pattern)
            .with_source(source)
            .with_estimates(estimate.cost, estimate.duration);
        self.engine.validate(&plan)?;

        tracing::info!(
            plan_id = %plan.id,
            signature = %plan.signature.short(),
            pattern = %plan.pattern,
            executors = ?plan.executor_ids(),
            reused = plan.reused_configuration().is_some(),
            estimated_cost = plan.estimated_cost,
            "Composed plan"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_plan(plan.pattern.as_str(), plan.reused_configuration().is_some());
        }

        Ok(plan)
    }

    /// Runs a plan and records the outcome in the configuration store.
    ///
    /// Store failures are logged; they never fail an execution that already
    /// happened.
    ///
    /// # Errors
    ///
    /// `PlanValidationError` when the plan is rejected before any executor runs.
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        context: &TaskContext,
    ) -> Result<ExecutionResult, PlanValidationError> {
        let result = self.engine.execute(plan, context).await?;

        match self.store.record_execution(plan, &result).await {
            Ok(stored) => tracing::debug!(
                configuration_id = %stored.id,
                usage = stored.usage_count(),
                success_rate = stored.success_rate(),
                "Recorded execution outcome"
            ),
            Err(e) => tracing::warn!(
                plan_id = %plan.id,
                error = %e,
                "Failed to record execution outcome"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_execution(&result);
        }
        Ok(result)
    }

    /// Composes and executes in one step.
    pub async fn run(&self, task: &str, context: &TaskContext) -> Result<ExecutionResult, OrchestratorError> {
        let plan = self.analyze_and_compose(task, context).await?;
        Ok(self.execute(&plan, context).await?)
    }
}
