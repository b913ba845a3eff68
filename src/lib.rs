//! compose-forge: meta-orchestration of capability-tagged executors.
//!
//! Given a natural-language task, the orchestrator infers the capabilities it
//! needs, selects executors from a catalog, picks a composition pattern
//! (sequential, parallel, debate, teaching, refinement or adaptive), runs the
//! plan with cost-tier fallback and records the outcome so similar tasks can
//! reuse proven compositions.
//!
//! ```ignore
//! use std::sync::Arc;
//! use compose_forge::{
//!     CapabilityCatalog, ConfigurationStore, MetaOrchestrator, OrchestratorConfig,
//!     SimulatedInvoker, TaskContext,
//! };
//!
//! let orchestrator = MetaOrchestrator::new(
//!     Arc::new(CapabilityCatalog::builtin()),
//!     Arc::new(ConfigurationStore::in_memory()),
//!     Arc::new(SimulatedInvoker::new()),
//!     &OrchestratorConfig::default(),
//! );
//! let result = orchestrator.run("fix the crash in the scheduler", &TaskContext::new()).await?;
//! ```

pub mod analyzer;
pub mod capability;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod patterns;
pub mod plan;
pub mod quality;
pub mod selector;
pub mod store;

pub use analyzer::{Complexity, Domain, TaskAnalyzer, TaskRequirements, TaskSignature};
pub use capability::{CapabilityInvoker, InvocationOutput, LlmCapabilityInvoker, SimulatedInvoker};
pub use catalog::{CapabilityCatalog, CostTier, ExecutorTemplate};
pub use config::OrchestratorConfig;
pub use context::TaskContext;
pub use engine::{ExecutionEngine, PatternStrategy, StrategyRegistry};
pub use error::{
    CapabilityError, CatalogError, ConfigError, ErrorKind, LlmError, OrchestratorError,
    PlanValidationError, StoreError,
};
pub use fallback::{FallbackController, FallbackPolicy};
pub use orchestrator::MetaOrchestrator;
pub use patterns::{CompositionPattern, PatternSelector};
pub use plan::{ExecutionPlan, ExecutionResult, ExecutorResult};
pub use store::{ConfigurationStore, StoredConfiguration};
