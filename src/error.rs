//! Error types for compose-forge operations.
//!
//! Defines error types for each subsystem:
//! - Capability invocation (transient, permanent, timeout)
//! - Plan validation (raised before any executor runs)
//! - Capability catalog loading
//! - Configuration store persistence
//! - LLM API interactions
//! - Runtime configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a single capability invocation.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    /// Network or rate-limit class failure; eligible for tier escalation.
    #[error("Transient capability error: {0}")]
    Transient(String),

    /// Invalid input or request; never retried.
    #[error("Permanent capability error: {0}")]
    Permanent(String),

    /// The invocation did not finish within its time limit.
    #[error("Capability invocation timed out after {0:?}")]
    Timeout(Duration),
}

impl CapabilityError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient(_) => ErrorKind::TransientCapabilityError,
            Self::Permanent(_) => ErrorKind::PermanentCapabilityError,
            Self::Timeout(_) => ErrorKind::TimeoutError,
        }
    }
}

/// Classification of a failure recorded on an executor result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TransientCapabilityError,
    PermanentCapabilityError,
    TimeoutError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::TransientCapabilityError => "TransientCapabilityError",
            Self::PermanentCapabilityError => "PermanentCapabilityError",
            Self::TimeoutError => "TimeoutError",
        };
        f.write_str(name)
    }
}

/// Errors detected while building or validating a plan.
///
/// All of these are raised before any executor is invoked.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanValidationError {
    #[error("No capability could be inferred from the task description")]
    NoCapabilities,

    #[error("No executor template covers capability '{0}'")]
    UncoveredCapability(String),

    #[error("Unsupported composition pattern '{0}'")]
    UnsupportedPattern(String),

    #[error("Invalid shape for {pattern} plan: {reason}")]
    InvalidShape { pattern: String, reason: String },

    #[error("Plan has no executors")]
    EmptyPlan,
}

/// Errors that can occur while loading the capability catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Duplicate executor template id '{0}'")]
    DuplicateTemplate(String),

    #[error("Executor template '{id}' is invalid: {reason}")]
    InvalidTemplate { id: String, reason: String },

    #[error("Catalog is empty")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur in the configuration store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No stored configuration with this id (a cache miss, not a caller error).
    #[error("Configuration '{0}' not found")]
    NotFound(String),

    #[error("Invalid counts: success_count {success} exceeds usage_count {usage}")]
    InvalidCounts { usage: u64, success: u64 },

    #[error("Invalid stored data: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl From<LlmError> for CapabilityError {
    fn from(err: LlmError) -> Self {
        match &err {
            LlmError::RequestFailed(_) | LlmError::RateLimited(_) => {
                CapabilityError::Transient(err.to_string())
            }
            LlmError::ApiError { code, .. } if *code == 408 || *code == 429 || *code >= 500 => {
                CapabilityError::Transient(err.to_string())
            }
            _ => CapabilityError::Permanent(err.to_string()),
        }
    }
}

/// Errors that can occur while loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Top-level error returned by the orchestrator facade.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Plan(#[from] PlanValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_kinds() {
        assert_eq!(
            CapabilityError::Transient("x".into()).kind(),
            ErrorKind::TransientCapabilityError
        );
        assert_eq!(
            CapabilityError::Permanent("x".into()).kind(),
            ErrorKind::PermanentCapabilityError
        );
        assert_eq!(
            CapabilityError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::TimeoutError
        );
    }

    #[test]
    fn test_llm_error_classification() {
        let rate_limited: CapabilityError = LlmError::RateLimited("slow down".into()).into();
        assert!(matches!(rate_limited, CapabilityError::Transient(_)));

        let server: CapabilityError = LlmError::ApiError {
            code: 503,
            message: "unavailable".into(),
        }
        .into();
        assert!(matches!(server, CapabilityError::Transient(_)));

        let bad_request: CapabilityError = LlmError::ApiError {
            code: 400,
            message: "malformed".into(),
        }
        .into();
        assert!(matches!(bad_request, CapabilityError::Permanent(_)));

        let context: CapabilityError = LlmError::ContextLengthExceeded { limit: 8192 }.into();
        assert!(matches!(context, CapabilityError::Permanent(_)));
    }
}
