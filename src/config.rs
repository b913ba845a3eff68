//! Runtime configuration for the orchestrator.
//!
//! Values come from defaults, an optional YAML file and `COMPOSE_*`
//! environment variables, in that order of precedence (environment wins).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::{TierModels, TierPricing};
use crate::engine::PatternSettings;
use crate::error::ConfigError;
use crate::fallback::FallbackPolicy;
use crate::selector::ReusePolicy;

/// Store URL selecting the in-memory backend.
pub const MEMORY_STORE_URL: &str = "memory";

/// Configuration for [`MetaOrchestrator`](crate::orchestrator::MetaOrchestrator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Thresholds for reusing a stored configuration.
    pub reuse: ReusePolicy,
    /// Parallel success fraction and teaching threshold.
    pub patterns: PatternSettings,
    /// Retry and escalation limits per executor slot.
    pub fallback: FallbackPolicy,
    /// Per-tier token prices used for estimates and LLM costs.
    pub pricing: TierPricing,
    /// Per-tier model names for the LLM backend.
    pub models: TierModels,
    /// `memory` or a `sqlite:` URL.
    pub store_url: String,
    /// Upper bound applied to every template timeout, in milliseconds.
    pub timeout_cap_ms: Option<u64>,
    /// Catalog YAML; the built-in catalog is used when unset.
    pub catalog_path: Option<PathBuf>,
    /// Pattern rule YAML; the built-in rules are used when unset.
    pub rules_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            reuse: ReusePolicy::default(),
            patterns: PatternSettings::default(),
            fallback: FallbackPolicy::default(),
            pricing: TierPricing::default(),
            models: TierModels::default(),
            store_url: MEMORY_STORE_URL.to_string(),
            timeout_cap_ms: None,
            catalog_path: None,
            rules_path: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML file; missing keys keep their defaults.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(path = %path.as_ref().display(), "Loaded orchestrator config");
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Creates configuration from defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COMPOSE_MIN_SUCCESS_RATE`: reuse threshold (default: 0.7)
    /// - `COMPOSE_MIN_USAGE`: minimum recorded runs before reuse (default: 3)
    /// - `COMPOSE_PARALLEL_SUCCESS_FRACTION`: parallel success fraction (default: 1.0)
    /// - `COMPOSE_TEACHING_THRESHOLD`: junior acceptance confidence (default: 0.7)
    /// - `COMPOSE_ATTEMPTS_PER_TIER`: retries per tier (default: 2)
    /// - `COMPOSE_MAX_ATTEMPTS`: attempts per slot across tiers (default: 6)
    /// - `COMPOSE_ESCALATE_ON_TIMEOUT`: escalate after a timeout (default: true)
    /// - `COMPOSE_TIMEOUT_CAP_MS`: upper bound on template timeouts (default: none)
    /// - `COMPOSE_STORE_URL`: `memory` or `sqlite:` URL (default: memory)
    /// - `COMPOSE_CATALOG`: catalog YAML path
    /// - `COMPOSE_RULES`: pattern rule YAML path
    /// - `COMPOSE_MODEL_LOW` / `COMPOSE_MODEL_MID` / `COMPOSE_MODEL_HIGH`: tier models
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().overlay_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies any `COMPOSE_*` variables on top of this configuration.
    pub fn overlay_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("COMPOSE_MIN_SUCCESS_RATE") {
            self.reuse.min_success_rate = parse_env_value(&val, "COMPOSE_MIN_SUCCESS_RATE")?;
        }
        if let Ok(val) = std::env::var("COMPOSE_MIN_USAGE") {
            self.reuse.min_usage = parse_env_value(&val, "COMPOSE_MIN_USAGE")?;
        }

        if let Ok(val) = std::env::var("COMPOSE_PARALLEL_SUCCESS_FRACTION") {
            self.patterns.min_success_fraction =
                parse_env_value(&val, "COMPOSE_PARALLEL_SUCCESS_FRACTION")?;
        }
        if let Ok(val) = std::env::var("COMPOSE_TEACHING_THRESHOLD") {
            self.patterns.teaching_threshold = parse_env_value(&val, "COMPOSE_TEACHING_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("COMPOSE_ATTEMPTS_PER_TIER") {
            self.fallback.attempts_per_tier = parse_env_value(&val, "COMPOSE_ATTEMPTS_PER_TIER")?;
        }
        if let Ok(val) = std::env::var("COMPOSE_MAX_ATTEMPTS") {
            self.fallback.max_attempts = parse_env_value(&val, "COMPOSE_MAX_ATTEMPTS")?;
        }
        if let Ok(val) = std::env::var("COMPOSE_ESCALATE_ON_TIMEOUT") {
            self.fallback.escalate_on_timeout = parse_env_bool(&val, "COMPOSE_ESCALATE_ON_TIMEOUT")?;
        }
        if let Ok(val) = std::env::var("COMPOSE_TIMEOUT_CAP_MS") {
            self.timeout_cap_ms = Some(parse_env_value(&val, "COMPOSE_TIMEOUT_CAP_MS")?);
        }

        if let Ok(val) = std::env::var("COMPOSE_STORE_URL") {
            self.store_url = val;
        }
        if let Ok(val) = std::env::var("COMPOSE_CATALOG") {
            self.catalog_path = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("COMPOSE_RULES") {
            self.rules_path = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("COMPOSE_MODEL_LOW") {
            self.models.low = val;
        }
        if let Ok(val) = std::env::var("COMPOSE_MODEL_MID") {
            self.models.mid = val;
        }
        if let Ok(val) = std::env::var("COMPOSE_MODEL_HIGH") {
            self.models.high = val;
        }

        Ok(self)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.reuse.min_success_rate) {
            return Err(ConfigError::ValidationFailed(
                "min_success_rate must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.patterns.min_success_fraction)
            || self.patterns.min_success_fraction == 0.0
        {
            return Err(ConfigError::ValidationFailed(
                "min_success_fraction must be in (0.0, 1.0]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.patterns.teaching_threshold) {
            return Err(ConfigError::ValidationFailed(
                "teaching_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.fallback.attempts_per_tier == 0 || self.fallback.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "fallback attempts must be greater than 0".to_string(),
            ));
        }

        if self.timeout_cap_ms == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "timeout_cap_ms must be greater than 0".to_string(),
            ));
        }

        if self.store_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "store_url cannot be empty".to_string(),
            ));
        }

        for (tier, model) in [
            ("low", &self.models.low),
            ("mid", &self.models.mid),
            ("high", &self.models.high),
        ] {
            if model.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!(
                    "model for tier '{}' cannot be empty",
                    tier
                )));
            }
        }

        Ok(())
    }

    pub fn timeout_cap(&self) -> Option<Duration> {
        self.timeout_cap_ms.map(Duration::from_millis)
    }

    pub fn with_reuse_policy(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    pub fn with_pattern_settings(mut self, patterns: PatternSettings) -> Self {
        self.patterns = patterns;
        self
    }

    pub fn with_fallback_policy(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_pricing(mut self, pricing: TierPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_models(mut self, models: TierModels) -> Self {
        self.models = models;
        self
    }

    pub fn with_store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = url.into();
        self
    }

    pub fn with_timeout_cap(mut self, cap: Duration) -> Self {
        self.timeout_cap_ms = Some(cap.as_millis() as u64);
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn with_rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(path.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
