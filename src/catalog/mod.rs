//! Capability catalog: the read-only registry of executor templates.
//!
//! The catalog is loaded once at startup, either from the built-in table or
//! from a YAML file, and shared behind an `Arc` without locking.
//!
//! ```yaml
//! templates:
//!   - id: security_auditor.low
//!     role: security_auditor
//!     capabilities: [security_scan]
//!     cost_tier: low
//!     limits: { timeout_ms: 60000, max_tokens: 2000 }
//! ```

mod builtin;
pub mod template;

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub use template::{CostTier, ExecutorTemplate, ResourceLimits};

use crate::error::CatalogError;

/// Well-known capability provided by debate synthesizers.
pub const SYNTHESIS_CAPABILITY: &str = "synthesis";

/// Well-known capability provided by adaptive classifiers.
pub const CLASSIFICATION_CAPABILITY: &str = "classification";

#[derive(Debug, Deserialize)]
struct CatalogFile {
    templates: Vec<ExecutorTemplate>,
}

/// Registry of executor templates.
#[derive(Debug, Clone)]
pub struct CapabilityCatalog {
    templates: Vec<ExecutorTemplate>,
}

impl CapabilityCatalog {
    /// Creates a catalog, validating template ids and capabilities.
    pub fn new(templates: Vec<ExecutorTemplate>) -> Result<Self, CatalogError> {
        if templates.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen = HashSet::new();
        for template in &templates {
            if template.id.trim().is_empty() {
                return Err(CatalogError::InvalidTemplate {
                    id: template.id.clone(),
                    reason: "id must not be empty".to_string(),
                });
            }
            if !seen.insert(template.id.as_str()) {
                return Err(CatalogError::DuplicateTemplate(template.id.clone()));
            }
            if template.capabilities.is_empty() {
                return Err(CatalogError::InvalidTemplate {
                    id: template.id.clone(),
                    reason: "at least one capability is required".to_string(),
                });
            }
            if template.limits.timeout_ms == 0 {
                return Err(CatalogError::InvalidTemplate {
                    id: template.id.clone(),
                    reason: "timeout must be greater than 0".to_string(),
                });
            }
        }

        Ok(Self { templates })
    }

    /// The catalog shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            templates: builtin::templates(),
        }
    }

    /// Parses a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        Self::new(file.templates)
    }

    /// Loads a catalog from a YAML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_yaml_str(&content)?;
        tracing::info!(
            path = %path.as_ref().display(),
            templates = catalog.len(),
            "Loaded capability catalog"
        );
        Ok(catalog)
    }

    /// Lowers every template timeout above `cap` to `cap`.
    pub fn with_timeout_cap(mut self, cap: Duration) -> Self {
        for template in &mut self.templates {
            if template.limits.timeout() > cap {
                template.limits.timeout_ms = cap.as_millis() as u64;
            }
        }
        self
    }

    pub fn templates(&self) -> &[ExecutorTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ExecutorTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Finds the template for a role at a specific tier.
    pub fn find(&self, role: &str, tier: CostTier) -> Option<&ExecutorTemplate> {
        self.templates
            .iter()
            .filter(|t| t.role == role && t.cost_tier == tier)
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// All templates providing a capability.
    pub fn covering<'a>(
        &'a self,
        capability: &'a str,
    ) -> impl Iterator<Item = &'a ExecutorTemplate> + 'a {
        self.templates
            .iter()
            .filter(move |t| t.has_capability(capability))
    }

    /// The template providing a capability at exactly `tier` (smallest id wins).
    pub fn covering_at(&self, capability: &str, tier: CostTier) -> Option<&ExecutorTemplate> {
        self.templates
            .iter()
            .filter(|t| t.cost_tier == tier && t.has_capability(capability))
            .min_by(|a, b| a.id.cmp(&b.id))
    }

    /// Every capability tag known to the catalog.
    pub fn capabilities(&self) -> BTreeSet<&str> {
        self.templates
            .iter()
            .flat_map(|t| t.capabilities.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_valid() {
        let builtin = CapabilityCatalog::builtin();
        let validated = CapabilityCatalog::new(builtin.templates().to_vec());
        assert!(validated.is_ok());
        assert!(builtin.capabilities().contains(SYNTHESIS_CAPABILITY));
        assert!(builtin.capabilities().contains(CLASSIFICATION_CAPABILITY));
    }

    #[test]
    fn test_timeout_cap() {
        let catalog = CapabilityCatalog::builtin().with_timeout_cap(Duration::from_secs(90));
        let low = catalog.get("developer.low").expect("developer.low");
        let high = catalog.get("developer.high").expect("developer.high");
        assert_eq!(low.limits.timeout(), Duration::from_secs(60));
        assert_eq!(high.limits.timeout(), Duration::from_secs(90));
    }

    #[test]
    fn test_covering_at_outlives_capability_name() {
        let catalog = CapabilityCatalog::builtin();
        let found = {
            let capability = String::from("debugging");
            catalog.covering_at(&capability, CostTier::Mid)
        };
        assert_eq!(found.map(|t| t.id.as_str()), Some("debugger.mid"));
        assert!(catalog.covering_at("debugging", CostTier::High).is_some());
        assert!(catalog.covering_at("unknown", CostTier::Low).is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let templates = vec![
            ExecutorTemplate::new("a", ["x"], CostTier::Low),
            ExecutorTemplate::new("a", ["y"], CostTier::Low),
        ];
        assert!(matches!(
            CapabilityCatalog::new(templates),
            Err(CatalogError::DuplicateTemplate(id)) if id == "a.low"
        ));
    }

    #[test]
    fn test_template_without_capabilities_rejected() {
        let templates = vec![ExecutorTemplate::new("a", Vec::<String>::new(), CostTier::Low)];
        assert!(matches!(
            CapabilityCatalog::new(templates),
            Err(CatalogError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
templates:
  - id: scanner.low
    role: scanner
    capabilities: [security_scan]
    cost_tier: low
    limits: { timeout_ms: 1000, max_tokens: 500 }
  - id: scanner.high
    role: scanner
    capabilities: [security_scan, dependency_audit]
    cost_tier: high
    limits: { timeout_ms: 5000, max_tokens: 4000 }
    description: Thorough scanner
"#;
        let catalog = CapabilityCatalog::from_yaml_str(yaml).expect("valid catalog");
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.find("scanner", CostTier::High).map(|t| t.id.as_str()),
            Some("scanner.high")
        );
        assert_eq!(catalog.covering("security_scan").count(), 2);
        assert_eq!(
            catalog
                .covering_at("dependency_audit", CostTier::High)
                .map(|t| t.id.as_str()),
            Some("scanner.high")
        );
        assert!(catalog.covering_at("dependency_audit", CostTier::Low).is_none());
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.yaml");
        std::fs::write(
            &path,
            "templates:\n  - id: w.low\n    role: w\n    capabilities: [doc_check]\n    cost_tier: low\n    limits: { timeout_ms: 10, max_tokens: 1 }\n",
        )
        .expect("write catalog");

        let catalog = CapabilityCatalog::from_path(&path).expect("load catalog");
        assert!(catalog.get("w.low").is_some());
    }
}
