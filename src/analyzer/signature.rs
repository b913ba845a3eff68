//! Task signatures: normalized fingerprints used to index stored configurations.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Complexity, Domain};

/// SHA-256 fingerprint of domain + complexity + sorted capability set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskSignature(String);

impl TaskSignature {
    pub fn compute(domain: Domain, complexity: Complexity, capabilities: &BTreeSet<String>) -> Self {
        let canonical = format!(
            "{}|{}|{}",
            domain.as_str(),
            complexity.as_str(),
            capabilities
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>()
                .join(",")
        );
        let digest = Sha256::digest(canonical.as_bytes());
        Self(hex::encode(digest))
    }

    /// Wraps an already computed fingerprint (e.g. read back from storage).
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for TaskSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_signature_is_order_insensitive() {
        let a = TaskSignature::compute(Domain::Security, Complexity::Moderate, &caps(&["b", "a"]));
        let b = TaskSignature::compute(Domain::Security, Complexity::Moderate, &caps(&["a", "b"]));
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_signature_distinguishes_inputs() {
        let base = TaskSignature::compute(Domain::Security, Complexity::Moderate, &caps(&["a"]));
        let other_domain =
            TaskSignature::compute(Domain::Testing, Complexity::Moderate, &caps(&["a"]));
        let other_complexity =
            TaskSignature::compute(Domain::Security, Complexity::Complex, &caps(&["a"]));
        let other_caps =
            TaskSignature::compute(Domain::Security, Complexity::Moderate, &caps(&["a", "b"]));

        assert_ne!(base, other_domain);
        assert_ne!(base, other_complexity);
        assert_ne!(base, other_caps);
        assert_eq!(base.short().len(), 12);
    }
}
