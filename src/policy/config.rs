//! YAML policy files.
//!
//! A file holds a dump directory plus any number of named policies. Each
//! policy section converts into a validated [`CollectionPolicy`];
//! contradictory filter lists and unknown producer generators are rejected
//! at load time.
//!
//! ```yaml
//! dump_dir: spec/fixtures/dumps
//! policies:
//!   default:
//!     exclude: [audit_logs, versions]
//!     limits:
//!       Patient.visit_notes: 10
//!     prevent_reciprocal: [VisitNoteType.visit_notes]
//!   anonymized:
//!     max_depth: 4
//!     anonymize:
//!       Patient:
//!         name: { producer: fake, generator: name }
//!         ssn: { producer: constant, value: "000-00-0000" }
//! ```

use super::{CollectionPolicy, OnAnonymizeError, PolicyStore};
use crate::anonymizer::Producer;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// One named policy section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub max_depth: Option<usize>,
    pub max_self_ref_depth: Option<usize>,
    /// Whitelist of relationship names. Mutually exclusive with `exclude`.
    pub include: Vec<String>,
    /// Blacklist of relationship names. Mutually exclusive with `include`.
    pub exclude: Vec<String>,
    /// Per-entity-type allow lists.
    pub allow: BTreeMap<String, Vec<String>>,
    /// `"Type.relationship"` -> record cap.
    pub limits: BTreeMap<String, usize>,
    /// `"Type.relationship"` paths blocked from repeat traversal.
    pub prevent_reciprocal: Vec<String>,
    /// `"Type:relationship"` edges exempted from the dependency graph.
    pub prevent_cycles: Vec<String>,
    pub on_anonymize_error: OnAnonymizeError,
    /// Entity type -> attribute -> producer.
    pub anonymize: BTreeMap<String, BTreeMap<String, Producer>>,
}

impl PolicyConfig {
    /// Convert into a resolved policy, validating as the gem did at
    /// configure time rather than mid-traversal.
    pub fn into_policy(self) -> Result<CollectionPolicy> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(Error::config(
                "policy lists both include and exclude relationships; pick one filter mode",
            ));
        }

        let mut policy = CollectionPolicy::new();
        if !self.include.is_empty() {
            policy.include_relationships(self.include)?;
        } else if !self.exclude.is_empty() {
            policy.exclude_relationships(self.exclude)?;
        }

        for (entity_type, names) in self.allow {
            policy.allow(&entity_type, names);
        }
        for (path, limit) in self.limits {
            policy.limit(&path, limit);
        }
        for path in self.prevent_reciprocal {
            policy.prevent_reciprocal(&path);
        }
        for path in self.prevent_cycles {
            policy.prevent_cycle(&path);
        }
        if let Some(depth) = self.max_depth {
            policy.set_max_depth(depth);
        }
        if let Some(depth) = self.max_self_ref_depth {
            policy.set_max_self_ref_depth(depth);
        }

        policy.on_anonymize_error = self.on_anonymize_error;
        for (entity_type, rules) in self.anonymize {
            for (attribute, producer) in rules {
                producer.validate()?;
                policy.anonymize(&entity_type, &attribute, producer);
            }
        }

        Ok(policy)
    }
}

/// Whole policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyFileConfig {
    pub dump_dir: Option<PathBuf>,
    pub policies: BTreeMap<String, PolicyConfig>,
}

impl PolicyFileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read policy file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("invalid policy file: {}", e)))
    }

    /// Build a [`PolicyStore`] with every named policy registered. A
    /// `default` section replaces the built-in default policy.
    pub fn build_store(self) -> Result<PolicyStore> {
        let mut store = PolicyStore::new();
        for (name, config) in self.policies {
            let policy = config.into_policy()?;
            store.register(&name, policy);
        }
        Ok(store)
    }
}
