//! Collection policies ("presets") and the active-policy stack.
//!
//! A policy bundles traversal filters, limits, cycle guards, depth bounds,
//! and anonymization rules. Multiple named policies coexist in a
//! [`PolicyStore`]; exactly one is active at a time, and scoped switches
//! restore the previous policy on exit whether the scope succeeds or fails.

pub mod config;

pub use config::PolicyFileConfig;

use crate::anonymizer::Producer;
use crate::error::{Error, Result};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

pub const DEFAULT_POLICY: &str = "default";
pub const DEFAULT_MAX_DEPTH: usize = 10;
pub const DEFAULT_MAX_SELF_REF_DEPTH: usize = 2;

/// Relationship admission filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Admit everything.
    #[default]
    None,
    /// Admit only listed relationship names.
    Whitelist,
    /// Admit everything except listed relationship names.
    Blacklist,
}

/// What to do when a value producer fails for one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnAnonymizeError {
    /// Propagate with record/attribute context.
    #[default]
    Fail,
    /// Leave the record partially anonymized and record a warning.
    SkipAndWarn,
}

/// Resolved configuration controlling one collection run.
#[derive(Debug, Clone, Default)]
pub struct CollectionPolicy {
    filter_mode: FilterMode,
    filter_list: AHashSet<String>,
    /// Per-entity-type allow lists; take precedence over the global filter.
    allowed: AHashMap<String, AHashSet<String>>,
    /// `"Type.edge"` -> max related records fetched through that edge.
    limits: AHashMap<String, usize>,
    /// `"Type.edge"` paths whose repeat traversal is blocked.
    reciprocal_blocked: AHashSet<String>,
    /// `"Type:edge"` edges exempted from the insert-order dependency graph.
    prevented_cycles: AHashSet<String>,
    max_depth: Option<usize>,
    max_self_ref_depth: Option<usize>,
    /// Entity type -> attribute -> producer. BTreeMap keeps rule
    /// application order deterministic.
    pub anonymization: AHashMap<String, BTreeMap<String, Producer>>,
    pub on_anonymize_error: OnAnonymizeError,
}

impl CollectionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whitelist mode: only the given relationship names are traversed.
    /// Contradicts a previously configured blacklist.
    pub fn include_relationships<I, S>(&mut self, names: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.filter_mode == FilterMode::Blacklist {
            return Err(Error::config(
                "cannot set included relationships when excluded relationships are already set",
            ));
        }
        self.filter_mode = FilterMode::Whitelist;
        self.filter_list.extend(names.into_iter().map(Into::into));
        Ok(self)
    }

    /// Blacklist mode: the given relationship names are skipped.
    /// Contradicts a previously configured whitelist.
    pub fn exclude_relationships<I, S>(&mut self, names: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.filter_mode == FilterMode::Whitelist {
            return Err(Error::config(
                "cannot set excluded relationships when included relationships are already set",
            ));
        }
        self.filter_mode = FilterMode::Blacklist;
        self.filter_list.extend(names.into_iter().map(Into::into));
        Ok(self)
    }

    /// Per-type allow list; for that type it replaces the global filter.
    pub fn allow<I, S>(&mut self, entity_type: &str, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed
            .entry(entity_type.to_string())
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Cap the records fetched through `"Type.edge"`.
    pub fn limit(&mut self, path: &str, limit: usize) -> &mut Self {
        self.limits.insert(path.to_string(), limit);
        self
    }

    /// Block repeat traversal of `"Type.edge"` (reciprocal-pair guard).
    pub fn prevent_reciprocal(&mut self, path: &str) -> &mut Self {
        self.reciprocal_blocked.insert(path.to_string());
        self
    }

    /// Exempt `"Type:edge"` from the insert-order dependency graph.
    pub fn prevent_cycle(&mut self, path: &str) -> &mut Self {
        self.prevented_cycles.insert(path.to_string());
        self
    }

    pub fn set_max_depth(&mut self, depth: usize) -> &mut Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn set_max_self_ref_depth(&mut self, depth: usize) -> &mut Self {
        self.max_self_ref_depth = Some(depth);
        self
    }

    /// Register an anonymization rule for one attribute of one type.
    pub fn anonymize(&mut self, entity_type: &str, attribute: &str, producer: Producer) -> &mut Self {
        self.anonymization
            .entry(entity_type.to_string())
            .or_default()
            .insert(attribute.to_string(), producer);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.unwrap_or(DEFAULT_MAX_DEPTH)
    }

    pub fn max_self_ref_depth(&self) -> usize {
        self.max_self_ref_depth.unwrap_or(DEFAULT_MAX_SELF_REF_DEPTH)
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }

    /// Relationship admission check. The per-type allow list takes
    /// precedence; otherwise the global filter mode decides.
    pub fn admits(&self, entity_type: &str, relationship: &str) -> bool {
        if let Some(allowed) = self.allowed.get(entity_type) {
            return allowed.contains(relationship);
        }
        match self.filter_mode {
            FilterMode::None => true,
            FilterMode::Whitelist => self.filter_list.contains(relationship),
            FilterMode::Blacklist => !self.filter_list.contains(relationship),
        }
    }

    pub fn limit_for(&self, entity_type: &str, relationship: &str) -> Option<usize> {
        self.limits
            .get(&format!("{}.{}", entity_type, relationship))
            .copied()
    }

    pub fn reciprocal_blocked(&self, entity_type: &str, relationship: &str) -> bool {
        self.reciprocal_blocked
            .contains(&format!("{}.{}", entity_type, relationship))
    }

    pub fn cycle_exempted(&self, entity_type: &str, relationship: &str) -> bool {
        self.prevented_cycles
            .contains(&format!("{}:{}", entity_type, relationship))
    }

    pub fn has_anonymization_rules(&self) -> bool {
        !self.anonymization.is_empty()
    }
}

/// Named policies plus the activation stack.
///
/// The `default` policy exists permanently and sits at the bottom of the
/// stack, so there is always an active policy.
#[derive(Debug)]
pub struct PolicyStore {
    policies: AHashMap<String, CollectionPolicy>,
    stack: Vec<String>,
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore {
    pub fn new() -> Self {
        let mut policies = AHashMap::new();
        policies.insert(DEFAULT_POLICY.to_string(), CollectionPolicy::default());
        Self {
            policies,
            stack: vec![DEFAULT_POLICY.to_string()],
        }
    }

    /// Register (or replace) a named policy.
    pub fn register(&mut self, name: &str, policy: CollectionPolicy) {
        self.policies.insert(name.to_string(), policy);
    }

    pub fn get(&self, name: &str) -> Option<&CollectionPolicy> {
        self.policies.get(name)
    }

    pub fn active_name(&self) -> &str {
        // Invariant: the stack is never empty after construction.
        self.stack.last().map(String::as_str).unwrap_or(DEFAULT_POLICY)
    }

    pub fn active(&self) -> &CollectionPolicy {
        self.policies
            .get(self.active_name())
            .or_else(|| self.policies.get(DEFAULT_POLICY))
            .expect("default policy always registered")
    }

    /// Persistent switch: replaces the current activation frame.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        self.check_known(name)?;
        if let Some(top) = self.stack.last_mut() {
            *top = name.to_string();
        }
        Ok(())
    }

    /// Scoped switch: the returned guard restores the previously active
    /// policy when dropped, whether the scope succeeded or failed.
    pub fn scoped(&mut self, name: &str) -> Result<PolicyScope<'_>> {
        self.check_known(name)?;
        self.stack.push(name.to_string());
        Ok(PolicyScope { store: self })
    }

    fn check_known(&self, name: &str) -> Result<()> {
        if self.policies.contains_key(name) {
            Ok(())
        } else {
            Err(Error::config(format!("unknown policy: {}", name)))
        }
    }
}

/// RAII guard for a scoped policy activation.
pub struct PolicyScope<'a> {
    store: &'a mut PolicyStore,
}

impl Deref for PolicyScope<'_> {
    type Target = PolicyStore;

    fn deref(&self) -> &PolicyStore {
        self.store
    }
}

impl DerefMut for PolicyScope<'_> {
    fn deref_mut(&mut self) -> &mut PolicyStore {
        self.store
    }
}

impl Drop for PolicyScope<'_> {
    fn drop(&mut self) {
        // Only ever pops the frame pushed by `scoped`; the bottom frame is
        // unreachable from here.
        self.store.stack.pop();
    }
}
