//! Rule Catalog
//!
//! Typed rule definitions, catalog loading/validation, and the live
//! [`RuleBook`] that publishes edited catalogs with a single atomic swap.

use super::builtin;
use super::compiler::{self, CompiledFilters};
use super::custom::{CustomCheck, CustomRegistry};
use super::error::{ConfigurationError, RuleEditError};
use super::predicate::{CharClass, DateBound, Predicate};
use crate::models::{ClientCategory, Field, Severity};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Which client categories a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Individual,
    Corporate,
    Institutional,
    Common,
}

impl RuleScope {
    pub fn applies_to(&self, category: ClientCategory) -> bool {
        match self {
            RuleScope::Common => true,
            scope => *scope == RuleScope::from(category),
        }
    }
}

impl From<ClientCategory> for RuleScope {
    fn from(category: ClientCategory) -> Self {
        match category {
            ClientCategory::Individual => RuleScope::Individual,
            ClientCategory::Corporate => RuleScope::Corporate,
            ClientCategory::Institutional => RuleScope::Institutional,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Required,
    Format,
    Length,
    DateRange,
    Custom,
}

/// Field-specific recognizers for `format` rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FormatCheck {
    /// At least `min_len` uppercase alphanumerics, none of `banned` inside
    IdentityNumber { min_len: usize, banned: Vec<String> },
    OneOf { values: Vec<String> },
    Prefix { prefix: String },
    BannedSubstrings { banned: Vec<String> },
    /// Rejects placeholder values made only of these characters
    Filler { chars: String },
    Charset { class: CharClass },
}

/// Closed set of rule expressions shared by the evaluator and the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleExpr {
    Required,
    Format {
        check: FormatCheck,
    },
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    /// Inclusive bounds. An `optional` date passes when blank.
    DateRange {
        #[serde(default)]
        min: Option<DateBound>,
        #[serde(default)]
        max: Option<DateBound>,
        #[serde(default)]
        optional: bool,
    },
    Custom {
        check: String,
        #[serde(default)]
        bulk_filter: Option<Predicate>,
    },
}

impl RuleExpr {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleExpr::Required => RuleKind::Required,
            RuleExpr::Format { .. } => RuleKind::Format,
            RuleExpr::Length { .. } => RuleKind::Length,
            RuleExpr::DateRange { .. } => RuleKind::DateRange,
            RuleExpr::Custom { .. } => RuleKind::Custom,
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub id: String,
    pub field: Field,
    pub client_category: RuleScope,
    pub expr: RuleExpr,
    pub severity: Severity,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Display grouping only
    #[serde(default)]
    pub category: String,
    pub message: String,
}

impl ValidationRule {
    pub fn rule_kind(&self) -> RuleKind {
        self.expr.kind()
    }
}

/// Validated, compiled rule set. Immutable once built.
#[derive(Debug, Clone)]
pub struct RuleCatalog {
    rules: Vec<ValidationRule>,
    registry: CustomRegistry,
    filters: CompiledFilters,
    generation: u64,
}

impl RuleCatalog {
    /// Validate every rule and compile the bulk filters.
    pub fn new(
        rules: Vec<ValidationRule>,
        registry: CustomRegistry,
    ) -> Result<Self, ConfigurationError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigurationError::DuplicateRuleId(rule.id.clone()));
            }
            validate_rule(rule, &registry)?;
        }
        let filters = compiler::compile(&rules)?;
        Ok(Self {
            rules,
            registry,
            filters,
            generation: 0,
        })
    }

    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::new(builtin::rules(), CustomRegistry::builtin())
    }

    /// JSON array of rule definitions.
    pub fn from_json(json: &str, registry: CustomRegistry) -> Result<Self, ConfigurationError> {
        let rules: Vec<ValidationRule> = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::Malformed(e.to_string()))?;
        Self::new(rules, registry)
    }

    pub fn load(path: &Path, registry: CustomRegistry) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::Malformed(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&json, registry)?;
        info!("📚 Loaded {} rules from {}", catalog.rules.len(), path.display());
        Ok(catalog)
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&ValidationRule> {
        self.rules.iter().find(|r| r.id == id)
    }

    /// Active rules for a category (its own and common ones), catalog order.
    pub fn applicable(&self, category: ClientCategory) -> impl Iterator<Item = &ValidationRule> {
        self.rules
            .iter()
            .filter(move |r| r.is_active && r.client_category.applies_to(category))
    }

    pub fn filters(&self) -> &CompiledFilters {
        &self.filters
    }

    pub fn registry(&self) -> &CustomRegistry {
        &self.registry
    }

    /// Bumped by every published edit. Results computed under one
    /// generation must not be served under another.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn custom_check(&self, name: &str) -> Option<CustomCheck> {
        self.registry.get(name)
    }
}

fn invalid(rule: &ValidationRule, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidRule {
        rule_id: rule.id.clone(),
        reason: reason.into(),
    }
}

fn validate_rule(rule: &ValidationRule, registry: &CustomRegistry) -> Result<(), ConfigurationError> {
    if rule.id.trim().is_empty() {
        return Err(ConfigurationError::Malformed("rule with empty id".to_string()));
    }

    match &rule.expr {
        RuleExpr::Required => Ok(()),
        RuleExpr::Format { check } => match check {
            FormatCheck::IdentityNumber { banned, .. } | FormatCheck::BannedSubstrings { banned }
                if banned.iter().any(|b| b.is_empty()) =>
            {
                Err(invalid(rule, "banned substrings must not be empty"))
            }
            FormatCheck::BannedSubstrings { banned } if banned.is_empty() => {
                Err(invalid(rule, "no banned substrings listed"))
            }
            FormatCheck::OneOf { values } if values.is_empty() => {
                Err(invalid(rule, "no allowed values listed"))
            }
            FormatCheck::Prefix { prefix } if prefix.is_empty() => {
                Err(invalid(rule, "empty prefix"))
            }
            FormatCheck::Filler { chars }
                if chars.is_empty() || !chars.chars().all(|c| c.is_ascii_alphanumeric()) =>
            {
                Err(invalid(rule, "filler characters must be ASCII alphanumerics"))
            }
            _ => Ok(()),
        },
        RuleExpr::Length { min, max } => match (min, max) {
            (None, None) => Err(invalid(rule, "length rule without bounds")),
            (Some(lo), Some(hi)) if lo > hi => Err(invalid(rule, "min length above max length")),
            _ => Ok(()),
        },
        RuleExpr::DateRange { min, max, .. } => match (min, max) {
            (Some(DateBound::Fixed(lo)), Some(DateBound::Fixed(hi))) if lo > hi => {
                Err(invalid(rule, "min date after max date"))
            }
            _ => Ok(()),
        },
        RuleExpr::Custom { check, bulk_filter } => {
            if registry.get(check).is_none() {
                return Err(ConfigurationError::UnknownCustomCheck {
                    rule_id: rule.id.clone(),
                    check: check.clone(),
                });
            }
            match bulk_filter {
                Some(filter) => filter.validate().map_err(|reason| invalid(rule, reason)),
                None => Ok(()),
            }
        }
    }
}

/// Live catalog. Readers take lock-free snapshots; edits are serialized,
/// validated as a whole, then published atomically.
pub struct RuleBook {
    current: ArcSwap<RuleCatalog>,
    edit_lock: Mutex<()>,
}

impl RuleBook {
    pub fn new(catalog: RuleCatalog) -> Self {
        Self {
            current: ArcSwap::from_pointee(catalog),
            edit_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleCatalog> {
        self.current.load_full()
    }

    /// All rules (active or not) that apply to `category`; every rule when `None`.
    pub fn list(&self, category: Option<ClientCategory>) -> Vec<ValidationRule> {
        let catalog = self.current.load();
        catalog
            .rules()
            .iter()
            .filter(|r| category.map_or(true, |c| r.client_category.applies_to(c)))
            .cloned()
            .collect()
    }

    pub fn add(&self, rule: ValidationRule) -> Result<(), RuleEditError> {
        let id = rule.id.clone();
        self.edit(|rules| {
            rules.push(rule);
            Ok(())
        })?;
        info!("➕ Rule {} added", id);
        Ok(())
    }

    /// Replace rule `id`; the replacement keeps the id.
    pub fn update(&self, id: &str, mut rule: ValidationRule) -> Result<(), RuleEditError> {
        rule.id = id.to_string();
        self.edit(|rules| {
            let slot = rules
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| RuleEditError::NotFound(id.to_string()))?;
            *slot = rule;
            Ok(())
        })?;
        info!("✏️ Rule {} updated", id);
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<ValidationRule, RuleEditError> {
        let removed = self.edit(|rules| {
            let pos = rules
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| RuleEditError::NotFound(id.to_string()))?;
            Ok(rules.remove(pos))
        })?;
        info!("🗑️ Rule {} deleted", id);
        Ok(removed)
    }

    /// Flip `is_active`; returns the new state.
    pub fn toggle(&self, id: &str) -> Result<bool, RuleEditError> {
        let active = self.edit(|rules| {
            let rule = rules
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| RuleEditError::NotFound(id.to_string()))?;
            rule.is_active = !rule.is_active;
            Ok(rule.is_active)
        })?;
        info!("🔁 Rule {} is now {}", id, if active { "active" } else { "inactive" });
        Ok(active)
    }

    fn edit<T>(
        &self,
        change: impl FnOnce(&mut Vec<ValidationRule>) -> Result<T, RuleEditError>,
    ) -> Result<T, RuleEditError> {
        let _guard = self.edit_lock.lock();
        let current = self.current.load_full();
        let mut rules = current.rules().to_vec();
        let out = change(&mut rules)?;
        let mut next = RuleCatalog::new(rules, current.registry().clone())?;
        next.generation = current.generation + 1;
        self.current.store(Arc::new(next));
        Ok(out)
    }
}
