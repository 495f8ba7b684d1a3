//! Predicate Compiler
//!
//! Translates each rule into the predicate its violations satisfy, and
//! folds active Critical/High rules into one anomaly filter per category.
//! Counters, listings and per-branch aggregates all consume these filters.

use super::catalog::{FormatCheck, RuleExpr, ValidationRule};
use super::error::ConfigurationError;
use super::predicate::{CharClass, Predicate};
use crate::models::{ClientCategory, Field};

#[derive(Debug, Clone)]
pub struct CompiledFilters {
    individual: Predicate,
    corporate: Predicate,
    institutional: Predicate,
    by_rule: Vec<(String, Predicate)>,
}

impl CompiledFilters {
    /// Anomaly filter for rows already known to be of `category`.
    pub fn for_category(&self, category: ClientCategory) -> &Predicate {
        match category {
            ClientCategory::Individual => &self.individual,
            ClientCategory::Corporate => &self.corporate,
            ClientCategory::Institutional => &self.institutional,
        }
    }

    /// Violation predicate of a single rule, whatever its severity or state.
    pub fn for_rule(&self, rule_id: &str) -> Option<&Predicate> {
        self.by_rule.iter().find(|(id, _)| id == rule_id).map(|(_, p)| p)
    }

    /// Cross-category anomaly filter. Rows with a missing or unknown
    /// category code are anomalies too.
    pub fn any_category(&self) -> Predicate {
        let mut any: Vec<Predicate> = ClientCategory::ALL
            .iter()
            .map(|c| in_category(*c, self.for_category(*c).clone()))
            .collect();
        any.push(unknown_category());
        Predicate::or(any)
    }
}

/// `tcli = code AND filter`
pub fn in_category(category: ClientCategory, filter: Predicate) -> Predicate {
    Predicate::and(vec![Predicate::equals(Field::Tcli, category.code()), filter])
}

pub fn unknown_category() -> Predicate {
    Predicate::negate(Predicate::In {
        field: Field::Tcli,
        values: ClientCategory::ALL.iter().map(|c| c.code().to_string()).collect(),
    })
}

pub fn compile(rules: &[ValidationRule]) -> Result<CompiledFilters, ConfigurationError> {
    let mut by_rule = Vec::with_capacity(rules.len());
    for rule in rules {
        by_rule.push((rule.id.clone(), rule_violation(rule)?));
    }

    let category_filter = |category: ClientCategory| {
        let parts: Vec<Predicate> = rules
            .iter()
            .zip(&by_rule)
            .filter(|(rule, _)| {
                rule.is_active
                    && rule.severity.is_blocking()
                    && rule.client_category.applies_to(category)
            })
            .map(|(_, (_, predicate))| predicate.clone())
            .collect();
        Predicate::or(parts)
    };

    Ok(CompiledFilters {
        individual: category_filter(ClientCategory::Individual),
        corporate: category_filter(ClientCategory::Corporate),
        institutional: category_filter(ClientCategory::Institutional),
        by_rule,
    })
}

/// Predicate matched exactly by the records that break `rule`.
pub fn rule_violation(rule: &ValidationRule) -> Result<Predicate, ConfigurationError> {
    let field = rule.field;
    let present = || Predicate::negate(Predicate::blank(field));

    let predicate = match &rule.expr {
        RuleExpr::Required => Predicate::blank(field),
        RuleExpr::Format { check } => Predicate::and(vec![present(), format_violation(field, check)]),
        RuleExpr::Length { min, max } => {
            let mut bad = Vec::new();
            if let Some(len) = min {
                bad.push(Predicate::ShorterThan { field, len: *len });
            }
            if let Some(len) = max {
                bad.push(Predicate::LongerThan { field, len: *len });
            }
            Predicate::and(vec![present(), Predicate::or(bad)])
        }
        RuleExpr::DateRange { min, max, optional } => {
            let mut bad = vec![Predicate::negate(Predicate::IsoDate { field })];
            if let Some(bound) = min {
                bad.push(Predicate::DateBefore { field, bound: *bound });
            }
            if let Some(bound) = max {
                bad.push(Predicate::DateAfter { field, bound: *bound });
            }
            if *optional {
                Predicate::and(vec![present(), Predicate::or(bad)])
            } else {
                bad.insert(0, Predicate::blank(field));
                Predicate::or(bad)
            }
        }
        RuleExpr::Custom { bulk_filter, .. } => match bulk_filter {
            Some(filter) => filter.clone(),
            None => {
                return Err(ConfigurationError::MissingBulkFilter {
                    rule_id: rule.id.clone(),
                })
            }
        },
    };
    Ok(predicate)
}

fn format_violation(field: Field, check: &FormatCheck) -> Predicate {
    let contains_any = |banned: &[String]| {
        banned
            .iter()
            .map(|needle| Predicate::Contains { field, needle: needle.clone() })
            .collect::<Vec<_>>()
    };

    match check {
        FormatCheck::IdentityNumber { min_len, banned } => {
            let mut bad = vec![
                Predicate::ShorterThan { field, len: *min_len },
                Predicate::HasCharOutside { field, class: CharClass::UpperAlnum },
            ];
            bad.extend(contains_any(banned));
            Predicate::or(bad)
        }
        FormatCheck::OneOf { values } => Predicate::negate(Predicate::In {
            field,
            values: values.clone(),
        }),
        FormatCheck::Prefix { prefix } => Predicate::negate(Predicate::StartsWith {
            field,
            prefix: prefix.clone(),
        }),
        FormatCheck::BannedSubstrings { banned } => Predicate::or(contains_any(banned)),
        FormatCheck::Filler { chars } => Predicate::OnlyChars { field, chars: chars.clone() },
        FormatCheck::Charset { class } => Predicate::HasCharOutside { field, class: *class },
    }
}
