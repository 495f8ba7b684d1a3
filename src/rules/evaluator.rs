//! Record Evaluator
//!
//! Runs the catalog against one in-memory record. Pure: same record, same
//! catalog, same day give the same result, in catalog order.

use super::catalog::{FormatCheck, RuleCatalog, RuleExpr, ValidationRule};
use super::error::ConfigurationError;
use super::predicate::{is_blank, parse_iso_date, CharClass};
use crate::models::{ClientRecord, Field, Severity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Critical/High finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub field: Field,
    pub message: String,
    pub severity: Severity,
    pub value: Option<String>,
}

/// Medium/Low finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWarning {
    pub rule_id: String,
    pub field: Field,
    pub message: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<RuleViolation>,
    pub warnings: Vec<RuleWarning>,
}

/// Evaluate every active rule that applies to the record's category.
///
/// Fails closed with [`ConfigurationError::UnknownCategory`] when the
/// category discriminant is missing or unknown.
pub fn evaluate(
    record: &ClientRecord,
    catalog: &RuleCatalog,
    today: NaiveDate,
) -> Result<ValidationResult, ConfigurationError> {
    let category = record.category().ok_or_else(|| ConfigurationError::UnknownCategory {
        client: record.cli.clone(),
        code: record.tcli.clone(),
    })?;

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for rule in catalog.applicable(category) {
        if !violates(rule, record, catalog, today)? {
            continue;
        }
        let value = record.get(rule.field).map(str::to_string);
        if rule.severity.is_blocking() {
            errors.push(RuleViolation {
                rule_id: rule.id.clone(),
                field: rule.field,
                message: rule.message.clone(),
                severity: rule.severity,
                value,
            });
        } else {
            warnings.push(RuleWarning {
                rule_id: rule.id.clone(),
                field: rule.field,
                message: rule.message.clone(),
                value,
            });
        }
    }

    Ok(ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    })
}

/// Whether `record` breaks `rule`, regardless of severity or activation.
pub fn violates(
    rule: &ValidationRule,
    record: &ClientRecord,
    catalog: &RuleCatalog,
    today: NaiveDate,
) -> Result<bool, ConfigurationError> {
    let value = record.get(rule.field);
    let present = value.filter(|v| !is_blank(Some(*v)));

    let broken = match &rule.expr {
        RuleExpr::Required => present.is_none(),
        RuleExpr::Format { check } => present.map_or(false, |v| !format_accepts(check, v)),
        RuleExpr::Length { min, max } => present.map_or(false, |v| {
            let len = v.chars().count();
            min.map_or(false, |m| len < m) || max.map_or(false, |m| len > m)
        }),
        RuleExpr::DateRange { min, max, optional } => match present {
            None => !optional,
            Some(v) => match parse_iso_date(v) {
                None => true,
                Some(date) => {
                    min.map_or(false, |b| date < b.resolve(today))
                        || max.map_or(false, |b| date > b.resolve(today))
                }
            },
        },
        RuleExpr::Custom { check, .. } => {
            let custom = catalog.custom_check(check).ok_or_else(|| {
                ConfigurationError::UnknownCustomCheck {
                    rule_id: rule.id.clone(),
                    check: check.clone(),
                }
            })?;
            custom(record, today)
        }
    };
    Ok(broken)
}

fn format_accepts(check: &FormatCheck, value: &str) -> bool {
    let free_of = |banned: &[String]| !banned.iter().any(|b| value.contains(b.as_str()));

    match check {
        FormatCheck::IdentityNumber { min_len, banned } => {
            value.chars().count() >= *min_len
                && value.chars().all(|c| CharClass::UpperAlnum.contains(c))
                && free_of(banned)
        }
        FormatCheck::OneOf { values } => values.iter().any(|v| v == value),
        FormatCheck::Prefix { prefix } => value.starts_with(prefix.as_str()),
        FormatCheck::BannedSubstrings { banned } => free_of(banned),
        FormatCheck::Filler { chars } => !value.chars().all(|c| chars.contains(c)),
        FormatCheck::Charset { class } => value.chars().all(|c| class.contains(c)),
    }
}
