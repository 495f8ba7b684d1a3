//! Rule-engine errors

use std::fmt;

/// Malformed or unusable rule definitions, and records the engine cannot
/// classify. Never swallowed: always reaches the caller of load/evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Definition could not be parsed (unknown kind, field, category...).
    Malformed(String),
    DuplicateRuleId(String),
    UnknownCustomCheck { rule_id: String, check: String },
    /// Custom rule without the set-oriented fragment bulk scans need.
    MissingBulkFilter { rule_id: String },
    InvalidRule { rule_id: String, reason: String },
    /// Record whose category discriminant is missing or not 1/2/3.
    UnknownCategory { client: Option<String>, code: Option<String> },
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed rule definition: {}", msg),
            Self::DuplicateRuleId(id) => write!(f, "duplicate rule id: {}", id),
            Self::UnknownCustomCheck { rule_id, check } => {
                write!(f, "rule {} references unknown custom check `{}`", rule_id, check)
            }
            Self::MissingBulkFilter { rule_id } => {
                write!(f, "custom rule {} has no bulk filter and cannot be compiled", rule_id)
            }
            Self::InvalidRule { rule_id, reason } => write!(f, "rule {} is invalid: {}", rule_id, reason),
            Self::UnknownCategory { client, code } => write!(
                f,
                "client {} has unknown category code {}",
                client.as_deref().unwrap_or("<none>"),
                code.as_deref().unwrap_or("<none>")
            ),
        }
    }
}

impl std::error::Error for ConfigurationError {}

/// Catalog management failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEditError {
    NotFound(String),
    /// The edited catalog would not load; the live catalog is unchanged.
    Invalid(ConfigurationError),
}

impl fmt::Display for RuleEditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "rule not found: {}", id),
            Self::Invalid(err) => write!(f, "rule change rejected: {}", err),
        }
    }
}

impl std::error::Error for RuleEditError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Invalid(err) => Some(err),
            Self::NotFound(_) => None,
        }
    }
}

impl From<ConfigurationError> for RuleEditError {
    fn from(err: ConfigurationError) -> Self {
        Self::Invalid(err)
    }
}
