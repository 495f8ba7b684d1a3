//! Data-quality rule engine
//!
//! One closed rule vocabulary, two interpreters: [`evaluator`] checks a
//! single record in memory, [`compiler`] turns the same rules into store
//! filters for bulk anomaly scans. Both must agree on every record.

mod builtin;
pub mod catalog;
pub mod compiler;
pub mod custom;
pub mod error;
pub mod evaluator;
pub mod predicate;

pub use catalog::{FormatCheck, RuleBook, RuleCatalog, RuleExpr, RuleKind, RuleScope, ValidationRule};
pub use compiler::CompiledFilters;
pub use custom::CustomRegistry;
pub use error::{ConfigurationError, RuleEditError};
pub use evaluator::{evaluate, RuleViolation, RuleWarning, ValidationResult};
pub use predicate::{CharClass, DateBound, Predicate, SqlFilter};
