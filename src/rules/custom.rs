//! Named checks for rules the declarative kinds cannot express.
//!
//! A custom check is a plain function of the record and the evaluation day.
//! Rules reference checks by name; the catalog resolves every name at load.

use super::predicate::is_blank;
use crate::models::ClientRecord;
use chrono::NaiveDate;
use std::collections::HashMap;

/// Returns `true` when the record violates the check.
pub type CustomCheck = fn(&ClientRecord, NaiveDate) -> bool;

pub const FATCA_STATUS_DOCUMENTED: &str = "fatca_status_documented";

#[derive(Clone, Default)]
pub struct CustomRegistry {
    checks: HashMap<String, CustomCheck>,
}

impl CustomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks shipped with the built-in catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(FATCA_STATUS_DOCUMENTED, fatca_status_documented);
        registry
    }

    pub fn register(&mut self, name: &str, check: CustomCheck) {
        self.checks.insert(name.to_string(), check);
    }

    pub fn get(&self, name: &str) -> Option<CustomCheck> {
        self.checks.get(name).copied()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.checks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for CustomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomRegistry").field("checks", &self.names()).finish()
    }
}

/// US nationality or US birth country requires a documented FATCA status.
fn fatca_status_documented(record: &ClientRecord, _today: NaiveDate) -> bool {
    let us_person = record.nat.as_deref() == Some("US") || record.payn.as_deref() == Some("US");
    us_person && is_blank(record.fatca_status.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatca_check_only_targets_us_persons() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let check = CustomRegistry::builtin().get(FATCA_STATUS_DOCUMENTED).unwrap();

        let mut record = ClientRecord::default();
        assert!(!check(&record, today));

        record.payn = Some("US".into());
        assert!(check(&record, today));

        record.fatca_status = Some("  ".into());
        assert!(check(&record, today));

        record.fatca_status = Some("DOCUMENTED".into());
        assert!(!check(&record, today));
    }
}
