//! Built-in rule set for individuals, corporates and institutionals.

use super::catalog::{FormatCheck, RuleExpr, RuleScope, ValidationRule};
use super::custom::FATCA_STATUS_DOCUMENTED;
use super::predicate::{CharClass, DateBound, Predicate};
use crate::models::{Field, Severity};
use chrono::NaiveDate;

const IDENTIFICATION: &str = "Identification";
const DOCUMENTS: &str = "Documents";
const CLASSIFICATION: &str = "Classification";
const REGULATORY: &str = "Regulatory";
const FORMAT: &str = "Format";

/// Oldest plausible birth or creation date
fn min_plausible_date() -> DateBound {
    DateBound::Fixed(NaiveDate::from_ymd_opt(1915, 1, 1).unwrap_or_default())
}

fn banned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(
    id: &str,
    field: Field,
    scope: RuleScope,
    severity: Severity,
    category: &str,
    expr: RuleExpr,
    message: &str,
) -> ValidationRule {
    ValidationRule {
        id: id.to_string(),
        field,
        client_category: scope,
        expr,
        severity,
        is_active: true,
        category: category.to_string(),
        message: message.to_string(),
    }
}

fn required(id: &str, field: Field, scope: RuleScope, severity: Severity, category: &str, message: &str) -> ValidationRule {
    rule(id, field, scope, severity, category, RuleExpr::Required, message)
}

fn format_rule(
    id: &str,
    field: Field,
    scope: RuleScope,
    severity: Severity,
    category: &str,
    check: FormatCheck,
    message: &str,
) -> ValidationRule {
    rule(id, field, scope, severity, category, RuleExpr::Format { check }, message)
}

fn no_filler() -> FormatCheck {
    FormatCheck::Filler { chars: "Xx".to_string() }
}

fn creation_date(id: &str, scope: RuleScope) -> ValidationRule {
    rule(
        id,
        Field::Datc,
        scope,
        Severity::Critical,
        IDENTIFICATION,
        RuleExpr::DateRange {
            min: Some(min_plausible_date()),
            max: Some(DateBound::Today),
            optional: false,
        },
        "Creation date is required and must be a YYYY-MM-DD date between 1915-01-01 and today",
    )
}

fn individuals() -> Vec<ValidationRule> {
    use super::catalog::RuleScope::Individual as PP;
    vec![
        required("PP_NOM_REQUIRED", Field::Nom, PP, Severity::Critical, IDENTIFICATION, "Surname is required"),
        format_rule("PP_NOM_FILLER", Field::Nom, PP, Severity::Critical, IDENTIFICATION, no_filler(),
            "Surname cannot consist only of X characters"),
        required("PP_PRENOM_REQUIRED", Field::Pre, PP, Severity::Critical, IDENTIFICATION, "First name is required"),
        format_rule("PP_PRENOM_FILLER", Field::Pre, PP, Severity::Critical, IDENTIFICATION, no_filler(),
            "First name cannot consist only of X characters"),
        required("PP_SEXE_REQUIRED", Field::Sext, PP, Severity::High, IDENTIFICATION, "Sex is required"),
        format_rule("PP_SEXE_FORMAT", Field::Sext, PP, Severity::High, IDENTIFICATION,
            FormatCheck::OneOf { values: vec!["M".into(), "F".into()] },
            "Sex must be M (male) or F (female)"),
        required("PP_DNA_REQUIRED", Field::Dna, PP, Severity::Critical, IDENTIFICATION, "Birth date is required"),
        rule("PP_DNA_RANGE", Field::Dna, PP, Severity::High, IDENTIFICATION,
            RuleExpr::DateRange { min: Some(min_plausible_date()), max: Some(DateBound::Today), optional: true },
            "Birth date must be a YYYY-MM-DD date between 1915-01-01 and today"),
        required("PP_NID_REQUIRED", Field::Nid, PP, Severity::High, DOCUMENTS, "Identity document number is required"),
        format_rule("PP_NID_FORMAT", Field::Nid, PP, Severity::High, DOCUMENTS,
            FormatCheck::IdentityNumber { min_len: 8, banned: banned(&["123", "XXX", "000"]) },
            "Identity document number must have at least 8 uppercase alphanumeric characters, without \"123\", \"XXX\" or \"000\""),
        required("PP_TID_REQUIRED", Field::Tid, PP, Severity::High, DOCUMENTS, "Identity document type is required"),
        rule("PP_VID_VALID", Field::Vid, PP, Severity::Critical, DOCUMENTS,
            RuleExpr::DateRange { min: Some(DateBound::Today), max: None, optional: true },
            "Identity document has expired"),
        required("PP_NMER_REQUIRED", Field::Nmer, PP, Severity::Critical, IDENTIFICATION,
            "Mother's name is required for individual clients"),
        required("PP_NAT_REQUIRED", Field::Nat, PP, Severity::Medium, IDENTIFICATION, "Nationality is required"),
        required("PP_VILN_REQUIRED", Field::Viln, PP, Severity::Medium, IDENTIFICATION, "Birth town is required"),
        required("PP_PAYN_REQUIRED", Field::Payn, PP, Severity::Medium, IDENTIFICATION, "Birth country is required"),
        rule("PP_FATCA_STATUS_DOCUMENTED", Field::FatcaStatus, PP, Severity::High, REGULATORY,
            RuleExpr::Custom {
                check: FATCA_STATUS_DOCUMENTED.to_string(),
                bulk_filter: Some(Predicate::and(vec![
                    Predicate::or(vec![
                        Predicate::equals(Field::Nat, "US"),
                        Predicate::equals(Field::Payn, "US"),
                    ]),
                    Predicate::blank(Field::FatcaStatus),
                ])),
            },
            "Clients with US nationality or US birth country need a documented FATCA status"),
    ]
}

fn corporates() -> Vec<ValidationRule> {
    use super::catalog::RuleScope::Corporate as ENT;
    vec![
        required("ENT_RSO_REQUIRED", Field::Rso, ENT, Severity::Critical, IDENTIFICATION, "Company name is required"),
        format_rule("ENT_RSO_FORMAT", Field::Rso, ENT, Severity::Critical, IDENTIFICATION,
            FormatCheck::BannedSubstrings { banned: banned(&["123", "XXX"]) },
            "Company name cannot contain \"123\" or \"XXX\""),
        required("ENT_NRC_REQUIRED", Field::Nrc, ENT, Severity::Critical, IDENTIFICATION,
            "Trade registry number is required"),
        format_rule("ENT_NRC_PREFIX", Field::Nrc, ENT, Severity::High, IDENTIFICATION,
            FormatCheck::Prefix { prefix: "MA".into() },
            "Trade registry number has an invalid prefix: it must start with \"MA\""),
        format_rule("ENT_NRC_FORMAT", Field::Nrc, ENT, Severity::High, IDENTIFICATION,
            FormatCheck::BannedSubstrings { banned: banned(&["123", "XXX", "000"]) },
            "Trade registry number cannot contain \"123\", \"XXX\" or \"000\""),
        creation_date("ENT_DATC_VALID", ENT),
        required("ENT_SEC_REQUIRED", Field::Sec, ENT, Severity::High, CLASSIFICATION, "Activity sector is required"),
        required("ENT_FJU_REQUIRED", Field::Fju, ENT, Severity::High, CLASSIFICATION, "Legal form is required"),
        required("ENT_CATN_REQUIRED", Field::Catn, ENT, Severity::High, REGULATORY,
            "Central-bank category is required"),
        format_rule("ENT_SIG_FORMAT", Field::Sig, ENT, Severity::Medium, FORMAT,
            FormatCheck::Charset { class: CharClass::Acronym },
            "Acronym may only contain uppercase letters, digits, dashes, dots and spaces"),
        rule("ENT_SIG_LENGTH", Field::Sig, ENT, Severity::Medium, FORMAT,
            RuleExpr::Length { min: None, max: Some(20) },
            "Acronym cannot exceed 20 characters"),
        required("ENT_LIENBQ_REQUIRED", Field::Lienbq, ENT, Severity::Medium, REGULATORY,
            "Relationship with the bank is required"),
    ]
}

fn institutionals() -> Vec<ValidationRule> {
    use super::catalog::RuleScope::Institutional as INST;
    vec![
        required("INST_RSO_REQUIRED", Field::Rso, INST, Severity::Critical, IDENTIFICATION, "Institution name is required"),
        format_rule("INST_RSO_FORMAT", Field::Rso, INST, Severity::Critical, IDENTIFICATION,
            FormatCheck::BannedSubstrings { banned: banned(&["123", "XXX"]) },
            "Institution name cannot contain \"123\" or \"XXX\""),
        required("INST_NRC_REQUIRED", Field::Nrc, INST, Severity::Critical, IDENTIFICATION,
            "Registry number is required"),
        format_rule("INST_NRC_FORMAT", Field::Nrc, INST, Severity::Critical, IDENTIFICATION,
            FormatCheck::BannedSubstrings { banned: banned(&["123", "XXX", "000"]) },
            "Registry number cannot contain \"123\", \"XXX\" or \"000\""),
        creation_date("INST_DATC_VALID", INST),
        required("INST_SEC_REQUIRED", Field::Sec, INST, Severity::High, CLASSIFICATION, "Activity sector is required"),
        required("INST_FJU_REQUIRED", Field::Fju, INST, Severity::High, CLASSIFICATION, "Legal form is required"),
        required("INST_CATN_REQUIRED", Field::Catn, INST, Severity::High, REGULATORY,
            "Central-bank category is required"),
        required("INST_LIENBQ_REQUIRED", Field::Lienbq, INST, Severity::Medium, REGULATORY,
            "Relationship with the bank is required"),
    ]
}

fn common() -> Vec<ValidationRule> {
    vec![
        required("ALL_CLI_REQUIRED", Field::Cli, RuleScope::Common, Severity::Critical, IDENTIFICATION,
            "Client code is required"),
        required("ALL_AGE_REQUIRED", Field::Age, RuleScope::Common, Severity::High, IDENTIFICATION,
            "Branch code is required"),
    ]
}

pub fn rules() -> Vec<ValidationRule> {
    let mut rules = common();
    rules.extend(individuals());
    rules.extend(corporates());
    rules.extend(institutionals());
    rules
}
