//! Set-oriented record filters
//!
//! A [`Predicate`] is a closed boolean expression over client attributes.
//! The same value is rendered to a SQLite `WHERE` fragment for bulk scans
//! and interpreted in memory (demo tier, FATCA indicia, tests).
//!
//! Every leaf except [`Predicate::Blank`] is false on a missing value and
//! renders as `(col IS NOT NULL AND ...)`, so SQL never sees an unknown
//! truth value and `NOT` behaves the same on both sides.

use crate::models::{ClientRecord, Field};
use crate::store::SqlParam;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Characters stripped before a value counts as blank (SQL `TRIM` set).
pub const BLANK_CHARS: [char; 4] = [' ', '\t', '\n', '\r'];
const SQL_BLANK_CHARS: &str = "char(32, 9, 10, 13)";

pub fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim_matches(&BLANK_CHARS[..]).is_empty())
}

/// Strict `YYYY-MM-DD`; anything SQLite's `date()` would rewrite is rejected.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Date bound, either fixed or the evaluation day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateBound {
    Today,
    Fixed(NaiveDate),
}

impl DateBound {
    pub fn resolve(&self, today: NaiveDate) -> NaiveDate {
        match self {
            DateBound::Today => today,
            DateBound::Fixed(d) => *d,
        }
    }
}

/// ASCII character classes used by format checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharClass {
    /// `0-9 A-Z`
    UpperAlnum,
    /// `0-9 A-Z`, dot, dash and space
    Acronym,
}

impl CharClass {
    pub fn contains(&self, c: char) -> bool {
        match self {
            CharClass::UpperAlnum => c.is_ascii_digit() || c.is_ascii_uppercase(),
            CharClass::Acronym => {
                c.is_ascii_digit() || c.is_ascii_uppercase() || matches!(c, '.' | '-' | ' ')
            }
        }
    }

    /// Body of a GLOB bracket expression; a trailing `-` is literal.
    fn glob_set(&self) -> &'static str {
        match self {
            CharClass::UpperAlnum => "0-9A-Z",
            CharClass::Acronym => "0-9A-Z. -",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Missing, or empty once [`BLANK_CHARS`] are trimmed
    Blank { field: Field },
    Equals { field: Field, value: String },
    In { field: Field, values: Vec<String> },
    Contains { field: Field, needle: String },
    StartsWith { field: Field, prefix: String },
    /// Character count below `len`
    ShorterThan { field: Field, len: usize },
    LongerThan { field: Field, len: usize },
    HasCharOutside { field: Field, class: CharClass },
    /// Non-empty and made only of `chars` (ASCII alphanumerics)
    OnlyChars { field: Field, chars: String },
    IsoDate { field: Field },
    /// Text comparison; meaningful once the value is an ISO date
    DateBefore { field: Field, bound: DateBound },
    DateAfter { field: Field, bound: DateBound },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { not: Box<Predicate> },
}

/// Rendered `WHERE` fragment with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlParam>,
}

impl Predicate {
    pub fn blank(field: Field) -> Self {
        Predicate::Blank { field }
    }

    pub fn equals(field: Field, value: impl Into<String>) -> Self {
        Predicate::Equals { field, value: value.into() }
    }

    pub fn negate(inner: Predicate) -> Self {
        Predicate::Not { not: Box::new(inner) }
    }

    /// Conjunction; a single operand is returned as is.
    pub fn and(mut all: Vec<Predicate>) -> Self {
        if all.len() == 1 {
            return all.remove(0);
        }
        Predicate::And { all }
    }

    /// Disjunction; empty is `false`, a single operand is returned as is.
    pub fn or(mut any: Vec<Predicate>) -> Self {
        if any.len() == 1 {
            return any.remove(0);
        }
        Predicate::Or { any }
    }

    pub fn never() -> Self {
        Predicate::Or { any: Vec::new() }
    }

    /// Structural checks a predicate must pass before it can be rendered.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Predicate::In { field, values } if values.is_empty() => {
                Err(format!("`in` on {} has no values", field))
            }
            Predicate::OnlyChars { field, chars } => {
                if chars.is_empty() || !chars.chars().all(|c| c.is_ascii_alphanumeric()) {
                    Err(format!("`only_chars` on {} needs ASCII alphanumerics", field))
                } else {
                    Ok(())
                }
            }
            Predicate::And { all } => all.iter().try_for_each(Predicate::validate),
            Predicate::Or { any } => any.iter().try_for_each(Predicate::validate),
            Predicate::Not { not } => not.validate(),
            _ => Ok(()),
        }
    }

    /// In-memory interpretation, identical in meaning to [`Predicate::to_sql`].
    pub fn matches(&self, record: &ClientRecord, today: NaiveDate) -> bool {
        match self {
            Predicate::Blank { field } => is_blank(record.get(*field)),
            Predicate::Equals { field, value } => record.get(*field) == Some(value.as_str()),
            Predicate::In { field, values } => record
                .get(*field)
                .map_or(false, |v| values.iter().any(|x| x == v)),
            Predicate::Contains { field, needle } => {
                record.get(*field).map_or(false, |v| v.contains(needle.as_str()))
            }
            Predicate::StartsWith { field, prefix } => {
                record.get(*field).map_or(false, |v| v.starts_with(prefix.as_str()))
            }
            Predicate::ShorterThan { field, len } => {
                record.get(*field).map_or(false, |v| v.chars().count() < *len)
            }
            Predicate::LongerThan { field, len } => {
                record.get(*field).map_or(false, |v| v.chars().count() > *len)
            }
            Predicate::HasCharOutside { field, class } => record
                .get(*field)
                .map_or(false, |v| v.chars().any(|c| !class.contains(c))),
            Predicate::OnlyChars { field, chars } => record
                .get(*field)
                .map_or(false, |v| !v.is_empty() && v.chars().all(|c| chars.contains(c))),
            Predicate::IsoDate { field } => record
                .get(*field)
                .map_or(false, |v| parse_iso_date(v).is_some()),
            Predicate::DateBefore { field, bound } => record
                .get(*field)
                .map_or(false, |v| v < bound_text(bound, today).as_str()),
            Predicate::DateAfter { field, bound } => record
                .get(*field)
                .map_or(false, |v| v > bound_text(bound, today).as_str()),
            Predicate::And { all } => all.iter().all(|p| p.matches(record, today)),
            Predicate::Or { any } => any.iter().any(|p| p.matches(record, today)),
            Predicate::Not { not } => !not.matches(record, today),
        }
    }

    /// Render against SQLite. Column names come from [`Field`], values are
    /// always bound.
    pub fn to_sql(&self, today: NaiveDate) -> SqlFilter {
        let mut params = Vec::new();
        let clause = self.render(today, &mut params);
        SqlFilter { clause, params }
    }

    fn render(&self, today: NaiveDate, params: &mut Vec<SqlParam>) -> String {
        match self {
            Predicate::Blank { field } => {
                format!("({f} IS NULL OR TRIM({f}, {ws}) = '')", f = field, ws = SQL_BLANK_CHARS)
            }
            Predicate::Equals { field, value } => {
                params.push(SqlParam::Text(value.clone()));
                format!("({f} IS NOT NULL AND {f} = ?)", f = field)
            }
            Predicate::In { field, values } => {
                if values.is_empty() {
                    return "0".to_string();
                }
                params.extend(values.iter().cloned().map(SqlParam::Text));
                let slots = vec!["?"; values.len()].join(", ");
                format!("({f} IS NOT NULL AND {f} IN ({slots}))", f = field, slots = slots)
            }
            Predicate::Contains { field, needle } => {
                params.push(SqlParam::Text(needle.clone()));
                format!("({f} IS NOT NULL AND instr({f}, ?) > 0)", f = field)
            }
            Predicate::StartsWith { field, prefix } => {
                params.push(SqlParam::Text(prefix.clone()));
                format!(
                    "({f} IS NOT NULL AND substr({f}, 1, {n}) = ?)",
                    f = field,
                    n = prefix.chars().count()
                )
            }
            Predicate::ShorterThan { field, len } => {
                format!("({f} IS NOT NULL AND length({f}) < {n})", f = field, n = len)
            }
            Predicate::LongerThan { field, len } => {
                format!("({f} IS NOT NULL AND length({f}) > {n})", f = field, n = len)
            }
            Predicate::HasCharOutside { field, class } => {
                params.push(SqlParam::Text(format!("*[^{}]*", class.glob_set())));
                format!("({f} IS NOT NULL AND {f} GLOB ?)", f = field)
            }
            Predicate::OnlyChars { field, chars } => {
                params.push(SqlParam::Text(format!("*[^{}]*", chars)));
                format!("({f} IS NOT NULL AND {f} <> '' AND {f} NOT GLOB ?)", f = field)
            }
            Predicate::IsoDate { field } => format!(
                "({f} IS NOT NULL AND date({f}) IS NOT NULL AND date({f}) = {f})",
                f = field
            ),
            Predicate::DateBefore { field, bound } => {
                params.push(SqlParam::Text(bound_text(bound, today)));
                format!("({f} IS NOT NULL AND {f} < ?)", f = field)
            }
            Predicate::DateAfter { field, bound } => {
                params.push(SqlParam::Text(bound_text(bound, today)));
                format!("({f} IS NOT NULL AND {f} > ?)", f = field)
            }
            Predicate::And { all } => join(all, " AND ", "1", today, params),
            Predicate::Or { any } => join(any, " OR ", "0", today, params),
            Predicate::Not { not } => format!("(NOT {})", not.render(today, params)),
        }
    }
}

fn bound_text(bound: &DateBound, today: NaiveDate) -> String {
    bound.resolve(today).format("%Y-%m-%d").to_string()
}

fn join(
    parts: &[Predicate],
    op: &str,
    empty: &str,
    today: NaiveDate,
    params: &mut Vec<SqlParam>,
) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = parts.iter().map(|p| p.render(today, params)).collect();
    format!("({})", rendered.join(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::{params_from_iter, Connection};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    /// Evaluate the rendered filter against a one-column table.
    fn sql_matches(predicate: &Predicate, value: Option<&str>) -> bool {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE clients (nid TEXT, dna TEXT);").unwrap();
        conn.execute("INSERT INTO clients (nid, dna) VALUES (?1, ?1)", [value]).unwrap();
        let filter = predicate.to_sql(today());
        let sql = format!("SELECT COUNT(*) FROM clients WHERE {}", filter.clause);
        let count: i64 = conn
            .query_row(&sql, params_from_iter(filter.params.iter()), |r| r.get(0))
            .unwrap();
        count == 1
    }

    fn record(value: Option<&str>) -> ClientRecord {
        let mut record = ClientRecord::default();
        record.set(Field::Nid, value.map(str::to_string));
        record.set(Field::Dna, value.map(str::to_string));
        record
    }

    fn assert_same(predicate: &Predicate, values: &[Option<&str>]) {
        for value in values {
            assert_eq!(
                predicate.matches(&record(*value), today()),
                sql_matches(predicate, *value),
                "{:?} disagrees on {:?}",
                predicate,
                value
            );
        }
    }

    const SAMPLES: &[Option<&str>] = &[
        None,
        Some(""),
        Some("   "),
        Some("\t"),
        Some("AB12CD34"),
        Some("ab12cd34"),
        Some("AB-12.CD"),
        Some("XXXX"),
        Some("xX"),
        Some("MA0451"),
        Some("1915-01-01"),
        Some("1914-12-31"),
        Some("2026-10-19"),
        Some("2021-02-30"),
        Some("2021-2-3"),
        Some(" 2021-01-01"),
        Some("Évian 123"),
    ];

    #[test]
    fn leaves_agree_with_sqlite() {
        let leaves = vec![
            Predicate::blank(Field::Nid),
            Predicate::equals(Field::Nid, "XXXX"),
            Predicate::In { field: Field::Nid, values: vec!["M".into(), "XXXX".into()] },
            Predicate::Contains { field: Field::Nid, needle: "123".into() },
            Predicate::StartsWith { field: Field::Nid, prefix: "MA".into() },
            Predicate::ShorterThan { field: Field::Nid, len: 8 },
            Predicate::LongerThan { field: Field::Nid, len: 8 },
            Predicate::HasCharOutside { field: Field::Nid, class: CharClass::UpperAlnum },
            Predicate::HasCharOutside { field: Field::Nid, class: CharClass::Acronym },
            Predicate::OnlyChars { field: Field::Nid, chars: "Xx".into() },
            Predicate::IsoDate { field: Field::Dna },
            Predicate::DateBefore {
                field: Field::Dna,
                bound: DateBound::Fixed(NaiveDate::from_ymd_opt(1915, 1, 1).unwrap()),
            },
            Predicate::DateAfter { field: Field::Dna, bound: DateBound::Today },
        ];
        for leaf in &leaves {
            assert_same(leaf, SAMPLES);
            assert_same(&Predicate::negate(leaf.clone()), SAMPLES);
        }
    }

    #[test]
    fn empty_combinators_render_constants() {
        assert_eq!(Predicate::never().to_sql(today()).clause, "0");
        assert_eq!(Predicate::And { all: vec![] }.to_sql(today()).clause, "1");
        assert!(!Predicate::never().matches(&ClientRecord::default(), today()));
    }

    #[test]
    fn iso_dates_are_strict() {
        assert!(parse_iso_date("2024-02-29").is_some());
        assert!(parse_iso_date("2023-02-29").is_none());
        assert!(parse_iso_date("2024-2-09").is_none());
        assert!(parse_iso_date("2024-02-09T00:00").is_none());
    }

    #[test]
    fn validate_rejects_unrenderable_leaves() {
        assert!(Predicate::In { field: Field::Sext, values: vec![] }.validate().is_err());
        assert!(Predicate::OnlyChars { field: Field::Nom, chars: "]-".into() }
            .validate()
            .is_err());
        assert!(Predicate::or(vec![Predicate::blank(Field::Nom)]).validate().is_ok());
    }

    #[test]
    fn predicates_load_from_json() {
        let json = r#"{"op":"and","all":[
            {"op":"or","any":[{"op":"equals","field":"nat","value":"US"},
                               {"op":"equals","field":"payn","value":"US"}]},
            {"op":"blank","field":"fatca_status"}]}"#;
        let predicate: Predicate = serde_json::from_str(json).unwrap();
        let mut record = ClientRecord::default();
        record.nat = Some("US".into());
        assert!(predicate.matches(&record, today()));
        record.fatca_status = Some("CONFIRMED".into());
        assert!(!predicate.matches(&record, today()));

        let unknown = r#"{"op":"blank","field":"shoe_size"}"#;
        assert!(serde_json::from_str::<Predicate>(unknown).is_err());
    }
}
