//! FATCA indicia
//!
//! Each indicium is a [`Predicate`], so the same definition drives the
//! bulk counters pushed down to the store and the per-client listing.

use crate::models::{ClientCategory, ClientRecord, Field};
use crate::rules::Predicate;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const US: &str = "US";

/// North-American dialing prefixes
pub const US_PHONE_PREFIXES: [&str; 4] = ["+1", "001", "+01", "+001"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatcaIndicium {
    Nationality,
    Birthplace,
    Address,
    Phone,
    Proxy,
}

impl FatcaIndicium {
    pub const ALL: [FatcaIndicium; 5] = [
        FatcaIndicium::Nationality,
        FatcaIndicium::Birthplace,
        FatcaIndicium::Address,
        FatcaIndicium::Phone,
        FatcaIndicium::Proxy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FatcaIndicium::Nationality => "nationality",
            FatcaIndicium::Birthplace => "birthplace",
            FatcaIndicium::Address => "address",
            FatcaIndicium::Phone => "phone",
            FatcaIndicium::Proxy => "proxy",
        }
    }

    pub fn predicate(&self) -> Predicate {
        match self {
            FatcaIndicium::Nationality => Predicate::equals(Field::Nat, US),
            FatcaIndicium::Birthplace => Predicate::equals(Field::Payn, US),
            FatcaIndicium::Address => Predicate::equals(Field::Cpay, US),
            FatcaIndicium::Phone => Predicate::or(
                US_PHONE_PREFIXES
                    .iter()
                    .map(|p| Predicate::StartsWith { field: Field::Tel, prefix: p.to_string() })
                    .collect(),
            ),
            FatcaIndicium::Proxy => Predicate::negate(Predicate::blank(Field::Prx)),
        }
    }
}

/// Clients carrying at least one indicium.
pub fn any_indicium() -> Predicate {
    Predicate::or(FatcaIndicium::ALL.iter().map(FatcaIndicium::predicate).collect())
}

pub fn indicia_of(record: &ClientRecord, today: NaiveDate) -> Vec<FatcaIndicium> {
    FatcaIndicium::ALL
        .into_iter()
        .filter(|i| i.predicate().matches(record, today))
        .collect()
}

// Status split applied when only the totals are authoritative.
const TO_VERIFY_SHARE: f64 = 0.68;
const CONFIRMED_SHARE: f64 = 0.26;
const CURRENT_MONTH_SHARE: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatcaStats {
    pub scope: Option<ClientCategory>,
    pub total: u64,
    pub individual: u64,
    /// Corporates and institutionals
    pub corporate: u64,
    pub to_verify: u64,
    pub confirmed: u64,
    pub excluded: u64,
    pub pending: u64,
    pub current_month: u64,
    /// Status breakdown derived from fixed shares, not from the store
    pub estimated: bool,
}

impl FatcaStats {
    /// Authoritative totals, estimated status breakdown.
    pub fn estimate(scope: Option<ClientCategory>, total: u64, individual: u64, corporate: u64) -> Self {
        let share = |ratio: f64| (total as f64 * ratio).round() as u64;
        let to_verify = share(TO_VERIFY_SHARE);
        let confirmed = share(CONFIRMED_SHARE).min(total - to_verify);
        Self {
            scope,
            total,
            individual,
            corporate,
            to_verify,
            confirmed,
            excluded: total - to_verify - confirmed,
            pending: 0,
            current_month: share(CURRENT_MONTH_SHARE),
            estimated: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatcaIndicators {
    pub nationality: u64,
    pub birthplace: u64,
    pub address: u64,
    pub phone: u64,
    pub proxy: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatcaClient {
    pub cli: Option<String>,
    pub name: String,
    pub category: Option<ClientCategory>,
    pub branch: Option<String>,
    pub fatca_status: Option<String>,
    pub indicia: Vec<FatcaIndicium>,
}

impl FatcaClient {
    pub fn from_record(record: &ClientRecord, today: NaiveDate) -> Self {
        Self {
            cli: record.cli.clone(),
            name: record.display_name(),
            category: record.category(),
            branch: record.age.clone(),
            fatca_status: record.fatca_status.clone(),
            indicia: indicia_of(record, today),
        }
    }
}
