//! Client records, categories and the statistics shapes served to the UI.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Client category (core-banking `tcli` code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientCategory {
    Individual,
    Corporate,
    Institutional,
}

impl ClientCategory {
    pub const ALL: [ClientCategory; 3] = [
        ClientCategory::Individual,
        ClientCategory::Corporate,
        ClientCategory::Institutional,
    ];

    /// Discriminant stored in the `tcli` column.
    pub fn code(&self) -> &'static str {
        match self {
            ClientCategory::Individual => "1",
            ClientCategory::Corporate => "2",
            ClientCategory::Institutional => "3",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(ClientCategory::Individual),
            "2" => Some(ClientCategory::Corporate),
            "3" => Some(ClientCategory::Institutional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientCategory::Individual => "individual",
            ClientCategory::Corporate => "corporate",
            ClientCategory::Institutional => "institutional",
        }
    }

    /// Accepts either the snake_case name or the `tcli` code.
    pub fn parse(s: &str) -> Option<Self> {
        Self::from_code(s).or_else(|| Self::ALL.into_iter().find(|c| c.as_str() == s))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ClientCategory::Individual => "Individuals",
            ClientCategory::Corporate => "Corporates",
            ClientCategory::Institutional => "Institutionals",
        }
    }
}

impl fmt::Display for ClientCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule severity. Critical and High violations make a record an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Store values arrive as text, numbers or NULL depending on the adapter;
/// records keep every attribute as optional text.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a scalar attribute value, got {}",
            other
        ))),
    }
}

macro_rules! client_fields {
    ($( $(#[$meta:meta])* $variant:ident => $column:ident ),+ $(,)?) => {
        /// Attribute of a client record, named by its core-banking column.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Field {
            $( $variant ),+
        }

        impl Field {
            pub const ALL: &'static [Field] = &[ $( Field::$variant ),+ ];

            /// Column name; also the JSON key on [`ClientRecord`].
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Field::$variant => stringify!($column) ),+
                }
            }
        }

        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct ClientRecord {
            $(
                $(#[$meta])*
                #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
                pub $column: Option<String>,
            )+
        }

        impl ClientRecord {
            pub fn get(&self, field: Field) -> Option<&str> {
                match field {
                    $( Field::$variant => self.$column.as_deref() ),+
                }
            }

            pub fn set(&mut self, field: Field, value: Option<String>) {
                match field {
                    $( Field::$variant => self.$column = value ),+
                }
            }
        }
    };
}

client_fields! {
    /// Client code (unique key)
    Cli => cli,
    /// Category discriminant: 1 individual, 2 corporate, 3 institutional
    Tcli => tcli,
    /// Surname
    Nom => nom,
    /// First name
    Pre => pre,
    /// Sex code (M/F)
    Sext => sext,
    /// Birth date
    Dna => dna,
    /// Identity document number
    Nid => nid,
    /// Mother's name
    Nmer => nmer,
    /// Trade registry number
    Nrc => nrc,
    /// Company creation date
    Datc => datc,
    /// Company name
    Rso => rso,
    /// Company acronym
    Sig => sig,
    /// Branch code
    Age => age,
    /// Nationality
    Nat => nat,
    Res => res,
    /// Identity document expiry date
    Vid => vid,
    /// Birth town
    Viln => viln,
    Depn => depn,
    /// Birth country
    Payn => payn,
    Locn => locn,
    /// Identity document type
    Tid => tid,
    Did => did,
    Lid => lid,
    Oid => oid,
    Sit => sit,
    Reg => reg,
    Capj => capj,
    Dcapj => dcapj,
    Sitj => sitj,
    Dsitj => dsitj,
    Tconj => tconj,
    Conj => conj,
    Nbenf => nbenf,
    Clifam => clifam,
    /// Legal form
    Fju => fju,
    Vrc => vrc,
    Nchc => nchc,
    Npa => npa,
    Vpa => vpa,
    Nidn => nidn,
    Nis => nis,
    Nidf => nidf,
    Grp => grp,
    Sgrp => sgrp,
    Met => met,
    Smet => smet,
    Ges => ges,
    Qua => qua,
    Tax => tax,
    Catl => catl,
    Seg => seg,
    Nst => nst,
    Clipar => clipar,
    Resd => resd,
    /// Central-bank category
    Catn => catn,
    /// Activity sector
    Sec => sec,
    /// Relationship with the bank
    Lienbq => lienbq,
    Lang => lang,
    Uti => uti,
    Dou => dou,
    Dmo => dmo,
    Midname => midname,
    Nomrest => nomrest,
    Drc => drc,
    Lrc => lrc,
    Rso2 => rso2,
    Regn => regn,
    Idext => idext,
    FatcaStatus => fatca_status,
    FatcaDate => fatca_date,
    FatcaUti => fatca_uti,
    CrsStatus => crs_status,
    CrsDate => crs_date,
    /// Country of the main address
    Cpay => cpay,
    /// Main phone number
    Tel => tel,
    /// Code of a US-resident proxy holder, if any
    Prx => prx,
}

impl Field {
    pub fn parse(name: &str) -> Option<Field> {
        Field::ALL.iter().copied().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Field::parse(&name).ok_or_else(|| de::Error::custom(format!("unknown field `{}`", name)))
    }
}

impl ClientRecord {
    /// Category from the `tcli` discriminant; `None` when missing or unknown.
    pub fn category(&self) -> Option<ClientCategory> {
        self.tcli.as_deref().and_then(ClientCategory::from_code)
    }

    /// Display name: company name for legal entities, "SURNAME First" otherwise.
    pub fn display_name(&self) -> String {
        match self.category() {
            Some(ClientCategory::Individual) | None => {
                let parts: Vec<&str> = [self.nom.as_deref(), self.pre.as_deref()]
                    .into_iter()
                    .flatten()
                    .filter(|s| !s.is_empty())
                    .collect();
                parts.join(" ")
            }
            Some(_) => self.rso.clone().unwrap_or_default(),
        }
    }
}

/// Pagination envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Headline client counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStats {
    pub total: u64,
    pub individual: u64,
    pub corporate: u64,
    pub institutional: u64,
    pub anomalies: u64,
    pub fatca: u64,
}

/// Data-quality score for one client category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub category: ClientCategory,
    pub label: String,
    pub total_records: u64,
    pub valid_records: u64,
    pub quality_score: f64,
}

impl CategoryMetrics {
    pub fn new(category: ClientCategory, total_records: u64, valid_records: u64) -> Self {
        let quality_score = if total_records == 0 {
            0.0
        } else {
            ((valid_records as f64 / total_records as f64) * 10_000.0).round() / 100.0
        };
        Self {
            category,
            label: category.label().to_string(),
            total_records,
            valid_records,
            quality_score,
        }
    }
}

/// Anomaly count for one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchCount {
    pub branch_code: String,
    pub branch_name: Option<String>,
    pub anomaly_count: u64,
}
