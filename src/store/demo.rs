//! Bundled demo data set
//!
//! Last tier of the fallback chain. Shapes match the live resources so the
//! UI renders the same way; results from here are flagged and never cached.

use crate::fatca::{FatcaIndicators, FatcaStats};
use crate::models::{BranchCount, CategoryMetrics, ClientCategory, ClientRecord, ClientStats};

pub fn client_stats() -> ClientStats {
    ClientStats {
        total: 325_037,
        individual: 290_000,
        corporate: 30_000,
        institutional: 5_037,
        anomalies: 55_000,
        fatca: 12_470,
    }
}

pub fn validation_metrics() -> Vec<CategoryMetrics> {
    vec![
        CategoryMetrics::new(ClientCategory::Individual, 290_000, 238_120),
        CategoryMetrics::new(ClientCategory::Corporate, 30_000, 26_364),
        CategoryMetrics::new(ClientCategory::Institutional, 5_037, 4_667),
    ]
}

/// Branch directory: code and display name.
pub const AGENCIES: &[(&str, &str)] = &[
    ("01001", "AGENCE GANHI"),
    ("01002", "AGENCE HAIE VIVE"),
    ("01003", "AGENCE CADJEHOUN"),
    ("01004", "AGENCE AKPAKPA"),
    ("01005", "AGENCE JONQUET"),
    ("01006", "AGENCE FIDJROSSÈ"),
    ("01007", "AGENCE PORTO-NOVO"),
    ("01008", "AGENCE PARAKOU"),
    ("01009", "AGENCE ABOMEY-CALAVI"),
    ("01010", "AGENCE OUIDAH"),
];

pub fn branch_anomalies() -> Vec<BranchCount> {
    const COUNTS: [u64; 10] = [5243, 4872, 4521, 4123, 3987, 3654, 3421, 3210, 2987, 2765];
    AGENCIES
        .iter()
        .zip(COUNTS)
        .map(|((code, name), count)| BranchCount {
            branch_code: code.to_string(),
            branch_name: Some(name.to_string()),
            anomaly_count: count,
        })
        .collect()
}

pub fn fatca_stats(scope: Option<ClientCategory>) -> FatcaStats {
    match scope {
        None => FatcaStats {
            scope: None,
            total: 1250,
            individual: 850,
            corporate: 400,
            to_verify: 850,
            confirmed: 320,
            excluded: 80,
            pending: 0,
            current_month: 125,
            estimated: false,
        },
        Some(ClientCategory::Individual) => FatcaStats::estimate(scope, 850, 850, 0),
        Some(_) => FatcaStats::estimate(scope, 400, 0, 400),
    }
}

pub fn fatca_indicators() -> FatcaIndicators {
    FatcaIndicators {
        nationality: 425,
        birthplace: 300,
        address: 250,
        phone: 180,
        proxy: 60,
    }
}

fn client(cli: &str, tcli: &str, age: &str) -> ClientRecord {
    ClientRecord {
        cli: Some(cli.to_string()),
        tcli: Some(tcli.to_string()),
        age: Some(age.to_string()),
        ..Default::default()
    }
}

fn individual(cli: &str, age: &str, nom: &str, pre: &str, nid: &str, dna: &str) -> ClientRecord {
    ClientRecord {
        nom: Some(nom.to_string()),
        pre: Some(pre.to_string()),
        sext: Some("M".to_string()),
        dna: Some(dna.to_string()),
        nid: Some(nid.to_string()),
        tid: Some("CNI".to_string()),
        nmer: Some("HOUNKPATIN Marie".to_string()),
        nat: Some("BJ".to_string()),
        viln: Some("COTONOU".to_string()),
        payn: Some("BJ".to_string()),
        cpay: Some("BJ".to_string()),
        ..client(cli, "1", age)
    }
}

fn legal_entity(cli: &str, tcli: &str, age: &str, rso: &str, nrc: &str, datc: &str) -> ClientRecord {
    ClientRecord {
        rso: Some(rso.to_string()),
        nrc: Some(nrc.to_string()),
        datc: Some(datc.to_string()),
        sec: Some("COMMERCE".to_string()),
        fju: Some("SA".to_string()),
        catn: Some("GE".to_string()),
        lienbq: Some("CLIENT".to_string()),
        cpay: Some("BJ".to_string()),
        ..client(cli, tcli, age)
    }
}

/// Small mixed population: clean records, anomalies of each kind, and
/// FATCA-relevant clients.
pub fn sample_clients() -> Vec<ClientRecord> {
    let mut filler_name = individual("CLI000004", "01003", "XXXX", "Marc", "BJ8841KD", "1990-07-14");
    filler_name.vid = Some("2031-05-01".to_string());

    let mut us_person = individual("CLI000009", "01001", "SMITH", "John", "US4490PQ", "1975-11-02");
    us_person.nat = Some("US".to_string());
    us_person.payn = Some("US".to_string());
    us_person.cpay = Some("US".to_string());
    us_person.tel = Some("+12125551234".to_string());

    let mut documented_us = individual("CLI000011", "01002", "JOHNSON", "Emily", "US5512RT", "1982-02-17");
    documented_us.sext = Some("F".to_string());
    documented_us.nat = Some("US".to_string());
    documented_us.fatca_status = Some("DOCUMENTED".to_string());

    let mut missing_town = individual("CLI000010", "01004", "ZINSOU", "Claire", "BJ7700AB", "1995-12-30");
    missing_town.sext = Some("F".to_string());
    missing_town.viln = None;

    let mut us_proxy = legal_entity("CLI000104", "2", "01002", "ATLANTIC TRADING", "MA2016B7781", "2016-03-09");
    us_proxy.prx = Some("PRX000031".to_string());

    let mut no_creation_date = legal_entity("CLI000202", "3", "01005", "FONDS DE PREVOYANCE", "RB2001/7", "");
    no_creation_date.datc = None;

    vec![
        individual("CLI000001", "01001", "DOSSOU", "Jean", "BJ4587AZ", "1988-04-12"),
        individual("CLI000002", "01001", "AHOUANDJINOU", "Paul", "", "1979-03-22"),
        individual("CLI000003", "01002", "KOFFI", "Albert", "BJ9914LM", "1901-01-01"),
        filler_name,
        us_person,
        missing_town,
        documented_us,
        legal_entity("CLI000101", "2", "01001", "SOCIETE BENINOISE DE NEGOCE", "MA2019B4521", "2004-06-01"),
        legal_entity("CLI000102", "2", "01003", "GROUPE ALAFIA", "RC00000001", "2011-09-15"),
        legal_entity("CLI000103", "2", "01004", "SOCIETE XXX", "MA2008B6634", "2008-01-20"),
        us_proxy,
        legal_entity("CLI000201", "3", "01001", "CAISSE NATIONALE", "RB1998/42", "1998-10-05"),
        no_creation_date,
    ]
}
