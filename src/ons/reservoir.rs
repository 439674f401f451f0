use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Raw reservoir entry as published by the upstream feed
#[derive(Debug, Deserialize)]
struct RawReservoir {
    #[serde(rename = "Subsistema")]
    subsystem: String,
    #[serde(rename = "Bacia", default)]
    basin: Option<String>,
    #[serde(rename = "Reservatorio", default)]
    name: Option<String>,
    #[serde(rename = "ReservatorioPorcentagem")]
    percent_full: f64,
    #[serde(rename = "ReservatorioEARVerificadaMWMes", default)]
    stored_energy: Option<f64>,
    #[serde(rename = "ReservatorioMax", default)]
    max_energy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservoirRecord {
    pub subsystem: String,
    pub basin: Option<String>,
    pub name: Option<String>,
    /// Clamped to [0, 100]
    pub percent_full: f64,
    /// Verified stored energy (MW-month)
    pub stored_energy: f64,
    /// Maximum storable energy (MW-month)
    pub max_energy: f64,
    /// The upstream percentage was outside [0, 100] and has been clamped
    pub out_of_range: bool,
}

impl From<RawReservoir> for ReservoirRecord {
    fn from(raw: RawReservoir) -> Self {
        let out_of_range = !(0.0..=100.0).contains(&raw.percent_full);
        if out_of_range {
            tracing::warn!(
                subsystem = %raw.subsystem,
                reservoir = raw.name.as_deref().unwrap_or("?"),
                percent_full = raw.percent_full,
                "reservoir percentage out of range, clamping"
            );
        }

        Self {
            subsystem: raw.subsystem,
            basin: raw.basin,
            name: raw.name,
            percent_full: raw.percent_full.clamp(0.0, 100.0),
            stored_energy: raw.stored_energy.unwrap_or(0.0).max(0.0),
            max_energy: raw.max_energy.unwrap_or(0.0).max(0.0),
            out_of_range,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubsystemStorage {
    pub reservoirs: usize,
    pub stored_energy: f64,
    pub max_energy: f64,
    pub percent_full: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReservoirSummary {
    pub by_subsystem: BTreeMap<String, SubsystemStorage>,
    pub records: Vec<ReservoirRecord>,
}

fn holds_reservoirs(entries: &[Value]) -> bool {
    entries.iter().any(|entry| entry.get("Subsistema").is_some())
}

/// Pull reservoir records out of the feed document. The array may be the
/// document itself or wrapped under a key of a top-level object; among
/// several wrapped arrays the one carrying `Subsistema` entries wins.
pub fn parse_reservoirs(document: &Value) -> Vec<ReservoirRecord> {
    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(map) => {
            let mut arrays = map.values().filter_map(Value::as_array);
            match arrays.clone().find(|entries| holds_reservoirs(entries)) {
                Some(entries) => entries,
                None => match arrays.next() {
                    Some(entries) => entries,
                    None => return Vec::new(),
                },
            }
        }
        _ => return Vec::new(),
    };

    entries
        .iter()
        .filter_map(|entry| match RawReservoir::deserialize(entry) {
            Ok(raw) => Some(ReservoirRecord::from(raw)),
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed reservoir record");
                None
            }
        })
        .collect()
}

impl ReservoirSummary {
    pub fn from_records(records: Vec<ReservoirRecord>) -> Self {
        let mut by_subsystem: BTreeMap<String, SubsystemStorage> = BTreeMap::new();

        for record in &records {
            let entry = by_subsystem.entry(record.subsystem.clone()).or_default();
            entry.reservoirs += 1;
            entry.stored_energy += record.stored_energy;
            entry.max_energy += record.max_energy;
        }

        for storage in by_subsystem.values_mut() {
            storage.percent_full = if storage.max_energy == 0.0 {
                0.0
            } else {
                (storage.stored_energy / storage.max_energy * 100.0).clamp(0.0, 100.0)
            };
        }

        Self {
            by_subsystem,
            records,
        }
    }
}
