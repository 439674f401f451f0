use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The feed reports energy accumulated per one-minute bucket (MWh); dividing
/// by this gives the average power over the bucket in MW.
pub const MINUTES_PER_HOUR: f64 = 60.0;

/// Offset used for timestamps the upstream sends without a zone (Brasília, no DST).
const BRASILIA_OFFSET_SECS: i32 = -3 * 3600;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Which numeric field of a record carries the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueField {
    #[default]
    Geracao,
    Carga,
}

impl ValueField {
    pub fn key(self) -> &'static str {
        match self {
            ValueField::Geracao => "geracao",
            ValueField::Carga => "carga",
        }
    }
}

/// One average-power sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerSample {
    pub timestamp: DateTime<Utc>,
    pub value_mw: f64,
}

/// A named feed, rebuilt from scratch on every poll cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSeries {
    pub category: String,
    pub source: String,
    pub region: Option<String>,
    pub samples: Vec<PowerSample>,
}

impl SourceSeries {
    /// Build a series, deriving source and region from a composite `"Source - Region"` key
    pub fn new(category: impl Into<String>, separator: &str, samples: Vec<PowerSample>) -> Self {
        let category = category.into();
        let (source, region) = split_category(&category, separator);
        let (source, region) = (source.to_string(), region.map(str::to_string));
        Self {
            category,
            source,
            region,
            samples,
        }
    }

    /// Most recent sample, if any
    pub fn latest(&self) -> Option<&PowerSample> {
        self.samples.last()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value_mw).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Split `"Eólica - Nordeste"` into `("Eólica", Some("Nordeste"))`.
/// A key without the separator is all source and no region.
pub fn split_category<'a>(category: &'a str, separator: &str) -> (&'a str, Option<&'a str>) {
    match category.split_once(separator) {
        Some((source, region)) if !separator.is_empty() => {
            let region = region.trim();
            (source.trim(), (!region.is_empty()).then_some(region))
        }
        _ => (category.trim(), None),
    }
}

/// Parse the `instante` field. Accepts RFC 3339, or a zoneless timestamp
/// which is taken as Brasília local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let offset = FixedOffset::east_opt(BRASILIA_OFFSET_SECS)?;
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Numbers come through either as JSON numbers or numeric strings
fn parse_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_record(record: &Value, field: ValueField) -> Option<PowerSample> {
    let timestamp = record.get("instante")?.as_str().and_then(parse_timestamp)?;
    let raw = record.get(field.key()).and_then(parse_value)?;
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }

    Some(PowerSample {
        timestamp,
        value_mw: raw / MINUTES_PER_HOUR,
    })
}

/// Turn raw feed records into a time-ordered MW series.
///
/// Records with an unparsable timestamp, or a missing, non-numeric or
/// negative value, are dropped. An empty result means "no data this cycle".
pub fn normalize(records: &[Value], field: ValueField) -> Vec<PowerSample> {
    let mut samples: Vec<PowerSample> = records
        .iter()
        .filter_map(|record| {
            let sample = normalize_record(record, field);
            if sample.is_none() {
                tracing::debug!(%record, field = field.key(), "dropping malformed record");
            }
            sample
        })
        .collect();

    samples.sort_by_key(|s| s.timestamp);
    samples
}
