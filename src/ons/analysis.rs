use crate::ons::normalize::{SourceSeries, split_category};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TREND_WINDOW: usize = 10;
pub const DEFAULT_TREND_THRESHOLD: f64 = 5.0;

/// Trend window and classification threshold (MW per sample step)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrendParams {
    pub window: usize,
    pub threshold: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            window: DEFAULT_TREND_WINDOW,
            threshold: DEFAULT_TREND_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

impl TrendDirection {
    /// A slope of exactly ±threshold counts as stable
    pub fn classify(slope: f64, threshold: f64) -> Self {
        if slope > threshold {
            TrendDirection::Rising
        } else if slope < -threshold {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Trend {
    pub slope: f64,
    pub direction: TrendDirection,
}

impl Trend {
    pub const STABLE: Trend = Trend {
        slope: 0.0,
        direction: TrendDirection::Stable,
    };

    /// Least-squares slope over the trailing `window` values.
    /// Fewer values than the window (or a window below 2) gives a flat trend.
    pub fn estimate(values: &[f64], params: TrendParams) -> Self {
        if params.window < 2 || values.len() < params.window {
            return Trend::STABLE;
        }

        let slope = least_squares_slope(&values[values.len() - params.window..]);
        Trend {
            slope,
            direction: TrendDirection::classify(slope, params.threshold),
        }
    }
}

/// Slope `a` of `y = a*x + b` fitted over `x = 0..n-1`
fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, &y)| {
            let dx = i as f64 - mean_x;
            (num + dx * (y - mean_y), den + dx * dx)
        });

    if den == 0.0 { 0.0 } else { num / den }
}

/// Change of the latest sample relative to the one before, in percent
pub fn change_percentage(values: &[f64]) -> f64 {
    match values {
        [.., previous, last] if *previous != 0.0 => (last - previous) / previous * 100.0,
        _ => 0.0,
    }
}

/// Everything the dashboard derives from one group of series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub latest_by_category: BTreeMap<String, f64>,
    pub change_pct_by_category: BTreeMap<String, f64>,
    pub total: f64,
    pub share_by_category: BTreeMap<String, f64>,
    pub trend_by_category: BTreeMap<String, Trend>,
}

impl Aggregate {
    pub fn compute(series: &BTreeMap<String, SourceSeries>, params: TrendParams) -> Self {
        let mut aggregate = Aggregate::default();

        for (category, s) in series {
            let values = s.values();
            let latest = s.latest().map_or(0.0, |sample| sample.value_mw);

            aggregate.latest_by_category.insert(category.clone(), latest);
            aggregate
                .change_pct_by_category
                .insert(category.clone(), change_percentage(&values));
            aggregate
                .trend_by_category
                .insert(category.clone(), Trend::estimate(&values, params));
        }

        aggregate.total = aggregate.latest_by_category.values().sum();
        aggregate.share_by_category = shares(&aggregate.latest_by_category, aggregate.total);
        aggregate
    }

    /// Sum latest values per source or per region of composite keys
    pub fn rollup(&self, axis: Axis, separator: &str) -> BTreeMap<String, f64> {
        rollup(&self.latest_by_category, axis, separator)
    }
}

fn shares(latest: &BTreeMap<String, f64>, total: f64) -> BTreeMap<String, f64> {
    latest
        .iter()
        .map(|(category, value)| {
            let share = if total == 0.0 { 0.0 } else { value / total * 100.0 };
            (category.clone(), share)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Source,
    Region,
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Ok(Axis::Source),
            "region" => Ok(Axis::Region),
            other => Err(format!("unknown axis: {}", other)),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Source => write!(f, "source"),
            Axis::Region => write!(f, "region"),
        }
    }
}

/// Group composite `"Source - Region"` keys along one axis.
/// Keys without a region are skipped on the region axis.
pub fn rollup(
    values: &BTreeMap<String, f64>,
    axis: Axis,
    separator: &str,
) -> BTreeMap<String, f64> {
    let mut grouped: BTreeMap<String, f64> = BTreeMap::new();

    for (category, value) in values {
        let (source, region) = split_category(category, separator);
        let group = match axis {
            Axis::Source => Some(source),
            Axis::Region => region,
        };
        if let Some(group) = group {
            *grouped.entry(group.to_string()).or_insert(0.0) += value;
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ons::normalize::PowerSample;
    use chrono::{Duration, TimeZone, Utc};

    fn series(category: &str, values: &[f64]) -> SourceSeries {
        let start = Utc.with_ymd_and_hms(2024, 11, 15, 10, 0, 0).unwrap();
        let samples = values
            .iter()
            .enumerate()
            .map(|(i, &v)| PowerSample {
                timestamp: start + Duration::minutes(i as i64),
                value_mw: v,
            })
            .collect();
        SourceSeries::new(category, " - ", samples)
    }

    fn group(entries: &[(&str, Vec<f64>)]) -> BTreeMap<String, SourceSeries> {
        entries
            .iter()
            .map(|(c, v)| (c.to_string(), series(c, v)))
            .collect()
    }

    #[test]
    fn test_totals_and_shares() {
        let input = group(&[
            ("Eólica", vec![5.0, 10.0]),
            ("Solar", vec![20.0]),
            ("Hidráulica", vec![70.0]),
        ]);
        let agg = Aggregate::compute(&input, TrendParams::default());

        assert_eq!(agg.total, 100.0);
        assert_eq!(agg.latest_by_category["Eólica"], 10.0);
        assert!((agg.share_by_category["Eólica"] - 10.0).abs() < 1e-9);
        assert!((agg.share_by_category["Solar"] - 20.0).abs() < 1e-9);
        assert!((agg.share_by_category["Hidráulica"] - 70.0).abs() < 1e-9);

        let sum: f64 = agg.share_by_category.values().sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_gives_zero_shares() {
        let input = group(&[("Eólica", vec![]), ("Solar", vec![0.0]), ("Nuclear", vec![])]);
        let agg = Aggregate::compute(&input, TrendParams::default());

        assert_eq!(agg.total, 0.0);
        assert_eq!(agg.latest_by_category["Eólica"], 0.0);
        assert!(agg.share_by_category.values().all(|&s| s == 0.0));
        assert!(
            agg.trend_by_category
                .values()
                .all(|t| t.direction == TrendDirection::Stable)
        );
    }

    #[test]
    fn test_trend_slope() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let trend = Trend::estimate(&values, TrendParams::default());
        assert!((trend.slope - 1.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Stable);

        let scaled: Vec<f64> = values.iter().map(|v| v * 10.0).collect();
        let trend = Trend::estimate(&scaled, TrendParams::default());
        assert!((trend.slope - 10.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Rising);

        let falling: Vec<f64> = scaled.iter().rev().copied().collect();
        let trend = Trend::estimate(&falling, TrendParams::default());
        assert_eq!(trend.direction, TrendDirection::Falling);
    }

    #[test]
    fn test_trend_uses_trailing_window() {
        // a long flat history followed by a ramp only the last 10 samples see
        let mut values = vec![500.0; 50];
        values.extend((0..10).map(|i| 100.0 + 20.0 * i as f64));

        let trend = Trend::estimate(&values, TrendParams::default());
        assert!((trend.slope - 20.0).abs() < 1e-9);
        assert_eq!(trend.direction, TrendDirection::Rising);
    }

    #[test]
    fn test_trend_needs_full_window() {
        let values = [1.0, 100.0, 1000.0];
        assert_eq!(Trend::estimate(&values, TrendParams::default()), Trend::STABLE);

        let params = TrendParams {
            window: 1,
            threshold: 5.0,
        };
        assert_eq!(Trend::estimate(&values, params), Trend::STABLE);
    }

    #[test]
    fn test_trend_boundary_is_stable() {
        assert_eq!(TrendDirection::classify(5.0, 5.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::classify(-5.0, 5.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::classify(5.0001, 5.0), TrendDirection::Rising);
        assert_eq!(TrendDirection::classify(-5.0001, 5.0), TrendDirection::Falling);
    }

    #[test]
    fn test_change_percentage() {
        assert_eq!(change_percentage(&[]), 0.0);
        assert_eq!(change_percentage(&[10.0]), 0.0);
        assert_eq!(change_percentage(&[0.0, 10.0]), 0.0);
        assert!((change_percentage(&[100.0, 110.0]) - 10.0).abs() < 1e-9);
        assert!((change_percentage(&[1.0, 200.0, 150.0]) + 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_rollup_by_axis() {
        let input = group(&[
            ("Eólica - Nordeste", vec![300.0]),
            ("Eólica - Sul", vec![50.0]),
            ("Solar - Nordeste", vec![120.0]),
            ("Solar - Sul", vec![10.0]),
            ("Nuclear", vec![2.0]),
        ]);
        let agg = Aggregate::compute(&input, TrendParams::default());

        let by_source = agg.rollup(Axis::Source, " - ");
        assert_eq!(by_source["Eólica"], 350.0);
        assert_eq!(by_source["Solar"], 130.0);
        assert_eq!(by_source["Nuclear"], 2.0);

        let by_region = agg.rollup(Axis::Region, " - ");
        assert_eq!(by_region.len(), 2);
        assert_eq!(by_region["Nordeste"], 420.0);
        assert_eq!(by_region["Sul"], 60.0);
    }

    #[test]
    fn test_axis_from_str() {
        assert_eq!("Region".parse::<Axis>().unwrap(), Axis::Region);
        assert_eq!("source".parse::<Axis>().unwrap(), Axis::Source);
        assert!("basin".parse::<Axis>().is_err());
    }

    #[test]
    fn test_compute_is_idempotent() {
        let input = group(&[("Eólica", vec![1.0, 2.0, 3.0]), ("Solar", vec![4.0])]);
        let first = Aggregate::compute(&input, TrendParams::default());
        let second = Aggregate::compute(&input, TrendParams::default());
        assert_eq!(first, second);
    }
}
