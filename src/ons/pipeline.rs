use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::Config;
use crate::ons::OnsClient;
use crate::ons::analysis::{Aggregate, TrendParams};
use crate::ons::normalize::{PowerSample, SourceSeries, normalize};
use crate::ons::reservoir::{ReservoirRecord, ReservoirSummary, parse_reservoirs};
use crate::ons::sources::FeedGroup;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DashboardStatus {
    Available,
    /// No generation source returned any data this cycle
    Unavailable,
}

/// Series and aggregates of one feed group
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupView {
    pub aggregate: Aggregate,
    pub series: BTreeMap<String, SourceSeries>,
}

impl GroupView {
    fn build(series: BTreeMap<String, SourceSeries>, params: TrendParams) -> Self {
        Self {
            aggregate: Aggregate::compute(&series, params),
            series,
        }
    }
}

/// Output of one refresh cycle, in plain data for any rendering layer.
///
/// A source that failed stays in its group with an empty series: it reports
/// a latest value of 0, a share of 0 and a stable trend, and its category is
/// listed in `unavailable`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub generated_at: DateTime<Utc>,
    pub status: DashboardStatus,
    pub generation: GroupView,
    pub regional: GroupView,
    pub load: GroupView,
    pub reservoirs: Option<ReservoirSummary>,
    pub unavailable: Vec<String>,
}

impl Dashboard {
    pub fn group(&self, group: FeedGroup) -> &GroupView {
        match group {
            FeedGroup::Generation => &self.generation,
            FeedGroup::Regional => &self.regional,
            FeedGroup::Load => &self.load,
        }
    }

    /// Look a category up across all groups, generation first
    pub fn find_series(&self, category: &str) -> Option<(FeedGroup, &SourceSeries)> {
        [FeedGroup::Generation, FeedGroup::Regional, FeedGroup::Load]
            .into_iter()
            .find_map(|group| self.group(group).series.get(category).map(|s| (group, s)))
    }

    pub fn is_available(&self) -> bool {
        self.status == DashboardStatus::Available
    }
}

/// A normalized feed result, empty when the source was unavailable
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub group: FeedGroup,
    pub category: String,
    pub samples: Vec<PowerSample>,
}

/// Assemble the dashboard from already-normalized inputs. Pure: identical
/// inputs give identical output.
pub fn build_dashboard(
    fetched: Vec<FetchedSource>,
    reservoirs: Option<Vec<ReservoirRecord>>,
    config: &Config,
    generated_at: DateTime<Utc>,
) -> Dashboard {
    let mut groups: BTreeMap<FeedGroup, BTreeMap<String, SourceSeries>> = BTreeMap::new();
    let mut unavailable = Vec::new();

    for source in fetched {
        if source.samples.is_empty() {
            unavailable.push(source.category.clone());
        }
        let series = SourceSeries::new(source.category.clone(), &config.separator, source.samples);
        groups
            .entry(source.group)
            .or_default()
            .insert(source.category, series);
    }

    let mut take =
        |group: FeedGroup| GroupView::build(groups.remove(&group).unwrap_or_default(), config.trend);
    let generation = take(FeedGroup::Generation);
    let regional = take(FeedGroup::Regional);
    let load = take(FeedGroup::Load);

    // load and regional feeds alone cannot fill the composition
    let any_data = generation.series.values().any(|s| !s.is_empty());

    unavailable.sort();
    unavailable.dedup();

    Dashboard {
        generated_at,
        status: if any_data {
            DashboardStatus::Available
        } else {
            DashboardStatus::Unavailable
        },
        generation,
        regional,
        load,
        reservoirs: reservoirs
            .filter(|records| !records.is_empty())
            .map(ReservoirSummary::from_records),
        unavailable,
    }
}

/// Run one refresh cycle: fetch every configured feed concurrently, wait for
/// all of them (failures included), then aggregate.
pub async fn run_cycle(client: &OnsClient, config: &Config) -> Dashboard {
    let started = Instant::now();

    let fetches = config.sources().map(|(group, category, source)| async move {
        let records = client.fetch_records(&source.url).await;
        FetchedSource {
            group,
            category: category.clone(),
            samples: normalize(&records, source.value_field(group)),
        }
    });

    let reservoirs = async {
        match config.reservoirs_url.as_deref() {
            Some(url) => client
                .fetch_document(url)
                .await
                .map(|document| parse_reservoirs(&document)),
            None => None,
        }
    };

    let (fetched, reservoirs) = tokio::join!(join_all(fetches), reservoirs);
    let dashboard = build_dashboard(fetched, reservoirs, config, Utc::now());

    tracing::info!(
        status = ?dashboard.status,
        total_generation_mw = dashboard.generation.aggregate.total,
        unavailable = dashboard.unavailable.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "refresh cycle complete"
    );

    dashboard
}
