use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::ons::OnsClient;
use crate::ons::pipeline::{Dashboard, run_cycle};

/// Latest dashboard published by the refresh task; `None` until the first
/// cycle finishes.
pub type LatestDashboard = watch::Receiver<Option<Arc<Dashboard>>>;

/// Re-run the pipeline every `refresh_interval` and publish each result.
///
/// The first cycle starts immediately. Cycles never overlap: a slow cycle
/// delays the next tick instead of queueing a burst. The task ends once
/// every receiver is dropped.
pub fn spawn_refresh(
    client: Arc<OnsClient>,
    config: Arc<Config>,
) -> (LatestDashboard, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let dashboard = run_cycle(&client, &config).await;
            if !dashboard.is_available() {
                tracing::warn!("no generation source returned data this cycle");
            }
            if tx.send(Some(Arc::new(dashboard))).is_err() {
                tracing::debug!("no dashboard subscribers left, stopping refresh");
                break;
            }
        }
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use crate::ons::test_support::spawn_upstream;
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publishes_fresh_dashboards() {
        let (base, hits) = spawn_upstream().await;
        let config = Config {
            refresh_interval_secs: 1,
            generation: BTreeMap::from([(
                "Eólica".to_string(),
                SourceConfig {
                    url: format!("{}/ok", base),
                    color: None,
                    field: None,
                },
            )]),
            regional: BTreeMap::new(),
            load: BTreeMap::new(),
            reservoirs_url: None,
            ..Config::default()
        };
        // zero TTL so every cycle reaches the upstream
        let client = OnsClient::new(Duration::from_secs(5), Duration::ZERO, "test").unwrap();

        let (mut rx, handle) = spawn_refresh(Arc::new(client), Arc::new(config));

        rx.changed().await.unwrap();
        let first = rx.borrow_and_update().clone().unwrap();
        assert!(first.is_available());
        assert_eq!(first.generation.aggregate.total, 1.0);

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(hits.load(Ordering::SeqCst) >= 2);

        drop(rx);
        handle.abort();
    }
}
