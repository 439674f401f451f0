mod config;
mod ons;
mod refresh;
mod server;

use crate::config::Config;
use crate::ons::OnsClient;
use crate::ons::analysis::Axis;
use crate::ons::pipeline::run_cycle;
use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Render a power figure the way the dashboard cards do: GW from 1000 MW up
fn format_power(mw: f64) -> String {
    if !mw.is_finite() {
        "N/A".to_string()
    } else if mw >= 1000.0 {
        format!("{:.2} GW", mw / 1000.0)
    } else {
        format!("{:.2} MW", mw)
    }
}

/// Run a single refresh cycle and print the current generation picture
async fn snapshot(config: Config) -> Result<()> {
    let client = OnsClient::new(
        config.http.timeout(),
        config.http.cache_ttl(),
        &config.http.user_agent,
    )?;
    let dashboard = run_cycle(&client, &config).await;

    if !dashboard.is_available() {
        println!("⚠ Data unavailable: no generation source answered.");
        return Ok(());
    }

    let generation = &dashboard.generation.aggregate;
    println!(
        "=== SIN generation at {} ===\n",
        dashboard.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for (category, latest) in &generation.latest_by_category {
        if dashboard.unavailable.contains(category) {
            println!("  {:<12} unavailable", category);
            continue;
        }
        let trend = generation.trend_by_category[category];
        println!(
            "  {:<12} {:>12} | {:5.1}% | {:+6.1}% | trend {:?} ({:+.2} MW/min)",
            category,
            format_power(*latest),
            generation.share_by_category[category],
            generation.change_pct_by_category[category],
            trend.direction,
            trend.slope
        );
    }
    println!("  {:<12} {:>12}", "Total", format_power(generation.total));

    let regional = &dashboard.regional;
    if regional.series.values().any(|s| !s.is_empty()) {
        println!("\n=== Renewables by region ===\n");
        for (region, total) in regional.aggregate.rollup(Axis::Region, &config.separator) {
            println!("  {:<28} {:>12}", region, format_power(total));
        }
    }

    for (category, latest) in &dashboard.load.aggregate.latest_by_category {
        println!("\nLoad {}: {}", category, format_power(*latest));
    }

    if let Some(reservoirs) = &dashboard.reservoirs {
        println!("\n=== Reservoirs ===\n");
        for (subsystem, storage) in &reservoirs.by_subsystem {
            println!(
                "  {:<28} {:5.1}% ({} reservoirs)",
                subsystem, storage.percent_full, storage.reservoirs
            );
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ons_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    match std::env::args().nth(1).as_deref() {
        Some("serve") => server::start_server(config).await,
        Some("snapshot") | None => snapshot(config).await,
        Some(other) => anyhow::bail!("unknown command `{}`, expected `serve` or `snapshot`", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_power() {
        assert_eq!(format_power(999.994), "999.99 MW");
        assert_eq!(format_power(1000.0), "1.00 GW");
        assert_eq!(format_power(45_321.7), "45.32 GW");
        assert_eq!(format_power(f64::NAN), "N/A");
    }
}
