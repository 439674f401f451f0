use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::ons::OnsClient;
use crate::ons::analysis::{Axis, Trend};
use crate::ons::normalize::ValueField;
use crate::ons::pipeline::Dashboard;
use crate::ons::reservoir::ReservoirSummary;
use crate::ons::sources::FeedGroup;
use crate::refresh::{LatestDashboard, spawn_refresh};

const FALLBACK_COLOR: &str = "#95a5a6";
const UNAVAILABLE: &str = "data unavailable";

#[derive(Clone)]
pub struct AppState {
    latest: LatestDashboard,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(latest: LatestDashboard, config: Arc<Config>) -> Self {
        Self { latest, config }
    }

    fn current(&self) -> Option<Arc<Dashboard>> {
        self.latest.borrow().clone()
    }

    /// Latest dashboard, only if at least one source answered
    fn available(&self) -> Option<Arc<Dashboard>> {
        self.current().filter(|d| d.is_available())
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, StatusCode>;

#[derive(Serialize)]
struct SourceInfo {
    category: String,
    group: FeedGroup,
    url: String,
    color: String,
    field: ValueField,
}

#[derive(Serialize)]
struct SeriesData {
    category: String,
    group: FeedGroup,
    source: String,
    region: Option<String>,
    timestamps: Vec<String>,
    values_mw: Vec<f64>,
    latest_mw: f64,
    trend: Trend,
}

#[derive(Serialize)]
struct RollupData {
    axis: Axis,
    totals_mw: BTreeMap<String, f64>,
    total_mw: f64,
}

/// Chart-ready composition of current generation
#[derive(Serialize)]
struct CompositionData {
    labels: Vec<String>,
    values_mw: Vec<f64>,
    shares: Vec<f64>,
    colors: Vec<String>,
    total_mw: f64,
    generated_at: String,
}

fn color_of(config: &Config, group: FeedGroup, category: &str) -> String {
    let sources = match group {
        FeedGroup::Generation => &config.generation,
        FeedGroup::Regional => &config.regional,
        FeedGroup::Load => &config.load,
    };
    sources
        .get(category)
        .and_then(|s| s.color.clone())
        .unwrap_or_else(|| FALLBACK_COLOR.to_string())
}

/// GET /api/v1/dashboard
/// Everything computed in the latest refresh cycle
async fn get_dashboard(State(state): State<AppState>) -> Json<ApiResponse<Dashboard>> {
    match state.available() {
        Some(dashboard) => Json(ApiResponse::success(dashboard.as_ref().clone())),
        None => Json(ApiResponse::error(UNAVAILABLE)),
    }
}

/// GET /api/v1/sources
/// Configured feeds
async fn list_sources(State(state): State<AppState>) -> Json<ApiResponse<Vec<SourceInfo>>> {
    let sources = state
        .config
        .sources()
        .map(|(group, category, source)| SourceInfo {
            category: category.clone(),
            group,
            url: source.url.clone(),
            color: color_of(&state.config, group, category),
            field: source.value_field(group),
        })
        .collect();

    Json(ApiResponse::success(sources))
}

/// GET /api/v1/series/:category
async fn get_series(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<SeriesData> {
    let known = state.config.sources().any(|(_, c, _)| *c == category);
    if !known {
        return Err(StatusCode::NOT_FOUND);
    }

    let Some(dashboard) = state.available() else {
        return Ok(Json(ApiResponse::error(UNAVAILABLE)));
    };
    let Some((group, series)) = dashboard.find_series(&category) else {
        return Ok(Json(ApiResponse::error(UNAVAILABLE)));
    };
    if series.is_empty() {
        return Ok(Json(ApiResponse::error(format!("No data for {}", category))));
    }

    let aggregate = &dashboard.group(group).aggregate;
    let data = SeriesData {
        category: category.clone(),
        group,
        source: series.source.clone(),
        region: series.region.clone(),
        timestamps: series
            .samples
            .iter()
            .map(|s| s.timestamp.to_rfc3339())
            .collect(),
        values_mw: series.values(),
        latest_mw: aggregate
            .latest_by_category
            .get(&category)
            .copied()
            .unwrap_or(0.0),
        trend: aggregate
            .trend_by_category
            .get(&category)
            .copied()
            .unwrap_or(Trend::STABLE),
    };

    Ok(Json(ApiResponse::success(data)))
}

/// GET /api/v1/rollup/:axis
/// Regional generation summed per source or per region
async fn get_rollup(
    State(state): State<AppState>,
    Path(axis): Path<String>,
) -> ApiResult<RollupData> {
    let axis: Axis = axis.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    let Some(dashboard) = state.available() else {
        return Ok(Json(ApiResponse::error(UNAVAILABLE)));
    };

    let totals = dashboard
        .regional
        .aggregate
        .rollup(axis, &state.config.separator);
    let total = totals.values().sum();

    Ok(Json(ApiResponse::success(RollupData {
        axis,
        totals_mw: totals,
        total_mw: total,
    })))
}

/// GET /api/v1/composition
/// Current generation mix of the sources that answered
async fn get_composition(State(state): State<AppState>) -> Json<ApiResponse<CompositionData>> {
    let Some(dashboard) = state.available() else {
        return Json(ApiResponse::error(UNAVAILABLE));
    };

    let view = &dashboard.generation;
    let mut data = CompositionData {
        labels: Vec::new(),
        values_mw: Vec::new(),
        shares: Vec::new(),
        colors: Vec::new(),
        total_mw: view.aggregate.total,
        generated_at: dashboard.generated_at.to_rfc3339(),
    };

    for (category, series) in &view.series {
        if series.is_empty() {
            continue;
        }
        data.labels.push(category.clone());
        data.values_mw.push(view.aggregate.latest_by_category[category]);
        data.shares.push(view.aggregate.share_by_category[category]);
        data.colors.push(color_of(&state.config, FeedGroup::Generation, category));
    }

    Json(ApiResponse::success(data))
}

/// GET /api/v1/reservoirs
async fn get_reservoirs(State(state): State<AppState>) -> Json<ApiResponse<ReservoirSummary>> {
    match state.current().and_then(|d| d.reservoirs.clone()) {
        Some(summary) => Json(ApiResponse::success(summary)),
        None => Json(ApiResponse::error(UNAVAILABLE)),
    }
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/dashboard", get(get_dashboard))
        .route("/api/v1/sources", get(list_sources))
        .route("/api/v1/series/{category}", get(get_series))
        .route("/api/v1/rollup/{axis}", get(get_rollup))
        .route("/api/v1/composition", get(get_composition))
        .route("/api/v1/reservoirs", get(get_reservoirs))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let client = Arc::new(OnsClient::new(
        config.http.timeout(),
        config.http.cache_ttl(),
        &config.http.user_agent,
    )?);

    let (latest, refresh) = spawn_refresh(client, Arc::clone(&config));
    let app = router(AppState::new(latest, Arc::clone(&config)));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        refresh_interval_secs = config.refresh_interval_secs,
        sources = config.sources().count(),
        "server running"
    );

    let served = axum::serve(listener, app).await;
    refresh.abort();
    served?;

    Ok(())
}
