//! Runtime configuration.
//!
//! Loaded from the TOML file named by `ONS_CONFIG`, with every key
//! optional. Missing keys fall back to the built-in ONS feed table and
//! defaults below. A `[generation]`, `[regional]` or `[load]` table in the
//! file replaces the corresponding built-in set as a whole.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ons::analysis::TrendParams;
use crate::ons::normalize::ValueField;
use crate::ons::sources::{self, FeedGroup};

pub const CONFIG_ENV: &str = "ONS_CONFIG";

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CACHE_TTL_SECS: u64 = 15;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3044";
const DEFAULT_SEPARATOR: &str = " - ";
const DEFAULT_USER_AGENT: &str = concat!("ons-monitor/", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("TOML parsing failed: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One polled feed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub url: String,
    #[serde(default)]
    pub color: Option<String>,
    /// Value field of the records; defaults to `carga` for load feeds and
    /// `geracao` otherwise
    #[serde(default)]
    pub field: Option<ValueField>,
}

impl SourceConfig {
    pub fn value_field(&self, group: FeedGroup) -> ValueField {
        self.field.unwrap_or(match group {
            FeedGroup::Load => ValueField::Carga,
            _ => ValueField::Geracao,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub refresh_interval_secs: u64,
    pub bind_addr: String,
    /// Separator inside composite `"Source - Region"` category keys
    pub separator: String,
    pub http: HttpConfig,
    pub trend: TrendParams,
    pub reservoirs_url: Option<String>,
    pub generation: BTreeMap<String, SourceConfig>,
    pub regional: BTreeMap<String, SourceConfig>,
    pub load: BTreeMap<String, SourceConfig>,
}

fn builtin_group(group: FeedGroup) -> BTreeMap<String, SourceConfig> {
    sources::feeds_by_group(group)
        .map(|feed| {
            (
                feed.category.to_string(),
                SourceConfig {
                    url: feed.url(),
                    color: Some(feed.color.to_string()),
                    field: Some(feed.field),
                },
            )
        })
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            separator: DEFAULT_SEPARATOR.to_string(),
            http: HttpConfig::default(),
            trend: TrendParams::default(),
            reservoirs_url: Some(sources::reservoirs_url()),
            generation: builtin_group(FeedGroup::Generation),
            regional: builtin_group(FeedGroup::Regional),
            load: builtin_group(FeedGroup::Load),
        }
    }
}

impl Config {
    /// Load from `ONS_CONFIG` if set, built-in defaults otherwise
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => {
                tracing::info!("{} not set, using built-in feed table", CONFIG_ENV);
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading configuration");
        raw.parse()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// All configured feeds with their group, in group order
    pub fn sources(&self) -> impl Iterator<Item = (FeedGroup, &String, &SourceConfig)> {
        self.generation
            .iter()
            .map(|(category, source)| (FeedGroup::Generation, category, source))
            .chain(
                self.regional
                    .iter()
                    .map(|(category, source)| (FeedGroup::Regional, category, source)),
            )
            .chain(
                self.load
                    .iter()
                    .map(|(category, source)| (FeedGroup::Load, category, source)),
            )
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.refresh_interval_secs == 0 {
            return invalid("refresh_interval_secs must be positive".into());
        }
        if self.http.timeout_secs == 0 {
            return invalid("http.timeout_secs must be positive".into());
        }
        if self.http.cache_ttl_secs == 0 {
            return invalid("http.cache_ttl_secs must be positive".into());
        }
        if self.trend.window < 2 {
            return invalid(format!("trend.window must be at least 2, got {}", self.trend.window));
        }
        if !self.trend.threshold.is_finite() || self.trend.threshold < 0.0 {
            return invalid(format!(
                "trend.threshold must be a non-negative number, got {}",
                self.trend.threshold
            ));
        }
        if self.separator.is_empty() {
            return invalid("separator must not be empty".into());
        }
        if self.generation.is_empty() {
            return invalid("at least one generation source is required".into());
        }

        let urls = self
            .sources()
            .map(|(_, category, source)| (category.as_str(), source.url.as_str()))
            .chain(self.reservoirs_url.as_deref().map(|url| ("reservoirs", url)));
        for (name, url) in urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return invalid(format!("{}: not an HTTP(S) URL: {}", name, url));
            }
        }

        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
