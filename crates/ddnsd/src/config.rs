//! Daemon configuration
//!
//! Everything is read from `DDNS_*` environment variables. Records come
//! from a JSON document with a top-level `settings` array, either the file
//! named by `DDNS_CONFIG_FILE` or the inline `DDNS_CONFIG` value.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DDNS_CONFIG_FILE` | `data/config.json` |
//! | `DDNS_CONFIG` | unset, takes precedence over the file |
//! | `DDNS_LISTENING_PORT` | `8000` |
//! | `DDNS_ROOT_URL` | `/` |
//! | `DDNS_PERIOD` | `5m` |
//! | `DDNS_IP_RESOLVER_STRATEGY` | `dns,http` |
//! | `DDNS_IP_INTERFACE` | unset, every interface |
//! | `DDNS_HTTP_TIMEOUT` | `10s` |
//! | `DDNS_UPDATE_CONCURRENCY` | unset, unbounded |
//! | `DDNS_DATA_DIR` | `data` |
//! | `DDNS_LOG_LEVEL` | `info` |

use anyhow::{Context, Result};
use ddns_core::config::{MIN_PERIOD, StateStoreConfig};
use ddns_core::{DdnsConfig, IpStrategy, RecordConfig};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

const DEFAULT_CONFIG_FILE: &str = "data/config.json";
const DEFAULT_LISTENING_PORT: u16 = 8000;
const DEFAULT_PERIOD: Duration = Duration::from_secs(300);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DATA_DIR: &str = "data";
const STORE_FILE: &str = "updates.json";

/// Where the records document is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordsSource {
    File(PathBuf),
    Inline(String),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub records: RecordsSource,
    pub listening_port: u16,
    pub root_url: String,
    pub period: Duration,
    pub strategies: Vec<IpStrategy>,
    pub interface: Option<String>,
    pub http_timeout: Duration,
    pub update_concurrency: Option<usize>,
    pub data_dir: PathBuf,
    pub log_level: String,
}

#[derive(Deserialize)]
struct Settings {
    settings: Vec<RecordConfig>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let records = match var("DDNS_CONFIG") {
            Some(inline) => RecordsSource::Inline(inline),
            None => RecordsSource::File(PathBuf::from(
                var("DDNS_CONFIG_FILE").unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string()),
            )),
        };

        let listening_port = match var("DDNS_LISTENING_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("DDNS_LISTENING_PORT {port:?} is not a port number"))?,
            None => DEFAULT_LISTENING_PORT,
        };

        let period = match var("DDNS_PERIOD") {
            Some(period) => parse_duration("DDNS_PERIOD", &period)?,
            None => DEFAULT_PERIOD,
        };

        let strategies = match var("DDNS_IP_RESOLVER_STRATEGY") {
            Some(list) => parse_strategies(&list)?,
            None => vec![IpStrategy::Dns, IpStrategy::Http],
        };

        let http_timeout = match var("DDNS_HTTP_TIMEOUT") {
            Some(timeout) => parse_duration("DDNS_HTTP_TIMEOUT", &timeout)?,
            None => DEFAULT_HTTP_TIMEOUT,
        };

        let update_concurrency = var("DDNS_UPDATE_CONCURRENCY")
            .map(|n| {
                n.parse()
                    .with_context(|| format!("DDNS_UPDATE_CONCURRENCY {n:?} is not a number"))
            })
            .transpose()?;

        Ok(Self {
            records,
            listening_port,
            root_url: var("DDNS_ROOT_URL").unwrap_or_else(|| "/".to_string()),
            period,
            strategies,
            interface: var("DDNS_IP_INTERFACE"),
            http_timeout,
            update_concurrency,
            data_dir: PathBuf::from(var("DDNS_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            log_level: var("DDNS_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.listening_port == 0 {
            anyhow::bail!("DDNS_LISTENING_PORT must be between 1 and 65535");
        }

        if !self.root_url.starts_with('/') {
            anyhow::bail!(
                "DDNS_ROOT_URL must be an absolute path starting with '/'. Got: {}",
                self.root_url
            );
        }
        if self.root_url.contains(['?', '#']) {
            anyhow::bail!(
                "DDNS_ROOT_URL cannot contain a query or a fragment. Got: {}",
                self.root_url
            );
        }

        if self.period < MIN_PERIOD {
            anyhow::bail!(
                "DDNS_PERIOD must be at least {}. Got: {}",
                humantime::format_duration(MIN_PERIOD),
                humantime::format_duration(self.period)
            );
        }

        if self.strategies.is_empty() {
            anyhow::bail!("DDNS_IP_RESOLVER_STRATEGY must list at least one strategy");
        }

        if self.http_timeout.as_secs() == 0 {
            anyhow::bail!("DDNS_HTTP_TIMEOUT must be at least one second");
        }

        if self.update_concurrency == Some(0) {
            anyhow::bail!("DDNS_UPDATE_CONCURRENCY must be at least 1 when set");
        }

        if self.log_level.parse::<Level>().is_err() {
            anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }

    pub fn level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }

    /// Root path the routes are nested under, without a trailing slash
    pub fn root_path(&self) -> String {
        let trimmed = self.root_url.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    /// Read and parse the declared records
    pub fn load_records(&self) -> Result<Vec<RecordConfig>> {
        let (raw, origin) = match &self.records {
            RecordsSource::File(path) => (
                std::fs::read_to_string(path)
                    .with_context(|| format!("reading records file {}", path.display()))?,
                path.display().to_string(),
            ),
            RecordsSource::Inline(json) => (json.clone(), "DDNS_CONFIG".to_string()),
        };
        parse_settings(&raw).with_context(|| format!("parsing records from {origin}"))
    }

    /// Core configuration for `records`
    pub fn ddns_config(&self, records: Vec<RecordConfig>) -> DdnsConfig {
        let mut config = DdnsConfig::new(records);
        config.resolver.strategies = self.strategies.clone();
        config.resolver.interface = self.interface.clone();
        config.state_store = StateStoreConfig::File {
            path: self.store_path().display().to_string(),
        };
        config.engine.period_secs = self.period.as_secs();
        config.engine.http_timeout_secs = self.http_timeout.as_secs();
        config.engine.max_concurrency = self.update_concurrency;
        config
    }
}

fn parse_settings(raw: &str) -> Result<Vec<RecordConfig>> {
    let settings: Settings = serde_json::from_str(raw)?;
    if settings.settings.is_empty() {
        anyhow::bail!("the settings array is empty");
    }
    Ok(settings.settings)
}

/// Plain numbers are seconds; anything else goes through humantime (`5m`, `1h30m`)
fn parse_duration(key: &str, value: &str) -> Result<Duration> {
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).with_context(|| format!("{key} {value:?} is not a duration"))
}

fn parse_strategies(list: &str) -> Result<Vec<IpStrategy>> {
    let mut strategies = Vec::new();
    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let strategy: IpStrategy = item.parse()?;
        if strategies.contains(&strategy) {
            anyhow::bail!("DDNS_IP_RESOLVER_STRATEGY lists {strategy} twice");
        }
        strategies.push(strategy);
    }
    Ok(strategies)
}
