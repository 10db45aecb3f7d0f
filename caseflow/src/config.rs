use std::fs::File;
use std::net::SocketAddr;

use crm::CrmConfig;
use serde::Deserialize;
use worker::WorkerConfig;

#[derive(Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Where case tracking records live.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process map; records vanish on restart. Local runs only.
    Memory,
    Postgres { url: String },
}

#[derive(Deserialize)]
pub struct ApiConfig {
    pub listen_addr: SocketAddr,
    /// Expected value of the x-api-key request header.
    pub api_key: String,
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    pub crm: CrmConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    pub api: Option<ApiConfig>,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
}
