use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::DEFAULT_TABLE_NAME;
use crate::error::{EtlError, Result};
use crate::pipeline::load::LoadMethod;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub table_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub load_method: LoadMethod,
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub retention_days: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/financials.db"),
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/presupuestos"),
            load_method: LoadMethod::Upsert,
            poll_interval_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            retention_days: 10,
        }
    }
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| EtlError::Config(format!("{key} must be a non-negative integer, got '{value}'")))
}

impl Config {
    /// Load `config.toml` (or `path`) if present, then apply `ETL_*` environment
    /// overrides. A `.env` file is read first when one exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                EtlError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
            })?;
            Self::from_toml(&content)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env(|key| env_override(key))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a key lookup (the process environment in `load`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ETL_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_TABLE_NAME") {
            self.database.table_name = v;
        }
        if let Some(v) = lookup("ETL_DATA_DIR") {
            self.pipeline.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_LOAD_METHOD") {
            self.pipeline.load_method = v.parse()?;
        }
        if let Some(v) = lookup("ETL_POLL_INTERVAL_SECS") {
            self.pipeline.poll_interval_secs = parse_number("ETL_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("ETL_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_LOG_RETENTION_DAYS") {
            self.logging.retention_days = parse_number("ETL_LOG_RETENTION_DAYS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.table_name.trim().is_empty() {
            return Err(EtlError::Config("database.table_name must not be empty".to_string()));
        }
        if self.pipeline.poll_interval_secs == 0 {
            return Err(EtlError::Config("pipeline.poll_interval_secs must be positive".to_string()));
        }
        Ok(())
    }
}
