//! Configuration infrastructure
//!
//! Settings are loaded from an optional file plus a `PARTSCOUT_`-prefixed
//! environment overlay, deserialized into typed sections and validated
//! before use. Every tunable the core recognizes lives here: scrape
//! timeout, result caps, batch size, worker pool, similarity weights,
//! match threshold, staleness age, and detection thresholds.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::scraping::{DetectionConfig, SupplierSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraping: ScrapingConfig,
    pub runner: RunnerSettings,
    pub matching: MatchingConfig,
    pub detection: DetectionConfig,
    pub logging: LoggingConfig,
    /// Suppliers the registry is built from.
    pub suppliers: Vec<SupplierSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Hard bound around one scrape call.
    pub timeout_secs: u64,
    /// Cap on records extracted per query.
    pub max_results: usize,
    pub user_agent: String,
    /// Default request rate; a supplier spec may override its own.
    pub max_requests_per_second: u32,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_results: 20,
            user_agent: "partscout/0.2 (+component sourcing)".to_string(),
            max_requests_per_second: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    /// Work-list items per batch; also the cancellation check granularity.
    pub batch_size: usize,
    /// Concurrent scrape calls across suppliers.
    pub worker_pool_size: usize,
    /// Backoff before the single storage retry.
    pub storage_retry_delay_ms: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            worker_pool_size: 4,
            storage_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub token_weight: f64,
    pub tfidf_weight: f64,
    /// Candidates scoring below this are excluded (exact matches always
    /// survive).
    pub min_score: f64,
    /// Cached records older than this are excluded from default matching.
    pub stale_after_days: u32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            token_weight: 0.6,
            tfidf_weight: 0.4,
            min_score: 0.3,
            stale_after_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or EnvFilter directive string.
    pub level: String,
    pub json_format: bool,
    /// Daily-rotated log files land here when set.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file_dir: None,
        }
    }
}

impl AppConfig {
    /// Load from a config file (any format the `config` crate recognizes)
    /// overlaid with `PARTSCOUT_*` environment variables.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("PARTSCOUT").separator("__"))
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Environment-only configuration on top of defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("PARTSCOUT").separator("__"))
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runner.batch_size == 0 {
            return Err(ConfigError::Validation {
                message: "runner.batch_size must be greater than 0".into(),
            });
        }
        if self.runner.worker_pool_size == 0 {
            return Err(ConfigError::Validation {
                message: "runner.worker_pool_size must be greater than 0".into(),
            });
        }
        if self.scraping.timeout_secs == 0 {
            return Err(ConfigError::Validation {
                message: "scraping.timeout_secs must be greater than 0".into(),
            });
        }
        if self.matching.token_weight < 0.0 || self.matching.tfidf_weight < 0.0 {
            return Err(ConfigError::Validation {
                message: "matching weights must be non-negative".into(),
            });
        }
        if self.matching.token_weight + self.matching.tfidf_weight <= 0.0 {
            return Err(ConfigError::Validation {
                message: "matching weights must not both be zero".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.matching.min_score) {
            return Err(ConfigError::Validation {
                message: "matching.min_score must be within [0, 1]".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_floor) {
            return Err(ConfigError::Validation {
                message: "detection.confidence_floor must be within [0, 1]".into(),
            });
        }
        Ok(())
    }
}

/// Default SQLite location under the platform data directory.
pub fn default_database_url() -> String {
    let data_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("partscout");
    format!("sqlite:{}", data_dir.join("partscout.db").display())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = AppConfig::default();
        config.runner.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let mut config = AppConfig::default();
        config.matching.token_weight = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_floor_is_rejected() {
        let mut config = AppConfig::default();
        config.detection.confidence_floor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partscout.toml");
        std::fs::write(
            &path,
            r#"
            [runner]
            batch_size = 250

            [matching]
            min_score = 0.5
            "#,
        )
        .unwrap();

        let loaded = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.runner.batch_size, 250);
        assert_eq!(loaded.matching.min_score, 0.5);
        // Untouched sections keep their defaults.
        assert_eq!(loaded.scraping.max_results, 20);
    }
}
