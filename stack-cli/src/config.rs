//! Configuration loading for chaos-stack.
//!
//! Configuration is loaded from a TOML file (default: `chaos-stack.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;

use stack_core::blueprint::{
    AlarmProps, ExperimentProps, HealthCheckProps, NetworkProps, PoolProps,
};
use stack_core::ChaosStackProps;
use stack_engine::{EngineConfig, RunnerConfig, SimulationConfig};
use stack_types::{Environment, ValidationError};

/// Root configuration for chaos-stack.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Target account and region.
    #[serde(default)]
    pub environment: EnvironmentConfig,
    /// Network settings.
    #[serde(default)]
    pub network: NetworkProps,
    /// Compute pool settings.
    #[serde(default)]
    pub pool: PoolProps,
    /// Listener and health check settings.
    #[serde(default)]
    pub health_check: HealthCheckProps,
    /// Stop-condition alarm settings.
    #[serde(default)]
    pub alarm: AlarmProps,
    /// Experiment settings.
    #[serde(default)]
    pub experiment: ExperimentProps,
    /// Experiment runner settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Provisioning settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Simulated cloud timings.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Target account and region.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentConfig {
    /// Account ID (default: 123456789012).
    #[serde(default = "default_account")]
    pub account: String,
    /// Region (default: eu-north-1).
    #[serde(default = "default_region")]
    pub region: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive (default: "info"). `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_account() -> String {
    "123456789012".to_string()
}

fn default_region() -> String {
    "eu-north-1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            account: default_account(),
            region: default_region(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// The validated target environment.
    pub fn environment(&self) -> Result<Environment, ValidationError> {
        Environment::new(&self.environment.account, &self.environment.region)
    }

    /// Blueprint properties.
    pub fn stack_props(&self) -> ChaosStackProps {
        ChaosStackProps {
            network: self.network.clone(),
            pool: self.pool.clone(),
            health_check: self.health_check.clone(),
            alarm: self.alarm.clone(),
            experiment: self.experiment.clone(),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
