//! Run configuration using Figment
//!
//! This module provides strongly-typed configuration loading for one analysis run.
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables (prefixed with RUST_TSA_)
//!
//! Tolerances live here and nowhere else: [`crate::station::TestRun`] threads a
//! `&RunConfig` through every binning and limit call.
//!
//! # Example
//! ```no_run
//! use rust_tsa::config::RunConfig;
//!
//! let config = RunConfig::load_from("config/run.toml")?;
//! println!("Test: {}", config.test_name);
//! # Ok::<(), rust_tsa::error::TsaError>(())
//! ```

use crate::error::{AppResult, TsaError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "RUST_TSA_";

/// Top-level configuration for one test analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Name of the test, used for output file names
    #[serde(default = "default_test_name")]
    pub test_name: String,
    /// Temperatures (°C) at which data is analyzed
    #[serde(default = "default_temperatures")]
    pub temperatures: Vec<i32>,
    /// Half-width of the open ambient temperature window
    #[serde(default = "default_temperature_tolerance")]
    pub temperature_tolerance: f64,
    /// Half-width of the closed band voltage senses must stay within around the setpoint
    #[serde(default = "default_voltage_tolerance")]
    pub voltage_tolerance: f64,
    /// Whether current limits are evaluated
    #[serde(default)]
    pub run_limit_analysis: bool,
    /// Whether to enumerate every board combination or only single-board modes
    #[serde(default)]
    pub multimode: bool,
    /// Boards to analyze (e.g. "B3", "4"); empty means every board present
    #[serde(default)]
    pub boards: Vec<String>,
    /// Thermocouple used as ambient reference (defaults to the TC1 thermocouple)
    #[serde(default)]
    pub ambient_channel: Option<String>,
    /// Limits specification file
    #[serde(default)]
    pub limits_file: Option<PathBuf>,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log line format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Out-of-spec dump settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Format of emitted log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One line per event, for terminals
    #[default]
    Compact,
    /// One JSON object per event, for log collectors
    Json,
}

/// Out-of-spec dump configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory for dump files
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    /// Size in bytes after which the current dump file is rotated
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum number of dump files before the writer stops accepting rows
    #[serde(default = "default_max_files")]
    pub max_files: u32,
}

// Default value functions
fn default_test_name() -> String {
    "test".to_string()
}

fn default_temperatures() -> Vec<i32> {
    vec![23]
}

fn default_temperature_tolerance() -> f64 {
    3.0
}

fn default_voltage_tolerance() -> f64 {
    0.5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_max_file_size() -> u64 {
    20_000_000
}

fn default_max_files() -> u32 {
    99
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            max_file_size: default_max_file_size(),
            max_files: default_max_files(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_name: default_test_name(),
            temperatures: default_temperatures(),
            temperature_tolerance: default_temperature_tolerance(),
            voltage_tolerance: default_voltage_tolerance(),
            run_limit_analysis: false,
            multimode: false,
            boards: Vec::new(),
            ambient_channel: None,
            limits_file: None,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            output: OutputConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a specific file path
    ///
    /// Environment variables can override configuration with prefix RUST_TSA_
    /// Example: RUST_TSA_TEMPERATURE_TOLERANCE=5
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: RunConfig = Self::figment(path.as_ref()).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Figment layering defaults, the TOML file and the environment.
    ///
    /// Nested keys use a double underscore: `RUST_TSA_OUTPUT__MAX_FILES=10`.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(RunConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(TsaError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if !(self.temperature_tolerance.is_finite() && self.temperature_tolerance > 0.0) {
            return Err(TsaError::Configuration(format!(
                "temperature_tolerance must be positive, got {}",
                self.temperature_tolerance
            )));
        }

        if !(self.voltage_tolerance.is_finite() && self.voltage_tolerance >= 0.0) {
            return Err(TsaError::Configuration(format!(
                "voltage_tolerance must be non-negative, got {}",
                self.voltage_tolerance
            )));
        }

        if self.temperatures.is_empty() {
            return Err(TsaError::Configuration(
                "At least one analysis temperature is required".to_string(),
            ));
        }

        if self.output.max_files == 0 {
            return Err(TsaError::Configuration(
                "output.max_files must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
