//! Subscriber setup for programs that drive the engine.
//!
//! The engine itself only emits `tracing` events. `RUST_LOG` takes precedence over the
//! configured `log_level`.
//!
//! ```no_run
//! use rust_tsa::{config::RunConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::load_from("config/run.toml")?;
//! logging::init_from_config(&config)?;
//! # Ok(())
//! # }
//! ```

use crate::config::{LogFormat, RunConfig};
use crate::error::{AppResult, TsaError};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber described by `config`.
///
/// A second call leaves the first subscriber in place and returns `Ok(())`.
pub fn init_from_config(config: &RunConfig) -> AppResult<()> {
    let level: Level = config.log_level.parse().map_err(|_| {
        TsaError::Configuration(format!("Invalid log_level '{}'", config.log_level))
    })?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let layer = match config.log_format {
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_target(false)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
    };

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        tracing::debug!("Subscriber already installed; keeping it");
    }
    Ok(())
}
