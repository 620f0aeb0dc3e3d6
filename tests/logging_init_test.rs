//! Subscriber installation must be safe to repeat: several exporters may each call it.

use rust_tsa::config::LogFormat;
use rust_tsa::logging;
use rust_tsa::RunConfig;

#[test]
fn init_is_idempotent() {
    let config = RunConfig {
        log_level: "debug".to_string(),
        ..RunConfig::default()
    };
    assert!(logging::init_from_config(&config).is_ok());

    let json = RunConfig {
        log_level: "WARN".to_string(),
        log_format: LogFormat::Json,
        ..RunConfig::default()
    };
    assert!(logging::init_from_config(&json).is_ok());
    tracing::info!("still logging after repeated init");
}

#[test]
fn invalid_level_is_rejected_before_install() {
    let config = RunConfig {
        log_level: "chatty".to_string(),
        ..RunConfig::default()
    };
    assert!(logging::init_from_config(&config).is_err());
}
