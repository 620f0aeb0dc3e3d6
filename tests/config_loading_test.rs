//! Integration tests for loading run configuration from disk

use rust_tsa::{RunConfig, TsaError};
use std::fs;
use tempfile::tempdir;

#[test]
fn loads_a_complete_run_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.toml");
    fs::write(
        &path,
        r#"
test_name = "P552 MCA DV"
temperatures = [-40, 23, 85]
temperature_tolerance = 5.0
voltage_tolerance = 0.3
run_limit_analysis = true
multimode = true
boards = ["B3", "4", "b6"]
ambient_channel = "Amb Temp TC1"
limits_file = "limits/p552.toml"
log_level = "debug"

[output]
directory = "dumps"
max_file_size = 1000000
max_files = 10
"#,
    )
    .unwrap();

    let config = RunConfig::load_from(&path).unwrap();
    assert_eq!(config.test_name, "P552 MCA DV");
    assert_eq!(config.temperatures, vec![-40, 23, 85]);
    assert_eq!(config.boards, vec!["B3", "4", "b6"]);
    assert_eq!(config.ambient_channel.as_deref(), Some("Amb Temp TC1"));
    assert_eq!(config.output.max_files, 10);
    assert!(config.run_limit_analysis);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    let config = RunConfig::load_from(dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, RunConfig::default());
}

#[test]
fn invalid_values_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.toml");
    fs::write(&path, "voltage_tolerance = -1.0\n").unwrap();
    let err = RunConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, TsaError::Configuration(_)));

    fs::write(&path, "temperatures = \"hot\"\n").unwrap();
    let err = RunConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, TsaError::Config(_)));
}
