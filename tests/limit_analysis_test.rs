//! Integration tests for limit resolution and verdicts
//!
//! Limits are loaded from TOML files written to a temporary directory, the way an
//! operator would supply them.

mod common;

use common::dataset;
use rust_tsa::data::Dataset;
use rust_tsa::limits::OutageState;
use rust_tsa::{LimitBand, LimitsSpec, RunConfig, TestRun, TsaError};
use std::fs;
use tempfile::tempdir;

const LIMITS: &str = r#"
[[boards]]
id = "B4"
module = "DRL"
led_bins = ["RED", "AMBER"]

[[boards]]
id = "B6"
module = "OUTAGE"
outage = true

[[limits]]
mode = "RED DRL"
temperature = 23
voltage = 9.0
lower = 0.5
upper = 0.7

[[limits]]
mode = "AMBER DRL"
temperature = 23
voltage = 9.0
lower = 0.8
upper = 1.0

[outage.OUTAGE]
off = { lower = 0.0, upper = 0.5 }
on = [{ voltage = 9.0, lower = 8.0, upper = 9.0 }]
"#;

fn binned_dataset() -> Dataset {
    dataset(vec![
        ("VSetpoint", vec![9.0; 4]),
        ("Temp TC1", vec![23.0; 4]),
        ("B4 TP1: RED System 12", vec![0.6, 0.65, 0.62, 0.75]),
        ("B4 TP2: AMBER System 3", vec![0.9, 0.85, 0.95, 0.9]),
        ("B4 ON/OFF", vec![1.0; 4]),
        ("B6 TP1: Outage 1", vec![0.1, 8.5, 0.2, 8.7]),
        ("B6 ON/OFF", vec![0.0, 1.0, 0.0, 1.0]),
    ])
}

fn analysed_run() -> TestRun {
    let dir = tempdir().unwrap();
    let path = dir.path().join("limits.toml");
    fs::write(&path, LIMITS).unwrap();

    let config = RunConfig {
        run_limit_analysis: true,
        limits_file: Some(path),
        ..RunConfig::default()
    };
    TestRun::from_config(config, binned_dataset()).unwrap()
}

#[test]
fn led_bins_resolve_qualified_keys() {
    let mut run = analysed_run();
    assert_eq!(run.modes().len(), 1);
    assert!(run.modes()[0].has_led_binning);

    let report = run.cell_report(0, 23, 9.0).unwrap();
    let red = report.channel("B4 TP1: RED System 12").unwrap();
    assert_eq!(red.limits, Some(LimitBand::new(0.5, 0.7)));
    assert_eq!(red.out_of_spec, Some(true));
    assert_eq!(red.percent_out(), Some(25.0));

    let amber = report.channel("B4 TP2: AMBER System 3").unwrap();
    assert_eq!(amber.limits, Some(LimitBand::new(0.8, 1.0)));
    assert_eq!(amber.out_of_spec, Some(false));
    assert_eq!(amber.percent_out(), Some(0.0));
}

#[test]
fn outage_board_is_not_a_mode() {
    let run = analysed_run();
    assert!(run.boards().outage().is_some());
    assert!(run.modes().iter().all(|m| m.display_name == "DRL"));
    // rows with the outage board on still belong to DRL
    assert_eq!(run.modes()[0].rows.len(), 4);
}

#[test]
fn outage_states_use_their_own_limits() {
    let run = analysed_run();

    let on = run
        .outage_report(OutageState::On, 23, 9.0)
        .unwrap()
        .unwrap();
    assert_eq!(on.rows, 2);
    assert_eq!(on.channels[0].limits, Some(LimitBand::new(8.0, 9.0)));
    assert_eq!(on.channels[0].out_of_spec, Some(false));

    let off = run
        .outage_report(OutageState::Off, 23, 9.0)
        .unwrap()
        .unwrap();
    assert_eq!(off.rows, 2);
    assert_eq!(off.channels[0].limits, Some(LimitBand::new(0.0, 0.5)));
}

#[test]
fn missing_limits_are_reported_not_swallowed() {
    let mut limits = LimitsSpec::from_toml_str(LIMITS).unwrap();
    // a plain mode without bins has no entry at all
    limits = limits.with_led_bins(rust_tsa::BoardId::new(4), Vec::new());
    let config = RunConfig {
        run_limit_analysis: true,
        ..RunConfig::default()
    };
    let mut run = TestRun::new(config, binned_dataset(), Some(limits)).unwrap();
    let err = run.cell_report(0, 23, 9.0).unwrap_err();
    assert!(err.is_limits_defect());
    assert!(matches!(err, TsaError::LimitNotFound { ref key, .. } if key == "DRL"));
}

#[test]
fn missing_cells_never_hit_the_limits_table() {
    let mut run = analysed_run();
    let report = run.cell_report(0, -40, 9.0).unwrap();
    assert!(report.is_not_available());
    assert!(!report.is_out_of_spec());
}

#[test]
fn reports_serialize_for_exporters() {
    let mut run = analysed_run();
    let reports = run.analyze().unwrap();
    assert_eq!(reports.len(), 1);

    let json = serde_json::to_value(&reports[0]).unwrap();
    assert_eq!(json["mode"], "DRL");
    assert_eq!(json["currents"][0]["stats"]["status"], "Available");
    assert_eq!(json["currents"][0]["limits"]["upper"], 0.7);

    let empty = run.cell_report(0, 85, 9.0).unwrap();
    let json = serde_json::to_value(empty).unwrap();
    assert_eq!(json["currents"][0]["stats"]["status"], "NotAvailable");
}

#[test]
fn unreadable_limits_file_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("limits.toml");
    fs::write(&path, "[[limits]]\nmode = 3\n").unwrap();
    let err = LimitsSpec::load(&path).unwrap_err();
    assert!(matches!(err, TsaError::LimitsParse(_)));
    assert!(err.is_configuration());
}
