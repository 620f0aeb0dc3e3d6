//! Integration tests for the rotating out-of-spec sink and the row dumps written to it

mod common;

use common::dataset;
use rust_tsa::rotating::{RotatingWriter, WriteStatus};
use rust_tsa::station::{IIN_ANALYSIS, VIN_ANALYSIS};
use rust_tsa::{BoardId, LimitBand, LimitsSpec, RunConfig, TestRun};
use std::fs;
use tempfile::tempdir;

fn record() -> Vec<Vec<String>> {
    vec![vec![
        "2019/03/04 08:00:00.000".to_string(),
        "9.0".to_string(),
        "1.5".to_string(),
    ]]
}

#[test]
fn rotation_moves_to_the_next_file_and_then_finishes() {
    let dir = tempdir().unwrap();
    let mut writer = RotatingWriter::new(dir.path(), "P552", 16, 2).unwrap();

    assert_eq!(writer.write("header\n", record()).unwrap(), WriteStatus::Written);
    assert_eq!(writer.sequence(), 2);
    assert!(!writer.is_finished());

    assert_eq!(writer.write("header\n", record()).unwrap(), WriteStatus::Written);
    assert!(writer.is_finished());
    assert!(writer.current_path().is_none());

    // past the cap writes are dropped, not errors
    assert_eq!(writer.write("header\n", record()).unwrap(), WriteStatus::Dropped);

    assert!(dir.path().join("P552 - out of spec_01.txt").exists());
    assert!(dir.path().join("P552 - out of spec_02.txt").exists());
    assert!(!dir.path().join("P552 - out of spec_03.txt").exists());
}

#[test]
fn writer_from_config_creates_output_directory() {
    let dir = tempdir().unwrap();
    let mut config = RunConfig::default();
    config.test_name = "MCA".to_string();
    config.output.directory = dir.path().join("nested").join("output");

    let writer = RotatingWriter::from_config(&config).unwrap();
    let path = writer.current_path().unwrap();
    assert!(path.exists());
    assert!(path.ends_with("MCA - out of spec_01.txt"));
}

#[test]
fn dump_writes_vin_and_iin_sections() {
    let ds = dataset(vec![
        ("VSetpoint", vec![9.0; 4]),
        ("Temp TC1", vec![23.0; 4]),
        ("B4 TP1: System 5", vec![1.2, 1.8, 1.3, 1.2]),
        ("B4 Vsense 1", vec![9.0, 9.0, 10.0, f64::NAN]),
        ("B4 ON/OFF", vec![1.0; 4]),
    ]);
    let mut limits = LimitsSpec::new().with_board(BoardId::new(4), "DRL");
    limits.insert_limit("DRL", 23, 9.0, LimitBand::new(1.0, 1.5));
    let config = RunConfig {
        test_name: "MCA".to_string(),
        run_limit_analysis: true,
        ..RunConfig::default()
    };
    let run = TestRun::new(config, ds, Some(limits)).unwrap();

    let rows = run.out_of_spec_rows(0, 23, 9.0).unwrap();
    assert_eq!(rows.vin.as_slice(), &[2]);
    assert_eq!(rows.iin.as_slice(), &[1]);

    let dir = tempdir().unwrap();
    let mut writer = RotatingWriter::new(dir.path(), "MCA", 20_000_000, 99).unwrap();
    let sections = run.dump_out_of_spec(&mut writer).unwrap();
    assert_eq!(sections, 2);

    let content = fs::read_to_string(dir.path().join("MCA - out of spec_01.txt")).unwrap();
    let vin_header = format!("\n\n\n\n\n23°C\tDRL\t9.0V\t{VIN_ANALYSIS}\n");
    let iin_header = format!("\n\n\n\n\n23°C\tDRL\t9.0V\t{IIN_ANALYSIS}\n");
    assert!(content.starts_with(&vin_header));
    assert!(content.contains(&iin_header));
    assert!(content.contains("Timestamp\tVSetpoint\tTemp TC1\tB4 Vsense 1\tB4 TP1: System 5\n"));
    assert!(content.contains("2019/03/04 08:00:02.000\t9\t23\t10\t1.3\n"));
    assert!(content.contains("2019/03/04 08:00:01.000\t9\t23\t9\t1.8\n"));
}

#[test]
fn dump_stops_once_the_writer_is_finished() {
    let ds = dataset(vec![
        ("VSetpoint", vec![9.0, 13.5]),
        ("Temp TC1", vec![23.0; 2]),
        ("B4 TP1: System 5", vec![1.0; 2]),
        ("B4 Vsense 1", vec![5.0, 5.0]),
        ("B4 ON/OFF", vec![1.0; 2]),
    ]);
    let run = TestRun::new(RunConfig::default(), ds, None).unwrap();

    let dir = tempdir().unwrap();
    let mut writer = RotatingWriter::new(dir.path(), "MCA", 1, 1).unwrap();
    let sections = run.dump_out_of_spec(&mut writer).unwrap();
    assert_eq!(sections, 1);
    assert!(writer.is_finished());
}
