//! Shared dataset builders for integration tests.
#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_tsa::data::Dataset;

/// One sample per second starting 2019/03/04 08:00:00.
pub fn index(len: usize) -> Vec<NaiveDateTime> {
    let start = NaiveDate::from_ymd_opt(2019, 3, 4)
        .and_then(|d| d.and_hms_opt(8, 0, 0))
        .unwrap();
    (0..len)
        .map(|i| start + Duration::seconds(i as i64))
        .collect()
}

/// Dataset from `(name, values)` columns of equal length.
pub fn dataset(columns: Vec<(&str, Vec<f64>)>) -> Dataset {
    let len = columns.first().map_or(0, |(_, v)| v.len());
    columns
        .into_iter()
        .fold(Dataset::new(index(len)), |ds, (name, values)| {
            ds.with_column(name, values).unwrap()
        })
}
