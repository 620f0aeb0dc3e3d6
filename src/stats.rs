//! Cell statistics and the out-of-spec rules.

use crate::limits::LimitBand;
use serde::Serialize;

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Statistical summary of one channel within one cell, rounded to 3 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    /// Minimum sample
    pub min: f64,
    /// Maximum sample
    pub max: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Sample standard deviation (n - 1); 0 for a single sample
    pub stdev: f64,
    /// Number of non-NaN samples
    pub count: usize,
}

/// Statistics of a cell, or explicit absence when no samples fall in it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "stats")]
pub enum StatValue {
    /// At least one sample was present.
    Available(Stats),
    /// No samples; never treated as zero.
    NotAvailable,
}

impl Stats {
    /// Summarize a series, skipping NaN samples.
    pub fn compute<I>(values: I) -> StatValue
    where
        I: IntoIterator<Item = f64>,
    {
        let values: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
        if values.is_empty() {
            return StatValue::NotAvailable;
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let stdev = if values.len() > 1 {
            let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt()
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        StatValue::Available(Stats {
            min: round_to(min, 3),
            max: round_to(max, 3),
            mean: round_to(mean, 3),
            stdev: round_to(stdev, 3),
            count: values.len(),
        })
    }

    /// Any-excursion rule: the cell fails if its extremes leave the band.
    pub fn is_out_of_spec(&self, band: &LimitBand) -> bool {
        is_out_of_spec(self.min, self.max, band)
    }
}

impl StatValue {
    /// The statistics, if available.
    pub fn stats(&self) -> Option<&Stats> {
        match self {
            StatValue::Available(stats) => Some(stats),
            StatValue::NotAvailable => None,
        }
    }

    /// True if no samples were present.
    pub fn is_not_available(&self) -> bool {
        matches!(self, StatValue::NotAvailable)
    }
}

/// `min < lower || max > upper`. Values on the boundary are in spec.
pub fn is_out_of_spec(min: f64, max: f64, band: &LimitBand) -> bool {
    min < band.lower || max > band.upper
}

/// Per-sample severity of a cell, reported alongside the pass/fail verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutOfSpecCount {
    /// Samples outside the band
    pub out_of_spec: usize,
    /// Non-NaN samples considered
    pub total: usize,
}

impl OutOfSpecCount {
    /// Count samples outside `band`, skipping NaN.
    pub fn count<I>(values: I, band: &LimitBand) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        values
            .into_iter()
            .filter(|v| !v.is_nan())
            .fold(Self::default(), |mut acc, v| {
                acc.total += 1;
                if !band.contains(v) {
                    acc.out_of_spec += 1;
                }
                acc
            })
    }

    /// Percentage of samples out of spec; 0 when there are no samples.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.out_of_spec as f64 / self.total as f64
        }
    }
}
