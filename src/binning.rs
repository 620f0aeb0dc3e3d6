//! Temperature/voltage partitioning of a mode's rows.

use crate::data::{Dataset, RowSet};
use crate::error::AppResult;

/// Rows of one (temperature, voltage) cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    /// At least one row matched.
    Rows(RowSet),
    /// No rows matched; an expected outcome, not an error.
    NotAvailable,
}

impl Cell {
    /// Matched rows, if any.
    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            Cell::Rows(rows) => Some(rows),
            Cell::NotAvailable => None,
        }
    }

    /// Number of matched rows.
    pub fn len(&self) -> usize {
        self.rows().map_or(0, RowSet::len)
    }

    /// True when nothing matched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Filters rows by ambient temperature window and exact voltage setpoint.
#[derive(Debug, Clone, Copy)]
pub struct Binner<'a> {
    ambient: &'a [f64],
    setpoint: &'a [f64],
}

impl<'a> Binner<'a> {
    /// Binner over the named ambient and setpoint channels.
    pub fn new(dataset: &'a Dataset, ambient: &str, setpoint: &str) -> AppResult<Self> {
        Ok(Self {
            ambient: dataset.require_column(ambient)?,
            setpoint: dataset.require_column(setpoint)?,
        })
    }

    /// Rows whose ambient lies strictly inside `(temperature - tolerance,
    /// temperature + tolerance)` and whose setpoint equals `voltage` exactly.
    pub fn bin(&self, rows: &RowSet, temperature: i32, tolerance: f64, voltage: f64) -> Cell {
        let center = f64::from(temperature);
        let (low, high) = (center - tolerance, center + tolerance);
        let matched = rows.filter(|row| {
            let t = self.ambient[row];
            t > low && t < high && self.setpoint[row] == voltage
        });
        if matched.is_empty() {
            Cell::NotAvailable
        } else {
            Cell::Rows(matched)
        }
    }
}
