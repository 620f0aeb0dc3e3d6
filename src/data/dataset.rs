//! Time-indexed numeric table supplied by the ingestion layer.
//!
//! Values are stored column-major as `f64`. Textual sentinels are coerced before they
//! reach the engine (see [`parse_cell`]): `OFF` becomes `0.0` and `No Reading` becomes
//! `NaN`, which every statistic skips.

use crate::error::{AppResult, TsaError};
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Timestamp format used by the station's raw log files.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";

/// Coerce one raw cell of a station log into a number.
///
/// `OFF` is an on/off channel reading of zero; `No Reading`, blanks and anything
/// unparsable are excluded from analysis as `NaN`.
pub fn parse_cell(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("OFF") {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Sorted, duplicate-free set of row indices into a [`Dataset`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet(Vec<usize>);

impl RowSet {
    /// Empty row set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from arbitrary indices; sorts and removes duplicates.
    pub fn from_indices(mut rows: Vec<usize>) -> Self {
        rows.sort_unstable();
        rows.dedup();
        Self(rows)
    }

    /// Every row of a table with `len` rows.
    pub fn all(len: usize) -> Self {
        Self((0..len).collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no rows are selected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Row indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Row indices as a slice.
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// True if `row` is selected.
    pub fn contains(&self, row: usize) -> bool {
        self.0.binary_search(&row).is_ok()
    }

    /// Position of `row` within this set, used to index series aligned with it.
    pub fn position(&self, row: usize) -> Option<usize> {
        self.0.binary_search(&row).ok()
    }

    /// Rows kept by `keep`, preserving order.
    pub fn filter(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        Self(self.0.iter().copied().filter(|&row| keep(row)).collect())
    }

    /// Union of two row sets.
    pub fn union(&self, other: &RowSet) -> Self {
        let mut merged = Vec::with_capacity(self.len() + other.len());
        let (mut a, mut b) = (self.0.iter().peekable(), other.0.iter().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (Some(&&x), Some(&&y)) => {
                    if x < y {
                        merged.push(x);
                        a.next();
                    } else if y < x {
                        merged.push(y);
                        b.next();
                    } else {
                        merged.push(x);
                        a.next();
                        b.next();
                    }
                }
                (Some(&&x), None) => {
                    merged.push(x);
                    a.next();
                }
                (None, Some(&&y)) => {
                    merged.push(y);
                    b.next();
                }
                (None, None) => break,
            }
        }
        Self(merged)
    }
}

impl FromIterator<usize> for RowSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_indices(iter.into_iter().collect())
    }
}

/// A named numeric column.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    values: Vec<f64>,
}

/// Immutable snapshot of one test's samples: a timestamp index plus named numeric columns.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    index: Vec<NaiveDateTime>,
    columns: Vec<Column>,
    lookup: HashMap<String, usize>,
}

impl Dataset {
    /// Create a dataset with the given timestamp index and no columns.
    pub fn new(index: Vec<NaiveDateTime>) -> Self {
        Self {
            index,
            columns: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Builder-style [`Dataset::push_column`].
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> AppResult<Self> {
        self.push_column(name, values)?;
        Ok(self)
    }

    /// Add or replace a column. Its length must match the index.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> AppResult<()> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(TsaError::Configuration(format!(
                "Column '{}' has {} values but the dataset has {} rows",
                name,
                values.len(),
                self.index.len()
            )));
        }
        match self.lookup.get(&name) {
            Some(&slot) => self.columns[slot].values = values,
            None => {
                self.lookup.insert(name.clone(), self.columns.len());
                self.columns.push(Column { name, values });
            }
        }
        Ok(())
    }

    /// Number of sample rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Values of a column, if present.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.lookup
            .get(name)
            .map(|&slot| self.columns[slot].values.as_slice())
    }

    /// Values of a column the engine cannot do without.
    pub fn require_column(&self, name: &str) -> AppResult<&[f64]> {
        self.column(name)
            .ok_or_else(|| TsaError::MissingChannel(name.to_string()))
    }

    /// Timestamp of a row.
    pub fn timestamp(&self, row: usize) -> Option<NaiveDateTime> {
        self.index.get(row).copied()
    }

    /// Every row.
    pub fn all_rows(&self) -> RowSet {
        RowSet::all(self.len())
    }

    /// Sorted distinct non-NaN values of a column.
    pub fn distinct_values(&self, name: &str) -> AppResult<Vec<f64>> {
        let mut values: Vec<f64> = self
            .require_column(name)?
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        Ok(values)
    }
}
