//! Limits specification: board metadata and the hierarchical limits table.
//!
//! The table is keyed `mode name → temperature → voltage → (lower, upper)`. LED-binned
//! modes are stored under `"<bin> <mode name>"`. Outage boards have their own branch,
//! keyed by board name, with an `ON` band per voltage and a single voltage-independent
//! `OFF` band.
//!
//! # Example Limits File (`.toml`)
//!
//! ```toml
//! [[boards]]
//! id = "B4"
//! module = "DRL"
//!
//! [[boards]]
//! id = "B6"
//! module = "OUTAGE"
//! outage = true
//!
//! [[limits]]
//! mode = "DRL"
//! temperature = 23
//! voltage = 9.0
//! lower = 1.093
//! upper = 1.335
//!
//! [outage.OUTAGE]
//! off = { lower = 0.0, upper = 0.5 }
//! on = [{ voltage = 9.0, lower = 8.2, upper = 9.0 }]
//! ```

use crate::board::BoardId;
use crate::error::{AppResult, TsaError};
use crate::stats::round_to;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;

/// Closed acceptance band `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitBand {
    /// Lowest in-spec value.
    pub lower: f64,
    /// Highest in-spec value.
    pub upper: f64,
}

impl LimitBand {
    /// Band with both bounds rounded to 3 decimals.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower: round_to(lower, 3),
            upper: round_to(upper, 3),
        }
    }

    /// `center ± tolerance`, used for voltage senses tracking a setpoint.
    pub fn around(center: f64, tolerance: f64) -> Self {
        Self {
            lower: center - tolerance,
            upper: center + tolerance,
        }
    }

    /// Boundary values are in spec.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

impl fmt::Display for LimitBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.lower, self.upper)
    }
}

/// Voltage setpoint quantized to 0.1 V, usable as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoltageKey(i64);

impl VoltageKey {
    /// Quantize a setpoint.
    pub fn from_volts(volts: f64) -> Self {
        Self((volts * 10.0).round() as i64)
    }

    /// Setpoint in volts.
    pub fn volts(self) -> f64 {
        self.0 as f64 / 10.0
    }
}

/// ON/OFF state of the outage board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OutageState {
    /// Outage output energized.
    #[serde(rename = "ON")]
    On,
    /// Outage output de-energized.
    #[serde(rename = "OFF")]
    Off,
}

impl OutageState {
    /// Label used in limits files and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            OutageState::On => "ON",
            OutageState::Off => "OFF",
        }
    }

    /// Value of the board's on/off channel in this state.
    pub fn on_off_value(self) -> f64 {
        match self {
            OutageState::On => 1.0,
            OutageState::Off => 0.0,
        }
    }
}

/// Outage board limits.
#[derive(Debug, Clone, Default)]
pub struct OutageLimits {
    on: BTreeMap<VoltageKey, LimitBand>,
    off: Option<LimitBand>,
}

// File layout

#[derive(Debug, Deserialize)]
struct LimitsFile {
    #[serde(default)]
    boards: Vec<BoardRow>,
    #[serde(default)]
    limits: Vec<LimitRow>,
    #[serde(default)]
    outage: BTreeMap<String, OutageSection>,
}

#[derive(Debug, Deserialize)]
struct BoardRow {
    id: String,
    module: String,
    #[serde(default)]
    led_bins: Vec<String>,
    #[serde(default)]
    outage: bool,
}

#[derive(Debug, Deserialize)]
struct LimitRow {
    mode: String,
    temperature: i32,
    voltage: f64,
    lower: f64,
    upper: f64,
}

#[derive(Debug, Deserialize)]
struct OutageSection {
    #[serde(default)]
    on: Vec<OutageOnRow>,
    off: Option<LimitBand>,
}

#[derive(Debug, Deserialize)]
struct OutageOnRow {
    voltage: f64,
    lower: f64,
    upper: f64,
}

/// Read-only limits specification consumed by the engine.
#[derive(Debug, Clone, Default)]
pub struct LimitsSpec {
    board_module_pairs: BTreeMap<BoardId, String>,
    led_binning: BTreeMap<BoardId, Vec<String>>,
    outage_board: Option<BoardId>,
    table: HashMap<String, BTreeMap<i32, BTreeMap<VoltageKey, LimitBand>>>,
    outage: HashMap<String, OutageLimits>,
}

impl LimitsSpec {
    /// Empty specification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML limits file.
    pub fn from_toml_str(source: &str) -> AppResult<Self> {
        let file: LimitsFile = toml::from_str(source)?;
        let mut spec = Self::new();

        for row in file.boards {
            let id = BoardId::parse(&row.id)?;
            if !row.led_bins.is_empty() {
                spec.led_binning.insert(id, row.led_bins);
            }
            if row.outage {
                spec.outage_board = Some(id);
            }
            spec.board_module_pairs.insert(id, row.module);
        }

        for row in file.limits {
            spec.insert_limit(
                row.mode,
                row.temperature,
                row.voltage,
                LimitBand::new(row.lower, row.upper),
            );
        }

        for (board_name, section) in file.outage {
            for row in section.on {
                spec.insert_outage_on(
                    board_name.clone(),
                    row.voltage,
                    LimitBand::new(row.lower, row.upper),
                );
            }
            if let Some(off) = section.off {
                spec.set_outage_off(board_name, LimitBand::new(off.lower, off.upper));
            }
        }

        Ok(spec)
    }

    /// Load a TOML limits file from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Register a board's module (display) name.
    pub fn with_board(mut self, id: BoardId, module: impl Into<String>) -> Self {
        self.board_module_pairs.insert(id, module.into());
        self
    }

    /// Register the LED bin labels of a board.
    pub fn with_led_bins(mut self, id: BoardId, bins: Vec<String>) -> Self {
        self.led_binning.insert(id, bins);
        self
    }

    /// Designate the outage board.
    pub fn with_outage_board(mut self, id: BoardId) -> Self {
        self.outage_board = Some(id);
        self
    }

    /// Add a current band under `key` (a mode name or `"<bin> <mode name>"`).
    pub fn insert_limit(
        &mut self,
        key: impl Into<String>,
        temperature: i32,
        voltage: f64,
        band: LimitBand,
    ) {
        self.table
            .entry(key.into())
            .or_default()
            .entry(temperature)
            .or_default()
            .insert(VoltageKey::from_volts(voltage), band);
    }

    /// Add an outage ON band for one voltage.
    pub fn insert_outage_on(&mut self, board_name: impl Into<String>, voltage: f64, band: LimitBand) {
        self.outage
            .entry(board_name.into())
            .or_default()
            .on
            .insert(VoltageKey::from_volts(voltage), band);
    }

    /// Set the voltage-independent outage OFF band.
    pub fn set_outage_off(&mut self, board_name: impl Into<String>, band: LimitBand) {
        self.outage.entry(board_name.into()).or_default().off = Some(band);
    }

    /// Module name of a board, e.g. `DRL` for `B4`.
    pub fn module_name(&self, id: &BoardId) -> Option<&str> {
        self.board_module_pairs.get(id).map(String::as_str)
    }

    /// LED bin labels of a board, if it is binned.
    pub fn led_bins(&self, id: &BoardId) -> Option<&[String]> {
        self.led_binning.get(id).map(Vec::as_slice)
    }

    /// The outage board, if the product has one.
    pub fn outage_board(&self) -> Option<BoardId> {
        self.outage_board
    }

    /// Current band for `key` at a temperature and voltage.
    pub fn lookup(&self, key: &str, temperature: i32, voltage: f64) -> AppResult<LimitBand> {
        self.table
            .get(key)
            .and_then(|temps| temps.get(&temperature))
            .and_then(|volts| volts.get(&VoltageKey::from_volts(voltage)))
            .copied()
            .ok_or_else(|| TsaError::LimitNotFound {
                key: key.to_string(),
                temperature,
                voltage,
            })
    }

    /// Outage band for a state. The ON band is keyed by voltage, the OFF band is not.
    pub fn outage_band(
        &self,
        board_name: &str,
        state: OutageState,
        voltage: f64,
    ) -> AppResult<LimitBand> {
        let limits = self.outage.get(board_name);
        let band = match state {
            OutageState::On => {
                limits.and_then(|l| l.on.get(&VoltageKey::from_volts(voltage)).copied())
            }
            OutageState::Off => limits.and_then(|l| l.off),
        };
        band.ok_or_else(|| TsaError::OutageLimitNotFound {
            board: board_name.to_string(),
            state: state.as_str().to_string(),
            voltage: match state {
                OutageState::On => Some(voltage),
                OutageState::Off => None,
            },
        })
    }
}
