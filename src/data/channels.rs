//! Pattern-rule classification of raw channel names.
//!
//! Classification is a pure function of the column names. Everything downstream of it
//! (boards, modes, binning) consumes the typed [`ChannelClassification`] and never
//! parses a channel name again.
//!
//! | Pattern | Role |
//! |---|---|
//! | `B<n> TP<k>: <label>` | current (an empty label marks an empty test position and is dropped) |
//! | `B<n> Vsense <x>` | voltage sense |
//! | `B<n> ON/OFF`, `ON/OFF B<n>` | on/off indicator |
//! | `Temp…`, `Amb Temp…` | thermocouple |
//! | `VSetpoint` (any case) | voltage setpoint |

use crate::board::BoardId;
use crate::data::Dataset;
use crate::error::AppResult;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Readings beyond this magnitude mean a thermocouple was not attached.
pub const THERMOCOUPLE_SANITY_LIMIT: f64 = 150.0;

static CURRENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[Bb](\d+)\s+TP(\d+):\s*(.*)$").expect("Invalid current channel regex")
});
static VSENSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Bb](\d+)\s+Vsense\s.*$").expect("Invalid vsense channel regex"));
static ON_OFF_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Bb](\d+)\s+ON/OFF$").expect("Invalid on/off channel regex"));
static ON_OFF_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ON/OFF\s+[Bb](\d+)$").expect("Invalid on/off channel regex"));
static THERMOCOUPLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Amb\s+)?Temp").expect("Invalid thermocouple regex"));

/// Role of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRole {
    /// Current of one system at a test position.
    Current {
        /// Owning board.
        board: BoardId,
        /// Test position number (`TP<k>`).
        position: u32,
    },
    /// A test position with no system attached.
    EmptyPosition {
        /// Owning board.
        board: BoardId,
    },
    /// Voltage sense of a board.
    VoltageSense {
        /// Owning board.
        board: BoardId,
    },
    /// ON/OFF indicator of a board.
    OnOff {
        /// Owning board.
        board: BoardId,
    },
    /// Temperature reading.
    Thermocouple,
    /// Applied voltage setpoint.
    Setpoint,
    /// Anything else; ignored by the engine.
    Other,
}

/// Classify a single channel name.
pub fn classify_channel(name: &str) -> ChannelRole {
    let board = |digits: &str| digits.parse::<u32>().ok().map(BoardId::new);

    if let Some(caps) = CURRENT_RE.captures(name) {
        if let (Some(b), Ok(position)) = (board(&caps[1]), caps[2].parse::<u32>()) {
            if caps[3].trim().is_empty() {
                return ChannelRole::EmptyPosition { board: b };
            }
            return ChannelRole::Current { board: b, position };
        }
    }
    if let Some(b) = VSENSE_RE.captures(name).and_then(|c| board(&c[1])) {
        return ChannelRole::VoltageSense { board: b };
    }
    if let Some(b) = ON_OFF_PREFIX_RE
        .captures(name)
        .or_else(|| ON_OFF_SUFFIX_RE.captures(name))
        .and_then(|c| board(&c[1]))
    {
        return ChannelRole::OnOff { board: b };
    }
    if THERMOCOUPLE_RE.is_match(name) {
        return ChannelRole::Thermocouple;
    }
    if name.trim().eq_ignore_ascii_case("vsetpoint") {
        return ChannelRole::Setpoint;
    }
    ChannelRole::Other
}

/// Channel names grouped by role and board.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelClassification {
    /// Current channels per board, ordered by test position.
    pub currents: BTreeMap<BoardId, Vec<String>>,
    /// Voltage-sense channels per board.
    pub voltage_senses: BTreeMap<BoardId, Vec<String>>,
    /// ON/OFF channel per board.
    pub on_off: BTreeMap<BoardId, String>,
    /// Thermocouple channels in column order.
    pub thermocouples: Vec<String>,
    /// Voltage setpoint channel.
    pub setpoint: Option<String>,
}

/// Classify every channel name of a dataset.
pub fn classify_channels<I, S>(names: I) -> ChannelClassification
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = ChannelClassification::default();
    let mut positioned: BTreeMap<BoardId, Vec<(u32, String)>> = BTreeMap::new();

    for name in names {
        let name = name.as_ref();
        match classify_channel(name) {
            ChannelRole::Current { board, position } => {
                positioned
                    .entry(board)
                    .or_default()
                    .push((position, name.to_string()));
            }
            ChannelRole::EmptyPosition { board } => {
                debug!(board = %board, channel = name, "Dropping empty test position");
            }
            ChannelRole::VoltageSense { board } => {
                out.voltage_senses
                    .entry(board)
                    .or_default()
                    .push(name.to_string());
            }
            ChannelRole::OnOff { board } => {
                out.on_off.insert(board, name.to_string());
            }
            ChannelRole::Thermocouple => out.thermocouples.push(name.to_string()),
            ChannelRole::Setpoint => out.setpoint = Some(name.to_string()),
            ChannelRole::Other => {}
        }
    }

    for (board, mut channels) in positioned {
        channels.sort_by_key(|(position, _)| *position);
        out.currents
            .insert(board, channels.into_iter().map(|(_, name)| name).collect());
    }
    out
}

impl ChannelClassification {
    /// Boards with at least one channel, in board order.
    pub fn board_ids(&self) -> Vec<BoardId> {
        let mut ids: Vec<BoardId> = self
            .currents
            .keys()
            .chain(self.voltage_senses.keys())
            .chain(self.on_off.keys())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Thermocouples whose readings all stay within ±150 °C.
    pub fn usable_thermocouples(&self, dataset: &Dataset) -> Vec<String> {
        self.thermocouples
            .iter()
            .filter(|tc| {
                let sane = dataset.column(tc).is_some_and(|values| {
                    values
                        .iter()
                        .all(|v| v.is_nan() || v.abs() <= THERMOCOUPLE_SANITY_LIMIT)
                });
                if !sane {
                    warn!(channel = %tc, "Discarding faulty thermocouple");
                }
                sane
            })
            .cloned()
            .collect()
    }

    /// Pick the ambient reference thermocouple.
    ///
    /// An explicit override must name a column of the dataset. Otherwise the first
    /// usable thermocouple containing `tc1` wins, falling back to the first usable one.
    pub fn select_ambient(
        &self,
        dataset: &Dataset,
        override_channel: Option<&str>,
    ) -> AppResult<Option<String>> {
        if let Some(name) = override_channel {
            dataset.require_column(name)?;
            return Ok(Some(name.to_string()));
        }

        let usable = self.usable_thermocouples(dataset);
        if let Some(tc1) = usable.iter().find(|tc| tc.to_lowercase().contains("tc1")) {
            return Ok(Some(tc1.clone()));
        }
        match usable.into_iter().next() {
            Some(first) => {
                warn!(
                    channel = %first,
                    "\"TC1\" not found in any thermocouple name; using first thermocouple as ambient"
                );
                Ok(Some(first))
            }
            None => Ok(None),
        }
    }
}
