//! Mode derivation from ON/OFF indicator channels.
//!
//! Every row of the dataset carries one ON/OFF reading per board. Read together they
//! form a bitmask over the boards in board order. The enumerator considers every
//! non-zero mask, keeps those that actually occur in the data, removes the outage board
//! from each mask's identity and merges masks that collapse to the same identity.
//!
//! Mode ordering is part of the output contract: fewer boards first, then board order.
//! Board order is numeric (`B2` before `B10`), which differs from sorting the `B<n>`
//! strings only once a station has boards numbered above 9.
//!
//! A row matches a mask only when *every* board's ON/OFF channel equals the mask's bit,
//! so a board that should be off must read `0`. Rows with any other reading (including
//! `NaN`) match no mask and belong to no mode. Consequently no row is ever shared
//! between two modes.

use crate::aggregate::{build_aggregates, AggregateChannel};
use crate::board::{Board, BoardId, BoardRegistry};
use crate::data::{Dataset, RowSet};
use crate::error::{AppResult, TsaError};
use crate::limits::LimitsSpec;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Largest board count accepted for exhaustive mask enumeration.
pub const MAX_BOARDS: usize = 16;

/// ON/OFF pattern over the boards of a run; bit `i` from the left is board `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mask {
    bits: u32,
    len: usize,
}

impl Mask {
    /// Mask from its raw bits.
    pub fn new(bits: u32, len: usize) -> Self {
        Self { bits, len }
    }

    /// Every non-zero mask of `len` boards, in ascending binary order.
    pub fn all_active(len: usize) -> impl Iterator<Item = Mask> {
        (1u32..(1u32 << len)).map(move |bits| Mask::new(bits, len))
    }

    /// Whether board `index` is ON.
    pub fn is_on(&self, index: usize) -> bool {
        index < self.len && self.bits & (1 << (self.len - 1 - index)) != 0
    }

    /// Number of boards ON.
    pub fn count_on(&self) -> usize {
        self.bits.count_ones() as usize
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$b}", self.bits, width = self.len)
    }
}

/// Decode a mask string over `board_ids` into the concatenated ids of the ON boards.
///
/// ```
/// use rust_tsa::mode::mask_to_mode;
/// assert_eq!(mask_to_mode("1001", &["B3", "B4", "B5", "B6"]), "B3B6");
/// ```
pub fn mask_to_mode<S: AsRef<str>>(mask: &str, board_ids: &[S]) -> String {
    mask.chars()
        .zip(board_ids)
        .filter(|(bit, _)| *bit == '1')
        .map(|(_, id)| id.as_ref())
        .collect()
}

/// Concatenated identity of a set of boards, e.g. `B3B6`.
pub fn mode_identity(board_ids: &[BoardId]) -> String {
    board_ids.iter().map(BoardId::to_string).collect()
}

/// Remove the outage board from a mode identity. A no-op when it is absent.
pub fn strip_outage(board_ids: &[BoardId], outage: Option<BoardId>) -> Vec<BoardId> {
    board_ids
        .iter()
        .copied()
        .filter(|id| Some(*id) != outage)
        .collect()
}

/// One excitation state: a set of non-outage boards energized together.
#[derive(Debug, Clone)]
pub struct Mode {
    /// Constituent boards in board order.
    pub board_ids: Vec<BoardId>,
    /// Module names concatenated in board order, e.g. `DRLTURN`.
    pub display_name: String,
    /// More than one board.
    pub is_multimode: bool,
    /// Whether any constituent board is LED-binned.
    pub has_led_binning: bool,
    /// Bin labels of the constituent boards, first occurrence order.
    pub led_bins: Vec<String>,
    /// Rows where exactly this combination is active.
    pub rows: RowSet,
    /// Summed channels; empty unless multimode.
    pub aggregate_channels: Vec<AggregateChannel>,
    /// Current channels of a single-board mode.
    pub current_channels: Vec<String>,
    /// Voltage-sense channels of the constituent boards.
    pub voltage_sense_channels: Vec<String>,
}

impl Mode {
    /// Channels checked against the limits table: the aggregates of a multimode mode,
    /// otherwise the board's own current channels.
    pub fn analysed_channels(&self) -> Vec<&str> {
        if self.is_multimode {
            self.aggregate_channels
                .iter()
                .map(|a| a.name.as_str())
                .collect()
        } else {
            self.current_channels.iter().map(String::as_str).collect()
        }
    }

    /// Aggregate definition by name.
    pub fn aggregate(&self, name: &str) -> Option<&AggregateChannel> {
        self.aggregate_channels.iter().find(|a| a.name == name)
    }

    /// Concatenated board ids, e.g. `B3B4`.
    pub fn identity(&self) -> String {
        mode_identity(&self.board_ids)
    }
}

/// Derives the modes of a run.
pub struct ModeEnumerator<'a> {
    dataset: &'a Dataset,
    registry: &'a BoardRegistry,
    limits: Option<&'a LimitsSpec>,
    multimode: bool,
}

impl<'a> ModeEnumerator<'a> {
    /// Enumerator over a dataset and its resolved boards.
    pub fn new(
        dataset: &'a Dataset,
        registry: &'a BoardRegistry,
        limits: Option<&'a LimitsSpec>,
        multimode: bool,
    ) -> Self {
        Self {
            dataset,
            registry,
            limits,
            multimode,
        }
    }

    /// Observed masks and their rows, in ascending mask order.
    pub fn observed_masks(&self) -> AppResult<BTreeMap<Mask, RowSet>> {
        if self.dataset.is_empty() {
            return Err(TsaError::EmptyDataset);
        }
        let boards = self.registry.boards();
        if boards.len() > MAX_BOARDS {
            return Err(TsaError::TooManyBoards {
                count: boards.len(),
                max: MAX_BOARDS,
            });
        }
        let on_off = boards
            .iter()
            .map(|b| self.dataset.require_column(&b.on_off_channel))
            .collect::<AppResult<Vec<_>>>()?;

        let mut by_mask: HashMap<u32, Vec<usize>> = HashMap::new();
        'rows: for row in 0..self.dataset.len() {
            let mut bits = 0u32;
            for column in &on_off {
                let state = column[row];
                bits <<= 1;
                if state == 1.0 {
                    bits |= 1;
                } else if state != 0.0 {
                    continue 'rows;
                }
            }
            by_mask.entry(bits).or_default().push(row);
        }

        // Mask order is the order of Mask::all_active; the zero mask is never a mode.
        Ok(Mask::all_active(boards.len())
            .filter_map(|mask| {
                by_mask
                    .remove(&mask.bits)
                    .map(|rows| (mask, RowSet::from_indices(rows)))
            })
            .collect())
    }

    /// Enumerate, merge, order and materialize the modes.
    pub fn enumerate(&self) -> AppResult<Vec<Mode>> {
        let boards = self.registry.boards();
        let outage = self.registry.outage().map(|b| b.id);
        let outage_index = outage.and_then(|id| self.registry.index_of(id));

        let mut merged: BTreeMap<(usize, Vec<BoardId>), RowSet> = BTreeMap::new();
        for (mask, rows) in self.observed_masks()? {
            let active_current = mask.count_on()
                - outage_index.map_or(0, |i| usize::from(mask.is_on(i)));
            if !self.multimode && active_current != 1 {
                continue;
            }
            let on: Vec<BoardId> = boards
                .iter()
                .enumerate()
                .filter(|(i, _)| mask.is_on(*i))
                .map(|(_, b)| b.id)
                .collect();
            let identity = strip_outage(&on, outage);
            if identity.is_empty() {
                continue;
            }
            debug!(mask = %mask, mode = %mode_identity(&identity), rows = rows.len(), "Observed mask");
            let key = (identity.len(), identity);
            let entry = merged.entry(key).or_default();
            *entry = entry.union(&rows);
        }

        let present: Vec<String> = merged.keys().map(|(_, ids)| mode_identity(ids)).collect();
        info!(modes = ?present, "Board combinations present in data");

        let mut modes = Vec::with_capacity(merged.len());
        for ((_, ids), rows) in merged {
            let members = ids
                .iter()
                .map(|id| self.registry.resolve(*id))
                .collect::<AppResult<Vec<&Board>>>()?;
            if !Self::is_eligible(&members) {
                debug!(mode = %mode_identity(&ids), "Skipping combination without matching system labels");
                continue;
            }
            modes.push(self.materialize(ids, &members, rows));
        }
        Ok(modes)
    }

    /// A single board, or exactly two boards exposing the same system labels.
    pub fn is_eligible(members: &[&Board]) -> bool {
        match members {
            [_] => true,
            [a, b] => a.shares_system_labels(b),
            _ => false,
        }
    }

    fn materialize(&self, board_ids: Vec<BoardId>, members: &[&Board], rows: RowSet) -> Mode {
        let display_name: String = members.iter().map(|b| b.name.as_str()).collect();
        let is_multimode = members.len() > 1;

        let mut led_bins: Vec<String> = Vec::new();
        for id in &board_ids {
            let bins = self.limits.and_then(|l| l.led_bins(id)).unwrap_or_default();
            for bin in bins {
                if !led_bins.contains(bin) {
                    led_bins.push(bin.clone());
                }
            }
        }

        let aggregate_channels = if is_multimode {
            build_aggregates(&display_name, members)
        } else {
            Vec::new()
        };
        let current_channels = if is_multimode {
            Vec::new()
        } else {
            members
                .iter()
                .flat_map(|b| b.current_channels.iter().cloned())
                .collect()
        };

        Mode {
            has_led_binning: !led_bins.is_empty(),
            led_bins,
            board_ids,
            display_name,
            is_multimode,
            rows,
            aggregate_channels,
            current_channels,
            voltage_sense_channels: members
                .iter()
                .flat_map(|b| b.voltage_sense_channels.iter().cloned())
                .collect(),
        }
    }
}
