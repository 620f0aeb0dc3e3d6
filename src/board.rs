//! Board identifiers, boards, and the registry that resolves them.
//!
//! A board is one physical driver module of the test station. Its channels come from
//! the typed [`ChannelClassification`]; its display name and outage role come from the
//! [`LimitsSpec`]. Boards are immutable once the registry is built.

use crate::data::ChannelClassification;
use crate::error::{AppResult, TsaError};
use crate::limits::LimitsSpec;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Canonical board identifier, `B<n>`.
///
/// Accepts an integer (`3`) or a string in any case, with or without the prefix
/// (`"b3"`, `"B3"`, `"3"`). Orders numerically, so `B2 < B10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId(u32);

impl BoardId {
    /// Board with the given number.
    pub fn new(number: u32) -> Self {
        Self(number)
    }

    /// Canonicalize a textual board identifier.
    pub fn parse(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix('B')
            .or_else(|| trimmed.strip_prefix('b'))
            .unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TsaError::InvalidBoardId(raw.to_string()));
        }
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| TsaError::InvalidBoardId(raw.to_string()))
    }

    /// Board number.
    pub fn number(self) -> u32 {
        self.0
    }
}

impl From<u32> for BoardId {
    fn from(number: u32) -> Self {
        Self(number)
    }
}

impl FromStr for BoardId {
    type Err = TsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl Serialize for BoardId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One driver module and the channels that belong to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    /// Canonical id.
    pub id: BoardId,
    /// Module name from the limits specification, or the id when unknown.
    pub name: String,
    /// Whether this is the product's outage board.
    pub is_outage: bool,
    /// Current channels ordered by test position.
    pub current_channels: Vec<String>,
    /// Voltage-sense channels.
    pub voltage_sense_channels: Vec<String>,
    /// ON/OFF indicator channel.
    pub on_off_channel: String,
}

impl Board {
    /// System label of a channel: the channel name without its board prefix,
    /// e.g. `TP4: System 46` for `B3 TP4: System 46`.
    pub fn system_label(channel: &str) -> &str {
        channel
            .split_once(' ')
            .map(|(_, label)| label)
            .unwrap_or(channel)
    }

    /// System labels in test-position order.
    pub fn system_labels(&self) -> impl Iterator<Item = &str> {
        self.current_channels.iter().map(|c| Self::system_label(c))
    }

    /// True when both boards label their common system positions identically,
    /// which is what makes their currents safe to sum position by position.
    pub fn shares_system_labels(&self, other: &Board) -> bool {
        if self.current_channels.is_empty() || other.current_channels.is_empty() {
            return false;
        }
        self.system_labels()
            .zip(other.system_labels())
            .all(|(a, b)| a == b)
    }
}

/// Resolves board ids to boards for one test run.
#[derive(Debug, Clone, Default)]
pub struct BoardRegistry {
    boards: Vec<Board>,
}

impl BoardRegistry {
    /// Build the registry for the requested boards, or every board present when
    /// `requested` is empty.
    ///
    /// A requested board with no channels in the data is a fatal
    /// [`TsaError::BoardNotFound`]. A board without a module name in the limits
    /// specification is logged and named after its id.
    pub fn build(
        classification: &ChannelClassification,
        limits: Option<&LimitsSpec>,
        requested: &[BoardId],
    ) -> AppResult<Self> {
        let present = classification.board_ids();
        let mut ids: Vec<BoardId> = if requested.is_empty() {
            present.clone()
        } else {
            requested.to_vec()
        };
        ids.sort_unstable();
        ids.dedup();

        let mut boards = Vec::with_capacity(ids.len());
        for id in ids {
            if !present.contains(&id) {
                return Err(TsaError::BoardNotFound {
                    board_id: id.to_string(),
                });
            }
            let on_off_channel = classification
                .on_off
                .get(&id)
                .cloned()
                .ok_or_else(|| TsaError::MissingChannel(format!("{id} ON/OFF")))?;

            let board = Board {
                id,
                name: resolve_name(id, limits),
                is_outage: limits.and_then(LimitsSpec::outage_board) == Some(id),
                current_channels: classification.currents.get(&id).cloned().unwrap_or_default(),
                voltage_sense_channels: classification
                    .voltage_senses
                    .get(&id)
                    .cloned()
                    .unwrap_or_default(),
                on_off_channel,
            };
            debug!(
                board = %board.id,
                name = %board.name,
                outage = board.is_outage,
                systems = board.current_channels.len(),
                "Resolved board"
            );
            boards.push(board);
        }

        Ok(Self { boards })
    }

    /// Look up a board by id.
    pub fn resolve(&self, id: BoardId) -> AppResult<&Board> {
        self.boards
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| TsaError::BoardNotFound {
                board_id: id.to_string(),
            })
    }

    /// Look up a board by a raw identifier such as `3` or `"b3"`.
    pub fn resolve_raw(&self, raw: &str) -> AppResult<&Board> {
        self.resolve(BoardId::parse(raw)?)
    }

    /// All boards in board order.
    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    /// Position of a board in board order.
    pub fn index_of(&self, id: BoardId) -> Option<usize> {
        self.boards.iter().position(|b| b.id == id)
    }

    /// The outage board, if it is part of this run.
    pub fn outage(&self) -> Option<&Board> {
        self.boards.iter().find(|b| b.is_outage)
    }

    /// Number of boards.
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// True if no boards were resolved.
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}

fn resolve_name(id: BoardId, limits: Option<&LimitsSpec>) -> String {
    match limits.and_then(|l| l.module_name(&id)) {
        Some(name) => name.to_string(),
        None => {
            warn!(board = %id, "Could not load board name; using board id");
            id.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::classify_channels;
    use tracing_test::traced_test;

    fn classification() -> ChannelClassification {
        classify_channels([
            "B3 TP1: System 5",
            "B3 TP2: System 9",
            "B3 ON/OFF",
            "B3 Vsense 1",
            "B4 TP1: System 5",
            "B4 TP2: System 9",
            "B4 ON/OFF",
            "B6 TP1: Outage 1",
            "B6 ON/OFF",
            "Temp TC1",
            "VSetpoint",
        ])
    }

    #[test]
    fn board_id_canonicalizes() {
        assert_eq!(BoardId::parse("b3").unwrap(), BoardId::new(3));
        assert_eq!(BoardId::parse("B3").unwrap(), BoardId::new(3));
        assert_eq!(BoardId::parse("3").unwrap(), BoardId::new(3));
        assert_eq!(BoardId::from(3).to_string(), "B3");
        assert!(BoardId::parse("TP3").is_err());
        assert!(BoardId::parse("B").is_err());
        assert!(BoardId::new(2) < BoardId::new(10));
    }

    #[test]
    fn outage_is_decided_by_limits_not_number() {
        let limits = LimitsSpec::new()
            .with_board(BoardId::new(3), "PARK")
            .with_board(BoardId::new(4), "DRL")
            .with_board(BoardId::new(6), "TURN")
            .with_outage_board(BoardId::new(4));
        let registry = BoardRegistry::build(&classification(), Some(&limits), &[]).unwrap();
        assert!(registry.resolve(BoardId::new(4)).unwrap().is_outage);
        assert!(!registry.resolve(BoardId::new(6)).unwrap().is_outage);
        assert_eq!(registry.outage().map(|b| b.name.as_str()), Some("DRL"));
    }

    #[test]
    fn requested_board_missing_from_data_is_fatal() {
        let err = BoardRegistry::build(&classification(), None, &[BoardId::new(5)]).unwrap_err();
        assert!(matches!(err, TsaError::BoardNotFound { ref board_id } if board_id == "B5"));
    }

    #[test]
    #[traced_test]
    fn missing_board_name_falls_back_to_id() {
        let limits = LimitsSpec::new().with_board(BoardId::new(3), "PARK");
        let registry =
            BoardRegistry::build(&classification(), Some(&limits), &[BoardId::new(3), BoardId::new(4)])
                .unwrap();
        assert_eq!(registry.resolve_raw("b3").unwrap().name, "PARK");
        assert_eq!(registry.resolve_raw("4").unwrap().name, "B4");
        assert!(logs_contain("Could not load board name"));
    }

    #[test]
    fn shared_system_labels() {
        let registry = BoardRegistry::build(&classification(), None, &[]).unwrap();
        let b3 = registry.resolve(BoardId::new(3)).unwrap();
        let b4 = registry.resolve(BoardId::new(4)).unwrap();
        let b6 = registry.resolve(BoardId::new(6)).unwrap();
        assert!(b3.shares_system_labels(b4));
        assert!(!b3.shares_system_labels(b6));
        assert_eq!(Board::system_label("B3 TP1: System 5"), "TP1: System 5");
    }
}
