//! Summed current channels for modes driven by several boards.
//!
//! Aggregates are described, not materialized: an [`AggregateChannel`] names the source
//! channel of every constituent board at one system position, and its values are
//! recomputed on demand over a row set. The dataset and the boards' own channels are
//! never modified.

use crate::board::{Board, BoardId};
use crate::data::{Dataset, RowSet};
use crate::error::AppResult;
use crate::stats::{StatValue, Stats};
use serde::Serialize;

/// One source channel of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSource {
    /// Board owning the channel.
    pub board: BoardId,
    /// Current channel of that board at the aggregate's position.
    pub channel: String,
}

/// Sum of one system position's current across the boards of a mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateChannel {
    /// Mode display name followed by the shared system label, e.g. `DRLTURN TP1: System 5`.
    pub name: String,
    /// Shared system label, e.g. `TP1: System 5`.
    pub label: String,
    /// Source channels in board order.
    pub sources: Vec<AggregateSource>,
}

/// Per-board extremes of an aggregate's source channel within a cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    /// Contributing board.
    pub board: BoardId,
    /// Source channel.
    pub channel: String,
    /// Statistics of the source channel over the cell's rows.
    pub stats: StatValue,
}

/// Describe the aggregates of a multimode mode: one per system position common to
/// every board.
pub fn build_aggregates(display_name: &str, boards: &[&Board]) -> Vec<AggregateChannel> {
    let Some(first) = boards.first() else {
        return Vec::new();
    };
    let positions = boards
        .iter()
        .map(|b| b.current_channels.len())
        .min()
        .unwrap_or(0);

    (0..positions)
        .map(|i| {
            let label = Board::system_label(&first.current_channels[i]).to_string();
            AggregateChannel {
                name: format!("{display_name} {label}"),
                label,
                sources: boards
                    .iter()
                    .map(|b| AggregateSource {
                        board: b.id,
                        channel: b.current_channels[i].clone(),
                    })
                    .collect(),
            }
        })
        .collect()
}

impl AggregateChannel {
    /// Elementwise sum of the source channels over `rows`. A NaN in any source makes
    /// that row's sum NaN, which statistics then exclude.
    pub fn values(&self, dataset: &Dataset, rows: &RowSet) -> AppResult<Vec<f64>> {
        let columns = self
            .sources
            .iter()
            .map(|s| dataset.require_column(&s.channel))
            .collect::<AppResult<Vec<_>>>()?;

        Ok(rows
            .iter()
            .map(|row| columns.iter().map(|c| c[row]).sum())
            .collect())
    }

    /// Statistics of each source channel over `rows`.
    pub fn contributions(&self, dataset: &Dataset, rows: &RowSet) -> AppResult<Vec<Contribution>> {
        self.sources
            .iter()
            .map(|source| {
                let column = dataset.require_column(&source.channel)?;
                Ok(Contribution {
                    board: source.board,
                    channel: source.channel.clone(),
                    stats: Stats::compute(rows.iter().map(|row| column[row])),
                })
            })
            .collect()
    }
}
