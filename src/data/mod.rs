//! Tabular dataset and channel classification.
pub mod channels;
pub mod dataset;

pub use channels::{classify_channels, ChannelClassification, ChannelRole};
pub use dataset::{parse_cell, Dataset, RowSet};
