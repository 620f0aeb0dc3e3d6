//! # Rust TSA Core Library
//!
//! This crate turns the multi-channel logs of an automotive lighting test station into
//! per-mode statistics checked against a limits specification. A test station drives
//! several interchangeable boards; each board excites a number of lighting systems and
//! reports an ON/OFF indicator, per-system currents and voltage senses.
//!
//! The library expects an already parsed [`data::Dataset`]. Everything from there on
//! (board resolution, mode derivation, multimode aggregation, temperature/voltage
//! binning, limit resolution and out-of-spec dumps) lives here, so that GUIs, report
//! exporters and command-line frontends can share one engine.
//!
//! ## Crate Structure
//!
//! - **`config`**: `RunConfig`, loaded from TOML and `RUST_TSA_` environment variables.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: the `TsaError` taxonomy. Fatal configuration problems are errors;
//!   empty cells are `NotAvailable` values, never errors.
//! - **`data`**: the dataset snapshot and the channel-name classifier.
//! - **`limits`**: the limits specification and its TOML loader.
//! - **`board`**: board ids and the board registry.
//! - **`mode`**: ON/OFF mask decoding and mode enumeration.
//! - **`aggregate`**: summed channels of multimode modes.
//! - **`binning`**: temperature/voltage cells.
//! - **`stats`**: statistics and out-of-spec rules.
//! - **`resolver`**: limit lookup for a channel of a mode.
//! - **`station`**: `TestRun`, the per-test arena and analysis entry point.
//! - **`rotating`**: the size-capped out-of-spec file sink.

pub mod aggregate;
pub mod binning;
pub mod board;
pub mod config;
pub mod data;
pub mod error;
pub mod limits;
pub mod logging;
pub mod mode;
pub mod resolver;
pub mod rotating;
pub mod station;
pub mod stats;

pub use board::{Board, BoardId, BoardRegistry};
pub use config::RunConfig;
pub use data::Dataset;
pub use error::{AppResult, TsaError};
pub use limits::{LimitBand, LimitsSpec};
pub use mode::Mode;
pub use station::TestRun;
