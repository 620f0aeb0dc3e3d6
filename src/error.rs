//! Custom error types for the analysis engine.
//!
//! This module defines the primary error type, `TsaError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the things that can go wrong while turning a test station log into mode statistics.
//!
//! ## Error Hierarchy
//!
//! `TsaError` separates two families that must never be confused by operator tooling:
//!
//! - **Request errors**: the run asked for something that does not exist in the data,
//!   such as a board that was never wired (`BoardNotFound`) or a log with no rows
//!   (`EmptyDataset`).
//! - **Limits errors**: the limits specification is incomplete for a condition that
//!   has data (`LimitNotFound`, `OutageLimitNotFound`, `UnbinnedChannel`).
//!
//! Both families are reported by [`TsaError::is_configuration`]. Wrapped foreign errors
//! (`Io`, `Csv`, `Config`, `LimitsParse`) cover file handling.
//!
//! A condition with no matching rows is *not* an error. It is represented by
//! [`crate::stats::StatValue::NotAvailable`] so that one missing data point never aborts
//! an otherwise valid multi-hour analysis.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, TsaError>;

/// Primary error type for the analysis engine.
#[derive(Error, Debug)]
pub enum TsaError {
    /// A requested board has no channels in the dataset.
    #[error("BoardNotFoundError: \"{board_id}\" was not found in the raw data. Is it ON for this test?")]
    BoardNotFound {
        /// Canonical id of the missing board (e.g. `B3`).
        board_id: String,
    },

    /// The dataset contains no rows at all.
    #[error("Dataset is empty: no sample rows to analyze")]
    EmptyDataset,

    /// The limits specification has no entry for a mode/temperature/voltage that has data.
    #[error("LimitNotFoundError: no limits for '{key}' at {temperature}C / {voltage}V")]
    LimitNotFound {
        /// Limits table key (mode display name, possibly LED-bin qualified).
        key: String,
        /// Temperature of the missing entry.
        temperature: i32,
        /// Voltage setpoint of the missing entry.
        voltage: f64,
    },

    /// The limits specification has no outage band for a state (and voltage, when ON).
    #[error("LimitNotFoundError: no outage {state} limits for '{board}'{}", .voltage.map(|v| format!(" at {v}V")).unwrap_or_default())]
    OutageLimitNotFound {
        /// Display name of the outage board.
        board: String,
        /// `ON` or `OFF`.
        state: String,
        /// Voltage of the missing ON entry.
        voltage: Option<f64>,
    },

    /// A channel of an LED-binned mode does not embed any of the mode's bin labels.
    #[error("Channel '{channel}' of LED-binned mode '{mode}' does not contain any bin label")]
    UnbinnedChannel {
        /// Offending channel name.
        channel: String,
        /// Display name of the mode.
        mode: String,
    },

    /// A board identifier could not be canonicalized.
    #[error("Invalid board id: '{0}'")]
    InvalidBoardId(String),

    /// A channel required by the engine is absent from the dataset.
    #[error("Required channel missing: {0}")]
    MissingChannel(String),

    /// Too many boards for exhaustive ON/OFF mask enumeration.
    #[error("Cannot enumerate modes over {count} boards (maximum {max})")]
    TooManyBoards {
        /// Number of boards requested.
        count: usize,
        /// Supported maximum.
        max: usize,
    },

    /// Semantic configuration problem detected during validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration could not be extracted by figment.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Limits file is not valid TOML or does not match the expected layout.
    #[error("Limits file error: {0}")]
    LimitsParse(#[from] toml::de::Error),

    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure while writing tab-separated row dumps.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<figment::Error> for TsaError {
    fn from(value: figment::Error) -> Self {
        TsaError::Config(Box::new(value))
    }
}

impl TsaError {
    /// True for errors that mean the run request or the limits file is wrong,
    /// as opposed to an I/O failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TsaError::BoardNotFound { .. }
                | TsaError::EmptyDataset
                | TsaError::LimitNotFound { .. }
                | TsaError::OutageLimitNotFound { .. }
                | TsaError::UnbinnedChannel { .. }
                | TsaError::InvalidBoardId(_)
                | TsaError::MissingChannel(_)
                | TsaError::TooManyBoards { .. }
                | TsaError::Configuration(_)
                | TsaError::Config(_)
                | TsaError::LimitsParse(_)
        )
    }

    /// True when the limits specification, rather than the run request, is at fault.
    pub fn is_limits_defect(&self) -> bool {
        matches!(
            self,
            TsaError::LimitNotFound { .. }
                | TsaError::OutageLimitNotFound { .. }
                | TsaError::UnbinnedChannel { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_not_found_is_configuration_not_limits() {
        let err = TsaError::BoardNotFound {
            board_id: "B3".into(),
        };
        assert!(err.is_configuration());
        assert!(!err.is_limits_defect());
        assert!(err.to_string().contains("\"B3\""));
    }

    #[test]
    fn limit_not_found_reports_condition() {
        let err = TsaError::LimitNotFound {
            key: "RED DRL".into(),
            temperature: 85,
            voltage: 13.5,
        };
        assert!(err.is_limits_defect());
        let msg = err.to_string();
        assert!(msg.contains("RED DRL"));
        assert!(msg.contains("85C"));
        assert!(msg.contains("13.5V"));
    }

    #[test]
    fn outage_off_message_has_no_voltage() {
        let err = TsaError::OutageLimitNotFound {
            board: "OUTAGE".into(),
            state: "OFF".into(),
            voltage: None,
        };
        assert_eq!(
            err.to_string(),
            "LimitNotFoundError: no outage OFF limits for 'OUTAGE'"
        );
    }

    #[test]
    fn io_errors_are_not_configuration() {
        let err: TsaError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(!err.is_configuration());
    }
}
