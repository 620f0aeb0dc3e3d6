//! Limit resolution for current, outage and voltage-sense channels.

use crate::board::Board;
use crate::error::{AppResult, TsaError};
use crate::limits::{LimitBand, LimitsSpec, OutageState};
use crate::mode::Mode;

/// Band a voltage sense is expected to stay within: `setpoint ± tolerance`.
pub fn voltage_sense_band(setpoint: f64, voltage_tolerance: f64) -> LimitBand {
    LimitBand::around(setpoint, voltage_tolerance)
}

/// Resolves limit bands from a [`LimitsSpec`].
#[derive(Debug, Clone, Copy)]
pub struct LimitResolver<'a> {
    limits: &'a LimitsSpec,
}

impl<'a> LimitResolver<'a> {
    /// Resolver over a limits specification.
    pub fn new(limits: &'a LimitsSpec) -> Self {
        Self { limits }
    }

    /// LED bin of a channel: the first of the mode's bin labels contained in its name.
    pub fn bin_for<'m>(mode: &'m Mode, channel: &str) -> Option<&'m str> {
        mode.led_bins
            .iter()
            .map(String::as_str)
            .find(|bin| channel.contains(bin))
    }

    /// Limits table key of a channel of `mode`.
    ///
    /// Binned modes use `"<bin> <mode name>"`; a binned channel carrying no bin label
    /// is an [`TsaError::UnbinnedChannel`].
    pub fn key_for(mode: &Mode, channel: &str) -> AppResult<String> {
        if !mode.has_led_binning {
            return Ok(mode.display_name.clone());
        }
        Self::bin_for(mode, channel)
            .map(|bin| format!("{bin} {}", mode.display_name))
            .ok_or_else(|| TsaError::UnbinnedChannel {
                channel: channel.to_string(),
                mode: mode.display_name.clone(),
            })
    }

    /// Current band for one channel of a mode.
    pub fn current_band(
        &self,
        mode: &Mode,
        channel: &str,
        temperature: i32,
        voltage: f64,
    ) -> AppResult<LimitBand> {
        let key = Self::key_for(mode, channel)?;
        self.limits.lookup(&key, temperature, voltage)
    }

    /// Outage band: ON is keyed by voltage, OFF ignores it.
    pub fn outage_band(
        &self,
        board: &Board,
        state: OutageState,
        voltage: f64,
    ) -> AppResult<LimitBand> {
        self.limits.outage_band(&board.name, state, voltage)
    }
}
