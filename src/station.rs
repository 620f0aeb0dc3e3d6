//! The test run: owns the dataset, boards, modes and the statistics cache.
//!
//! `TestRun` is an arena. Boards live in the [`BoardRegistry`], modes in a vector, and
//! every cross reference is a [`BoardId`] or a mode index. Construction performs the
//! whole derivation (classification, boards, ambient selection, voltage scan, modes);
//! afterwards only the statistics cache changes, filled lazily per
//! (mode, temperature, voltage).
//!
//! ## Example
//!
//! ```no_run
//! use rust_tsa::config::RunConfig;
//! use rust_tsa::data::Dataset;
//! use rust_tsa::rotating::RotatingWriter;
//! use rust_tsa::station::TestRun;
//!
//! # fn run(dataset: Dataset) -> rust_tsa::error::AppResult<()> {
//! let config = RunConfig::load_from("tsa.toml")?;
//! let mut run = TestRun::from_config(config, dataset)?;
//! for report in run.analyze()? {
//!     println!("{} {}C {}V out of spec: {}", report.mode, report.temperature, report.voltage, report.is_out_of_spec());
//! }
//! let mut writer = RotatingWriter::from_config(run.config())?;
//! run.dump_out_of_spec(&mut writer)?;
//! # Ok(())
//! # }
//! ```

use crate::aggregate::Contribution;
use crate::binning::{Binner, Cell};
use crate::board::{Board, BoardId, BoardRegistry};
use crate::config::RunConfig;
use crate::data::dataset::TIMESTAMP_FORMAT;
use crate::data::{classify_channels, Dataset, RowSet};
use crate::error::{AppResult, TsaError};
use crate::limits::{LimitBand, LimitsSpec, OutageState};
use crate::mode::{Mode, ModeEnumerator};
use crate::resolver::{voltage_sense_band, LimitResolver};
use crate::rotating::{RotatingWriter, WriteStatus};
use crate::stats::{OutOfSpecCount, StatValue, Stats};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Analysis label of rows whose voltage sense left the setpoint window.
pub const VIN_ANALYSIS: &str = "Out of spec data rows - Vin";
/// Analysis label of rows whose current left its limit band.
pub const IIN_ANALYSIS: &str = "Out of spec data rows - Iin";

/// Statistics and verdict of one channel within one cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelReport {
    /// Channel (or aggregate) name.
    pub channel: String,
    /// Rounded statistics, or `NotAvailable`.
    pub stats: StatValue,
    /// Band the channel was checked against, if any.
    pub limits: Option<LimitBand>,
    /// Any-excursion verdict; `None` when no check was made.
    pub out_of_spec: Option<bool>,
    /// Samples outside the band.
    pub count: Option<OutOfSpecCount>,
    /// Per-board breakdown of an aggregate.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contributions: Vec<Contribution>,
}

impl ChannelReport {
    fn evaluate(channel: &str, values: &[f64], band: Option<LimitBand>) -> Self {
        let stats = Stats::compute(values.iter().copied());
        let band = band.filter(|_| !stats.is_not_available());
        Self {
            channel: channel.to_string(),
            out_of_spec: band
                .as_ref()
                .and_then(|b| stats.stats().map(|s| s.is_out_of_spec(b))),
            count: band
                .as_ref()
                .map(|b| OutOfSpecCount::count(values.iter().copied(), b)),
            stats,
            limits: band,
            contributions: Vec::new(),
        }
    }

    /// Percentage of samples outside the band, when a band was applied.
    pub fn percent_out(&self) -> Option<f64> {
        self.count.map(|c| c.percent())
    }
}

/// Everything computed for one (mode, temperature, voltage) cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellReport {
    /// Mode display name.
    pub mode: String,
    /// Analysis temperature.
    pub temperature: i32,
    /// Voltage setpoint.
    pub voltage: f64,
    /// Number of rows in the cell.
    pub rows: usize,
    /// Current channels (aggregates for multimode).
    pub currents: Vec<ChannelReport>,
    /// Voltage senses, checked against the setpoint window.
    pub voltage_senses: Vec<ChannelReport>,
}

impl CellReport {
    /// True when no rows fell in the cell.
    pub fn is_not_available(&self) -> bool {
        self.rows == 0
    }

    /// True if any channel of the cell failed its check.
    pub fn is_out_of_spec(&self) -> bool {
        self.currents
            .iter()
            .chain(&self.voltage_senses)
            .any(|c| c.out_of_spec == Some(true))
    }

    /// Report of one channel.
    pub fn channel(&self, name: &str) -> Option<&ChannelReport> {
        self.currents
            .iter()
            .chain(&self.voltage_senses)
            .find(|c| c.channel == name)
    }
}

/// Outage board statistics in one state at one (temperature, voltage).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutageReport {
    /// Outage board display name.
    pub board: String,
    /// ON or OFF.
    pub state: OutageState,
    /// Analysis temperature.
    pub temperature: i32,
    /// Voltage setpoint.
    pub voltage: f64,
    /// Number of rows in the cell.
    pub rows: usize,
    /// One report per outage channel.
    pub channels: Vec<ChannelReport>,
}

/// Offending rows of one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutOfSpecRows {
    /// Rows where a voltage sense left `setpoint ± voltage_tolerance`.
    pub vin: RowSet,
    /// Rows where a current left its limit band.
    pub iin: RowSet,
}

/// Cache key of a cell. The setpoint is held by its bit pattern so the key matches
/// exactly the rows the binner selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey {
    mode: usize,
    temperature: i32,
    voltage: u64,
}

impl CellKey {
    fn new(mode: usize, temperature: i32, voltage: f64) -> Self {
        Self {
            mode,
            temperature,
            // -0.0 and 0.0 bin the same rows
            voltage: (voltage + 0.0).to_bits(),
        }
    }
}

/// One analysed test.
#[derive(Debug)]
pub struct TestRun {
    config: RunConfig,
    dataset: Dataset,
    limits: Option<LimitsSpec>,
    registry: BoardRegistry,
    modes: Vec<Mode>,
    voltages: Vec<f64>,
    ambient: String,
    setpoint: String,
    cache: HashMap<CellKey, CellReport>,
}

impl TestRun {
    /// Derive boards and modes for a dataset.
    ///
    /// Fails on an empty dataset, a requested board missing from the data, or a
    /// dataset without setpoint or usable thermocouple.
    pub fn new(config: RunConfig, dataset: Dataset, limits: Option<LimitsSpec>) -> AppResult<Self> {
        config.validate()?;
        if dataset.is_empty() {
            return Err(TsaError::EmptyDataset);
        }

        let classification = classify_channels(dataset.column_names());
        let setpoint = classification
            .setpoint
            .clone()
            .ok_or_else(|| TsaError::MissingChannel("VSetpoint".to_string()))?;
        let ambient = classification
            .select_ambient(&dataset, config.ambient_channel.as_deref())?
            .ok_or_else(|| TsaError::MissingChannel("ambient thermocouple".to_string()))?;

        let requested = config
            .boards
            .iter()
            .map(|raw| BoardId::parse(raw))
            .collect::<AppResult<Vec<_>>>()?;
        let registry = BoardRegistry::build(&classification, limits.as_ref(), &requested)?;
        let voltages = dataset.distinct_values(&setpoint)?;
        let modes =
            ModeEnumerator::new(&dataset, &registry, limits.as_ref(), config.multimode).enumerate()?;

        if config.run_limit_analysis && limits.is_none() {
            warn!("Limit analysis requested without a limits specification; skipping limit checks");
        }
        info!(
            test = %config.test_name,
            rows = dataset.len(),
            boards = registry.len(),
            modes = modes.len(),
            ambient = %ambient,
            voltages = ?voltages,
            "Test run prepared"
        );

        Ok(Self {
            config,
            dataset,
            limits,
            registry,
            modes,
            voltages,
            ambient,
            setpoint,
            cache: HashMap::new(),
        })
    }

    /// Like [`TestRun::new`], loading the limits file named in the configuration.
    pub fn from_config(config: RunConfig, dataset: Dataset) -> AppResult<Self> {
        let limits = config
            .limits_file
            .as_ref()
            .map(LimitsSpec::load)
            .transpose()?;
        Self::new(config, dataset, limits)
    }

    /// Run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Underlying dataset.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Resolved boards.
    pub fn boards(&self) -> &BoardRegistry {
        &self.registry
    }

    /// Modes in presentation order.
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    /// Index and mode with the given display name.
    pub fn mode_by_name(&self, name: &str) -> Option<(usize, &Mode)> {
        self.modes
            .iter()
            .enumerate()
            .find(|(_, m)| m.display_name == name)
    }

    /// Voltage setpoints present in the data, ascending.
    pub fn voltages(&self) -> &[f64] {
        &self.voltages
    }

    /// Ambient reference channel.
    pub fn ambient_channel(&self) -> &str {
        &self.ambient
    }

    /// True when limit checks run: requested and a limits specification is present.
    pub fn limit_analysis_enabled(&self) -> bool {
        self.config.run_limit_analysis && self.limits.is_some()
    }

    fn resolver(&self) -> Option<LimitResolver<'_>> {
        self.limits
            .as_ref()
            .filter(|_| self.config.run_limit_analysis)
            .map(LimitResolver::new)
    }

    fn mode_at(&self, index: usize) -> AppResult<&Mode> {
        self.modes
            .get(index)
            .ok_or_else(|| TsaError::Configuration(format!("No mode at index {index}")))
    }

    fn binner(&self) -> AppResult<Binner<'_>> {
        Binner::new(&self.dataset, &self.ambient, &self.setpoint)
    }

    /// Rows of a mode within a temperature/voltage cell.
    pub fn cell(&self, mode: usize, temperature: i32, voltage: f64) -> AppResult<Cell> {
        let mode = self.mode_at(mode)?;
        Ok(self.binner()?.bin(
            &mode.rows,
            temperature,
            self.config.temperature_tolerance,
            voltage,
        ))
    }

    /// Values of a channel or aggregate over `rows`, aligned with the row set.
    pub fn channel_values(&self, mode: &Mode, channel: &str, rows: &RowSet) -> AppResult<Vec<f64>> {
        if let Some(aggregate) = mode.aggregate(channel) {
            return aggregate.values(&self.dataset, rows);
        }
        let column = self.dataset.require_column(channel)?;
        Ok(rows.iter().map(|row| column[row]).collect())
    }

    /// Statistics and verdicts of a cell, computed once and cached.
    pub fn cell_report(
        &mut self,
        mode: usize,
        temperature: i32,
        voltage: f64,
    ) -> AppResult<&CellReport> {
        let key = CellKey::new(mode, temperature, voltage);
        if !self.cache.contains_key(&key) {
            let report = self.compute_cell(mode, temperature, voltage)?;
            self.cache.insert(key, report);
        }
        Ok(&self.cache[&key])
    }

    /// Statistics of one channel of a cell; `None` if the mode has no such channel.
    pub fn stat(
        &mut self,
        mode: usize,
        temperature: i32,
        voltage: f64,
        channel: &str,
    ) -> AppResult<Option<StatValue>> {
        Ok(self
            .cell_report(mode, temperature, voltage)?
            .channel(channel)
            .map(|c| c.stats))
    }

    /// Reports for every mode, configured temperature and voltage, in that order.
    pub fn analyze(&mut self) -> AppResult<Vec<CellReport>> {
        let temperatures = self.config.temperatures.clone();
        let voltages = self.voltages.clone();
        let mut reports = Vec::new();
        for mode in 0..self.modes.len() {
            for &temperature in &temperatures {
                for &voltage in &voltages {
                    reports.push(self.cell_report(mode, temperature, voltage)?.clone());
                }
            }
        }
        Ok(reports)
    }

    fn compute_cell(&self, index: usize, temperature: i32, voltage: f64) -> AppResult<CellReport> {
        let mode = self.mode_at(index)?;
        let cell = self.cell(index, temperature, voltage)?;
        let rows = cell.rows().cloned().unwrap_or_default();
        let resolver = self.resolver();

        let mut currents = Vec::new();
        for channel in mode.analysed_channels() {
            let values = self.channel_values(mode, channel, &rows)?;
            let band = match (&resolver, cell.is_empty()) {
                (Some(resolver), false) => {
                    Some(resolver.current_band(mode, channel, temperature, voltage)?)
                }
                _ => None,
            };
            let mut report = ChannelReport::evaluate(channel, &values, band);
            if let (Some(aggregate), false) = (mode.aggregate(channel), cell.is_empty()) {
                report.contributions = aggregate.contributions(&self.dataset, &rows)?;
            }
            currents.push(report);
        }

        let sense_band = voltage_sense_band(voltage, self.config.voltage_tolerance);
        let voltage_senses = mode
            .voltage_sense_channels
            .iter()
            .map(|channel| {
                let values = self.channel_values(mode, channel, &rows)?;
                Ok(ChannelReport::evaluate(channel, &values, Some(sense_band)))
            })
            .collect::<AppResult<Vec<_>>>()?;

        debug!(
            mode = %mode.display_name,
            temperature,
            voltage,
            rows = rows.len(),
            "Computed cell statistics"
        );
        Ok(CellReport {
            mode: mode.display_name.clone(),
            temperature,
            voltage,
            rows: rows.len(),
            currents,
            voltage_senses,
        })
    }

    /// Outage board statistics in one state, or `None` when the run has no outage board.
    pub fn outage_report(
        &self,
        state: OutageState,
        temperature: i32,
        voltage: f64,
    ) -> AppResult<Option<OutageReport>> {
        let Some(board) = self.registry.outage() else {
            return Ok(None);
        };
        let rows = self.outage_rows(board, state)?;
        let cell = self
            .binner()?
            .bin(&rows, temperature, self.config.temperature_tolerance, voltage);
        let rows = cell.rows().cloned().unwrap_or_default();
        let resolver = self.resolver();

        let channels = board
            .current_channels
            .iter()
            .map(|channel| {
                let column = self.dataset.require_column(channel)?;
                let values: Vec<f64> = rows.iter().map(|row| column[row]).collect();
                let band = match (&resolver, cell.is_empty()) {
                    (Some(resolver), false) => Some(resolver.outage_band(board, state, voltage)?),
                    _ => None,
                };
                Ok(ChannelReport::evaluate(channel, &values, band))
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(OutageReport {
            board: board.name.clone(),
            state,
            temperature,
            voltage,
            rows: rows.len(),
            channels,
        }))
    }

    fn outage_rows(&self, board: &Board, state: OutageState) -> AppResult<RowSet> {
        let on_off = self.dataset.require_column(&board.on_off_channel)?;
        let wanted = state.on_off_value();
        Ok(self.dataset.all_rows().filter(|row| on_off[row] == wanted))
    }

    /// Rows of a cell where a voltage sense or a current left its band. Currents are
    /// only checked when limit analysis is enabled.
    pub fn out_of_spec_rows(
        &self,
        index: usize,
        temperature: i32,
        voltage: f64,
    ) -> AppResult<OutOfSpecRows> {
        let mode = self.mode_at(index)?;
        let Cell::Rows(rows) = self.cell(index, temperature, voltage)? else {
            return Ok(OutOfSpecRows::default());
        };

        let sense_band = voltage_sense_band(voltage, self.config.voltage_tolerance);
        let mut vin = Vec::new();
        for channel in &mode.voltage_sense_channels {
            let values = self.channel_values(mode, channel, &rows)?;
            vin.extend(offending(&rows, &values, &sense_band));
        }

        let mut iin = Vec::new();
        if let Some(resolver) = self.resolver() {
            for channel in mode.analysed_channels() {
                let band = resolver.current_band(mode, channel, temperature, voltage)?;
                let values = self.channel_values(mode, channel, &rows)?;
                iin.extend(offending(&rows, &values, &band));
            }
        }

        Ok(OutOfSpecRows {
            vin: RowSet::from_indices(vin),
            iin: RowSet::from_indices(iin),
        })
    }

    /// Write every offending row of every cell to `writer`, one section per cell and
    /// analysis. Returns the number of sections written; stops early once the writer
    /// is finished.
    pub fn dump_out_of_spec(&self, writer: &mut RotatingWriter) -> AppResult<usize> {
        let mut written = 0;
        for (index, mode) in self.modes.iter().enumerate() {
            for &temperature in &self.config.temperatures {
                for &voltage in &self.voltages {
                    let offending = self.out_of_spec_rows(index, temperature, voltage)?;
                    for (rows, analysis) in [(&offending.vin, VIN_ANALYSIS), (&offending.iin, IIN_ANALYSIS)] {
                        if rows.is_empty() {
                            continue;
                        }
                        let header = format!(
                            "\n\n\n\n\n{temperature}°C\t{}\t{}V\t{analysis}\n",
                            mode.display_name,
                            format_volts(voltage)
                        );
                        let records = self.dump_records(mode, rows)?;
                        if writer.write(&header, records)? == WriteStatus::Dropped {
                            warn!(
                                sections = written,
                                "Out-of-spec writer finished; remaining rows not written"
                            );
                            return Ok(written);
                        }
                        written += 1;
                    }
                }
            }
        }
        info!(sections = written, "Out-of-spec rows written");
        Ok(written)
    }

    fn dump_records(&self, mode: &Mode, rows: &RowSet) -> AppResult<Vec<Vec<String>>> {
        let mut names = vec![self.setpoint.as_str(), self.ambient.as_str()];
        names.extend(mode.voltage_sense_channels.iter().map(String::as_str));
        names.extend(mode.analysed_channels());

        let columns = names
            .iter()
            .map(|name| self.channel_values(mode, name, rows))
            .collect::<AppResult<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len() + 1);
        records.push(
            std::iter::once("Timestamp".to_string())
                .chain(names.iter().map(|n| n.to_string()))
                .collect(),
        );
        for (i, row) in rows.iter().enumerate() {
            let timestamp = self
                .dataset
                .timestamp(row)
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default();
            let mut record = Vec::with_capacity(columns.len() + 1);
            record.push(timestamp);
            record.extend(columns.iter().map(|c| format_value(c[i])));
            records.push(record);
        }
        Ok(records)
    }
}

fn offending<'a>(
    rows: &'a RowSet,
    values: &'a [f64],
    band: &'a LimitBand,
) -> impl Iterator<Item = usize> + 'a {
    rows.iter()
        .zip(values)
        .filter(move |(_, v)| !v.is_nan() && !band.contains(**v))
        .map(|(row, _)| row)
}

fn format_volts(voltage: f64) -> String {
    if voltage.fract() == 0.0 {
        format!("{voltage:.1}")
    } else {
        voltage.to_string()
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dataset(columns: Vec<(&str, Vec<f64>)>) -> Dataset {
        let start = NaiveDate::from_ymd_opt(2019, 3, 4)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .unwrap();
        let len = columns[0].1.len();
        let index = (0..len)
            .map(|i| start + chrono::Duration::seconds(i as i64))
            .collect();
        columns
            .into_iter()
            .fold(Dataset::new(index), |ds, (name, values)| {
                ds.with_column(name, values).unwrap()
            })
    }

    fn drl_run(run_limit_analysis: bool) -> TestRun {
        let ds = dataset(vec![
            ("VSetpoint", vec![9.0, 9.0, 9.0, 13.5]),
            ("Temp TC1", vec![22.0, 23.0, 24.0, 23.0]),
            ("B4 TP1: System 5", vec![1.2, 1.4, 1.9, 1.3]),
            ("B4 Vsense 1", vec![9.0, 9.1, 9.8, 13.4]),
            ("B4 ON/OFF", vec![1.0, 1.0, 1.0, 1.0]),
        ]);
        let mut limits = LimitsSpec::new().with_board(BoardId::new(4), "DRL");
        limits.insert_limit("DRL", 23, 9.0, LimitBand::new(1.0, 1.5));
        limits.insert_limit("DRL", 23, 13.5, LimitBand::new(1.0, 1.5));
        let config = RunConfig {
            run_limit_analysis,
            ..RunConfig::default()
        };
        TestRun::new(config, ds, Some(limits)).unwrap()
    }

    #[test]
    fn cell_report_checks_currents_and_senses() {
        let mut run = drl_run(true);
        let report = run.cell_report(0, 23, 9.0).unwrap().clone();
        assert_eq!(report.rows, 3);

        let current = report.channel("B4 TP1: System 5").unwrap();
        assert_eq!(current.out_of_spec, Some(true));
        assert_eq!(current.count.map(|c| c.out_of_spec), Some(1));

        let sense = report.channel("B4 Vsense 1").unwrap();
        assert_eq!(sense.limits, Some(LimitBand::around(9.0, 0.5)));
        assert_eq!(sense.out_of_spec, Some(true));
        assert!(report.is_out_of_spec());
    }

    #[test]
    fn cell_reports_are_cached() {
        let mut run = drl_run(true);
        let first = run.cell_report(0, 23, 9.0).unwrap().clone();
        let again = run.cell_report(0, 23, 9.0).unwrap().clone();
        assert_eq!(first, again);
        assert_eq!(run.cache.len(), 1);
    }

    #[test]
    fn close_setpoints_get_their_own_cells() {
        let ds = dataset(vec![
            ("VSetpoint", vec![9.0, 9.0, 9.04, 9.04]),
            ("Temp TC1", vec![23.0; 4]),
            ("B4 TP1: System 5", vec![1.0, 1.0, 5.0, 5.0]),
            ("B4 ON/OFF", vec![1.0; 4]),
        ]);
        let mut run = TestRun::new(RunConfig::default(), ds, None).unwrap();
        assert_eq!(run.voltages(), &[9.0, 9.04]);

        let reports = run.analyze().unwrap();
        let at_23: Vec<_> = reports.iter().filter(|r| r.temperature == 23).collect();
        assert_eq!(at_23.len(), 2);
        assert_eq!(at_23[0].voltage, 9.0);
        assert_eq!(at_23[1].voltage, 9.04);
        assert_eq!(at_23[0].currents[0].stats.stats().map(|s| s.max), Some(1.0));
        assert_eq!(at_23[1].currents[0].stats.stats().map(|s| s.max), Some(5.0));
        assert_eq!(run.cache.len(), reports.len());
    }

    #[test]
    fn empty_cell_is_not_available_without_lookup() {
        let mut run = drl_run(true);
        // no limits exist at 85C, but an empty cell never asks for them
        let report = run.cell_report(0, 85, 9.0).unwrap();
        assert!(report.is_not_available());
        assert!(report.currents[0].stats.is_not_available());
        assert_eq!(report.currents[0].out_of_spec, None);
    }

    #[test]
    fn limits_are_skipped_unless_requested() {
        let mut run = drl_run(false);
        assert!(!run.limit_analysis_enabled());
        let report = run.cell_report(0, 23, 9.0).unwrap();
        assert_eq!(report.currents[0].limits, None);
        assert_eq!(report.currents[0].out_of_spec, None);
    }

    #[test]
    fn out_of_spec_rows_split_vin_and_iin() {
        let run = drl_run(true);
        let rows = run.out_of_spec_rows(0, 23, 9.0).unwrap();
        assert_eq!(rows.vin.as_slice(), &[2]);
        assert_eq!(rows.iin.as_slice(), &[2]);
    }

    #[test]
    fn voltages_are_scanned_from_setpoint() {
        let run = drl_run(false);
        assert_eq!(run.voltages(), &[9.0, 13.5]);
        assert_eq!(run.ambient_channel(), "Temp TC1");
    }

    #[test]
    fn volts_format_like_station_logs() {
        assert_eq!(format_volts(9.0), "9.0");
        assert_eq!(format_volts(13.5), "13.5");
        assert_eq!(format_value(f64::NAN), "");
    }
}
