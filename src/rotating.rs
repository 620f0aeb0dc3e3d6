//! Size-capped, auto-numbered sink for out-of-spec row dumps.
//!
//! Files are named `<test name> - out of spec_NN.txt` starting at `01`. After each write
//! the current file's size is checked; past `max_file_size` the next number is opened,
//! and once `max_files` files are full the writer is finished and drops further writes.
//! Callers observe this through [`WriteStatus`] and [`RotatingWriter::is_finished`].

use crate::config::RunConfig;
use crate::error::AppResult;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of one [`RotatingWriter::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// Header and rows were appended.
    Written,
    /// The writer is finished; nothing was written.
    Dropped,
}

/// Append-only, single-writer rotating file sink.
#[derive(Debug)]
pub struct RotatingWriter {
    directory: PathBuf,
    base_name: String,
    max_file_size: u64,
    max_files: u32,
    sequence: u32,
    file: Option<File>,
    finished: bool,
}

impl RotatingWriter {
    /// Create the output directory if needed and open file `01`.
    pub fn new(
        directory: impl AsRef<Path>,
        test_name: &str,
        max_file_size: u64,
        max_files: u32,
    ) -> AppResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.exists() {
            std::fs::create_dir_all(&directory)?;
        }
        let mut writer = Self {
            directory,
            base_name: format!("{test_name} - out of spec"),
            max_file_size,
            max_files,
            sequence: 0,
            file: None,
            finished: max_files == 0,
        };
        if !writer.finished {
            writer.open_next()?;
        }
        Ok(writer)
    }

    /// Writer configured from the run's output section.
    pub fn from_config(config: &RunConfig) -> AppResult<Self> {
        Self::new(
            &config.output.directory,
            &config.test_name,
            config.output.max_file_size,
            config.output.max_files,
        )
    }

    /// Path of file number `sequence`.
    pub fn path_for(&self, sequence: u32) -> PathBuf {
        self.directory
            .join(format!("{}_{:02}.txt", self.base_name, sequence))
    }

    /// Path of the file currently being written, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.file.as_ref().map(|_| self.path_for(self.sequence))
    }

    /// Number of the current (or last) file.
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// True once the file-count cap is reached.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Append `header` followed by tab-separated `rows`, flush, then rotate if the file
    /// grew past the size cap.
    pub fn write<I, R, T>(&mut self, header: &str, rows: I) -> AppResult<WriteStatus>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let Some(file) = self.file.as_mut() else {
            return Ok(WriteStatus::Dropped);
        };

        file.write_all(header.as_bytes())?;
        {
            let mut csv = csv::WriterBuilder::new()
                .delimiter(b'\t')
                .flexible(true)
                .terminator(csv::Terminator::Any(b'\n'))
                .from_writer(&mut *file);
            for row in rows {
                csv.write_record(row)?;
            }
            csv.flush()?;
        }
        file.flush()?;

        if file.metadata()?.len() > self.max_file_size {
            self.rotate()?;
        }
        Ok(WriteStatus::Written)
    }

    fn rotate(&mut self) -> AppResult<()> {
        self.file = None;
        if self.sequence >= self.max_files {
            self.finished = true;
            warn!(
                files = self.max_files,
                "Out-of-spec file limit reached; further rows are dropped"
            );
            return Ok(());
        }
        self.open_next()
    }

    fn open_next(&mut self) -> AppResult<()> {
        self.sequence += 1;
        let path = self.path_for(self.sequence);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Writing out-of-spec rows to '{}'", path.display());
        self.file = Some(file);
        Ok(())
    }
}
