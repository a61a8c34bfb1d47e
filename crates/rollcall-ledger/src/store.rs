//! Per-day attendance files: `<dir>/attendance_<DD-MM-YYYY>.csv`.
//!
//! Re-running attendance on the same day appends to that day's file. A
//! person already recorded that day is not appended again, so the first
//! sighting's time is kept.

use crate::record::{records_for, AttendanceRecord, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

const FILE_PREFIX: &str = "attendance_";
const FILE_EXTENSION: &str = "csv";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("attendance file io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Outcome of recording one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedRun {
    /// Everyone accepted in the run, in first-seen order, stamped with the run time.
    pub records: Vec<AttendanceRecord>,
    /// The subset written to the day file; the rest were already recorded today.
    pub appended: Vec<AttendanceRecord>,
}

/// Directory of per-day attendance files.
#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `date`, whether or not it exists.
    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!(
            "{FILE_PREFIX}{}.{FILE_EXTENSION}",
            date.format(DATE_FORMAT)
        ))
    }

    /// Record one run's matched labels, all stamped `at`.
    ///
    /// Returns every record accepted in the run together with the ones
    /// appended to the day file. An empty run, or one where everybody was
    /// already recorded today, leaves the file system untouched.
    pub fn record<S: AsRef<str>>(&self, labels: &[S], at: NaiveDateTime) -> Result<RecordedRun, LedgerError> {
        let path = self.day_path(at.date());
        let existing = if path.exists() { read_day_file(&path)? } else { Vec::new() };

        let records = records_for(labels, at);
        let fresh: Vec<AttendanceRecord> = records
            .iter()
            .filter(|r| !existing.iter().any(|e| e.same_person(r)))
            .cloned()
            .collect();

        if fresh.is_empty() {
            tracing::info!(
                path = %path.display(),
                accepted = records.len(),
                "nothing new to record"
            );
            return Ok(RecordedRun { records, appended: fresh });
        }

        let io_err = |source| LedgerError::Io { path: path.clone(), source };
        std::fs::create_dir_all(&self.dir).map_err(io_err)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let write_header = file.metadata().map_err(io_err)?.len() == 0;

        let csv_err = |source| LedgerError::Csv { path: path.clone(), source };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        for record in &fresh {
            writer.serialize(record).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;

        tracing::info!(
            path = %path.display(),
            appended = fresh.len(),
            already_present = existing.len(),
            "attendance recorded"
        );
        Ok(RecordedRun { records, appended: fresh })
    }

    /// Rows of the file for `date`; empty if no run happened that day.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let path = self.day_path(date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_day_file(&path)
    }

    /// Days with an attendance file, oldest first. A missing directory has none.
    pub fn list_days(&self) -> Result<Vec<(NaiveDate, PathBuf)>, LedgerError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(LedgerError::Io { path: self.dir.clone(), source }),
        };

        let mut days: Vec<(NaiveDate, PathBuf)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let path = entry.path();
                parse_day_file_name(&path).map(|date| (date, path))
            })
            .collect();
        days.sort();
        Ok(days)
    }
}

/// Read an attendance file in row order.
pub fn read_day_file(path: &Path) -> Result<Vec<AttendanceRecord>, LedgerError> {
    let csv_err = |source| LedgerError::Csv { path: path.to_path_buf(), source };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    reader
        .deserialize()
        .collect::<Result<Vec<AttendanceRecord>, _>>()
        .map_err(csv_err)
}

/// Date encoded in an `attendance_<DD-MM-YYYY>.csv` file name.
pub fn parse_day_file_name(path: &Path) -> Option<NaiveDate> {
    if path.extension()?.to_str()? != FILE_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let date = stem.strip_prefix(FILE_PREFIX)?;
    NaiveDate::parse_from_str(date, DATE_FORMAT).ok()
}
