//! Snapshot loader for per-timestamp option-chain CSV files.
//!
//! A snapshot directory holds one CSV per capture, named
//! `SYMBOL_YYYYMMDD_HHMMSS.csv`, with at least these columns:
//! - Strike, CE_LTP, PE_LTP, CE_OI, PE_OI
//!
//! Files are ordered by the timestamp parsed from the name, not by the raw
//! string, so the series index is the simulation's notion of time.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{Snapshot, SnapshotSeries, StrikeRow};

/// Columns every snapshot file must carry.
pub const REQUIRED_COLUMNS: &[&str] = &["Strike", "CE_LTP", "PE_LTP", "CE_OI", "PE_OI"];

/// Output files written next to the snapshots; never loaded as input.
pub const RESERVED_FILE_NAMES: &[&str] = &["backtest_results.csv", "daily_summary.csv"];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("No snapshot files found in {0}")]
    NotFound(String),

    #[error("Cannot parse capture date from file name '{0}'")]
    InvalidFilename(String),

    #[error("Missing required column '{column}' in {file}")]
    MissingColumn { file: String, column: String },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A snapshot file located on disk, before its contents are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub path: PathBuf,
    pub file_name: String,
    pub symbol: String,
    pub captured_at: NaiveDateTime,
}

/// Parse `SYMBOL_YYYYMMDD[_HHMMSS].csv` into symbol and capture time.
///
/// The date is the first eight characters of the second `_` token. The time
/// token is optional and defaults to midnight.
pub fn parse_snapshot_filename(file_name: &str) -> Result<(String, NaiveDateTime), LoaderError> {
    let invalid = || LoaderError::InvalidFilename(file_name.to_string());

    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;

    let mut tokens = stem.split('_');
    let symbol = tokens.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    let date = tokens
        .next()
        .and_then(|t| t.get(..8))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
        .ok_or_else(invalid)?;

    let time = match tokens.next() {
        Some(token) => token
            .get(..6)
            .and_then(|s| NaiveTime::parse_from_str(s, "%H%M%S").ok())
            .ok_or_else(invalid)?,
        None => NaiveTime::default(),
    };

    Ok((symbol.to_string(), date.and_time(time)))
}

/// Loader for a directory of chain snapshots.
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// List snapshot files sorted by capture time (ties by file name).
    pub fn list_files(&self) -> Result<Vec<SnapshotFile>, LoaderError> {
        let not_found = || LoaderError::NotFound(self.data_dir.display().to_string());

        if !self.data_dir.is_dir() {
            return Err(not_found());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            if !is_snapshot_candidate(&file_name) {
                continue;
            }

            let (symbol, captured_at) = parse_snapshot_filename(&file_name)?;
            files.push(SnapshotFile {
                path: entry.path(),
                file_name,
                symbol,
                captured_at,
            });
        }

        if files.is_empty() {
            return Err(not_found());
        }

        files.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(files)
    }

    /// Read one snapshot file into strike rows.
    pub fn load_snapshot(&self, file: &SnapshotFile) -> Result<Snapshot, LoaderError> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .try_into_reader_with_file_path(Some(file.path.clone()))?
            .finish()?;

        let rows = dataframe_to_rows(&df, &file.file_name)?;
        Ok(Snapshot::new(
            file.file_name.clone(),
            file.symbol.clone(),
            file.captured_at,
            rows,
        ))
    }

    /// Load the full ordered series.
    ///
    /// A file that cannot be read stays in the series as an empty snapshot so
    /// that later indices keep their place in time.
    pub fn load_series(&self) -> Result<SnapshotSeries, LoaderError> {
        let files = self.list_files()?;
        info!(
            "Loading {} snapshot files from {}",
            files.len(),
            self.data_dir.display()
        );

        let mut snapshots = Vec::with_capacity(files.len());
        let mut unreadable = 0usize;

        for file in &files {
            match self.load_snapshot(file) {
                Ok(snapshot) => {
                    if !snapshot.is_usable() {
                        debug!("{} has no usable rows", file.file_name);
                    }
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    warn!("Skipping unreadable snapshot {}: {}", file.file_name, e);
                    unreadable += 1;
                    snapshots.push(Snapshot::new(
                        file.file_name.clone(),
                        file.symbol.clone(),
                        file.captured_at,
                        Vec::new(),
                    ));
                }
            }
        }

        let series = SnapshotSeries::new(snapshots);
        info!(
            "Loaded {} snapshots over {} trading days ({} unreadable)",
            series.len(),
            series.trading_days().len(),
            unreadable
        );
        Ok(series)
    }
}

/// List the snapshot files of `dir` in time order.
pub fn list_snapshot_files(dir: impl AsRef<Path>) -> Result<Vec<SnapshotFile>, LoaderError> {
    SnapshotStore::new(dir.as_ref()).list_files()
}

/// Load every snapshot of `dir` as an ordered series.
pub fn load_series(dir: impl AsRef<Path>) -> Result<SnapshotSeries, LoaderError> {
    SnapshotStore::new(dir.as_ref()).load_series()
}

fn is_snapshot_candidate(file_name: &str) -> bool {
    let is_csv = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    is_csv && !RESERVED_FILE_NAMES.contains(&file_name)
}

/// Read a numeric column as optional floats. Unparseable cells become None.
fn float_column(df: &DataFrame, file: &str, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    let column = df
        .column(name)
        .map_err(|_| LoaderError::MissingColumn {
            file: file.to_string(),
            column: name.to_string(),
        })?
        .cast(&DataType::Float64)?;

    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::try_from(v).ok())
}

/// Convert a snapshot DataFrame into strike rows, keeping file order.
///
/// Rows without a strike are dropped; missing open interest counts as zero.
fn dataframe_to_rows(df: &DataFrame, file: &str) -> Result<Vec<StrikeRow>, LoaderError> {
    let strikes = float_column(df, file, "Strike")?;
    let ce_ltp = float_column(df, file, "CE_LTP")?;
    let pe_ltp = float_column(df, file, "PE_LTP")?;
    let ce_oi = float_column(df, file, "CE_OI")?;
    let pe_oi = float_column(df, file, "PE_OI")?;

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let Some(strike) = to_decimal(strikes[idx]) else {
            continue;
        };

        rows.push(StrikeRow {
            strike,
            ce_last_price: to_decimal(ce_ltp[idx]),
            pe_last_price: to_decimal(pe_ltp[idx]),
            ce_open_interest: ce_oi[idx].map(|v| v as i64).unwrap_or(0),
            pe_open_interest: pe_oi[idx].map(|v| v as i64).unwrap_or(0),
        });
    }

    Ok(rows)
}
