//! CSV and JSON export of backtest results.
//!
//! Output files:
//! - `backtest_results.csv`: one row per trade
//! - `daily_summary.csv`: one row per trading day
//! - `backtest_metrics.json`: performance metrics

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::metrics::PerformanceMetrics;

use super::engine::BacktestResult;
use super::ledger::DailySummary;
use super::trade::Trade;

pub const TRADES_FILE: &str = "backtest_results.csv";
pub const DAILY_FILE: &str = "daily_summary.csv";
pub const METRICS_FILE: &str = "backtest_metrics.json";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Paths written by [`export_all`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub trades: PathBuf,
    pub daily: PathBuf,
    pub metrics: PathBuf,
}

fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

fn write_frame(path: &Path, df: &mut DataFrame) -> Result<(), ReportError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Build the trade table.
pub fn trades_frame(trades: &[Trade]) -> Result<DataFrame, ReportError> {
    let file: Vec<String> = trades.iter().map(|t| t.source_id.clone()).collect();
    let date: Vec<String> = trades.iter().map(|t| t.day.to_string()).collect();
    let side: Vec<&str> = trades.iter().map(|t| t.side.as_str()).collect();
    let entry: Vec<f64> = trades.iter().map(|t| to_f64(t.entry_price)).collect();
    let exit: Vec<f64> = trades.iter().map(|t| to_f64(t.exit_price)).collect();
    let outcome: Vec<&str> = trades.iter().map(|t| t.outcome.as_str()).collect();
    let pnl: Vec<f64> = trades.iter().map(|t| to_f64(t.pnl)).collect();
    let balance: Vec<f64> = trades.iter().map(|t| to_f64(t.balance_after)).collect();
    let stop_flag: Vec<&str> = trades.iter().map(|t| t.stop_flag_label()).collect();
    let strike: Vec<f64> = trades.iter().map(|t| to_f64(t.strike)).collect();
    let stop: Vec<f64> = trades.iter().map(|t| to_f64(t.stop_price)).collect();
    let target: Vec<f64> = trades.iter().map(|t| to_f64(t.target_price)).collect();

    let df = DataFrame::new(vec![
        Series::new("file".into(), file).into(),
        Series::new("date".into(), date).into(),
        Series::new("side".into(), side).into(),
        Series::new("entry".into(), entry).into(),
        Series::new("exit".into(), exit).into(),
        Series::new("outcome".into(), outcome).into(),
        Series::new("pnl".into(), pnl).into(),
        Series::new("balance".into(), balance).into(),
        Series::new("stop_flag".into(), stop_flag).into(),
        Series::new("strike".into(), strike).into(),
        Series::new("stop".into(), stop).into(),
        Series::new("target".into(), target).into(),
    ])?;
    Ok(df)
}

/// Build the daily table.
pub fn daily_frame(daily: &[DailySummary]) -> Result<DataFrame, ReportError> {
    let date: Vec<String> = daily.iter().map(|d| d.date.to_string()).collect();
    let trades: Vec<u32> = daily.iter().map(|d| d.trades as u32).collect();
    let wins: Vec<u32> = daily.iter().map(|d| d.wins as u32).collect();
    let losses: Vec<u32> = daily.iter().map(|d| d.losses as u32).collect();
    let holds: Vec<u32> = daily.iter().map(|d| d.holds as u32).collect();
    let day_pnl: Vec<f64> = daily.iter().map(|d| to_f64(d.day_pnl)).collect();
    let close_balance: Vec<f64> = daily.iter().map(|d| to_f64(d.close_balance)).collect();
    let stop_reason: Vec<String> = daily.iter().map(|d| d.stop_reason.to_string()).collect();

    let df = DataFrame::new(vec![
        Series::new("date".into(), date).into(),
        Series::new("trades".into(), trades).into(),
        Series::new("wins".into(), wins).into(),
        Series::new("losses".into(), losses).into(),
        Series::new("holds".into(), holds).into(),
        Series::new("day_pnl".into(), day_pnl).into(),
        Series::new("close_balance".into(), close_balance).into(),
        Series::new("stop_reason".into(), stop_reason).into(),
    ])?;
    Ok(df)
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<(), ReportError> {
    let mut df = trades_frame(trades)?;
    write_frame(path, &mut df)
}

pub fn write_daily_csv(path: &Path, daily: &[DailySummary]) -> Result<(), ReportError> {
    let mut df = daily_frame(daily)?;
    write_frame(path, &mut df)
}

pub fn write_metrics_json(path: &Path, metrics: &PerformanceMetrics) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(metrics)?;
    fs::write(path, json)?;
    Ok(())
}

/// Write all three reports into `out_dir`, creating it if needed.
pub fn export_all(result: &BacktestResult, out_dir: &Path) -> Result<ReportPaths, ReportError> {
    fs::create_dir_all(out_dir)?;
    let paths = ReportPaths {
        trades: out_dir.join(TRADES_FILE),
        daily: out_dir.join(DAILY_FILE),
        metrics: out_dir.join(METRICS_FILE),
    };

    write_trades_csv(&paths.trades, result.trades())?;
    write_daily_csv(&paths.daily, &result.daily)?;
    write_metrics_json(&paths.metrics, &result.metrics())?;

    info!("Exported results to {}", out_dir.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::trade::fixtures::trade;
    use crate::backtest::{BacktestConfig, BacktestEngine};
    use crate::data::{SnapshotSeries, RESERVED_FILE_NAMES};
    use crate::risk::{DailyLimitsConfig, StopFlag};
    use crate::backtest::Ledger;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    #[test]
    fn test_report_names_are_reserved_for_loader() {
        assert!(RESERVED_FILE_NAMES.contains(&TRADES_FILE));
        assert!(RESERVED_FILE_NAMES.contains(&DAILY_FILE));
    }

    #[test]
    fn test_trades_frame_columns() {
        let mut t = trade(0, day(1), dec!(-2_000), dec!(998_000));
        t.stop_flag = Some(StopFlag::DailyLossLimit);
        let df = trades_frame(&[t]).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "file", "date", "side", "entry", "exit", "outcome", "pnl", "balance",
                "stop_flag", "strike", "stop", "target"
            ]
        );
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("outcome").unwrap().str().unwrap().get(0), Some("LOSS"));
        assert_eq!(
            df.column("stop_flag").unwrap().str().unwrap().get(0),
            Some("Daily Loss Limit")
        );
        assert_eq!(df.column("pnl").unwrap().f64().unwrap().get(0), Some(-2000.0));
    }

    #[test]
    fn test_daily_csv_written() {
        let mut ledger = Ledger::new(dec!(1_000_000));
        ledger.record(trade(0, day(1), dec!(4_000), dec!(1_004_000)));
        let daily = ledger.daily_summaries(&DailyLimitsConfig::default());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DAILY_FILE);
        write_daily_csv(&path, &daily).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("date,trades,wins,losses,holds,day_pnl,close_balance,stop_reason")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("2025-09-01,1,1,0,0,"));
        assert!(row.ends_with(",ACTIVE"));
    }

    #[test]
    fn test_export_all_with_no_trades() {
        let result = BacktestEngine::new(BacktestConfig::default())
            .run_with_data(&SnapshotSeries::default());

        let dir = tempfile::tempdir().unwrap();
        let paths = export_all(&result, dir.path()).unwrap();

        assert!(paths.trades.exists());
        assert!(paths.daily.exists());
        let json = fs::read_to_string(&paths.metrics).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["total_trades"], 0);
        assert_eq!(value["sharpe_ratio"], 0.0);
    }
}
