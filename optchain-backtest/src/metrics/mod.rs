//! Performance metrics module.
//!
//! Provides:
//! - Win rate and trade outcome counts
//! - Sharpe ratio of per-trade returns
//! - Maximum drawdown of the post-trade balance
//! - PnL histogram buckets for plotting

pub mod calculator;

pub use calculator::{DrawdownAnalysis, HistogramBin, MetricsCalculator, PerformanceMetrics};
