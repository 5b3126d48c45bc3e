//! Backtesting of option-chain snapshot series.
//!
//! This module provides the simulation pass and its records:
//! - Configuration (TOML, validated)
//! - Exit resolution over a bounded look-ahead window
//! - Append-only trade ledger and daily aggregation
//! - CSV/JSON report export

pub mod config;
pub mod engine;
pub mod ledger;
pub mod report;
pub mod resolver;
pub mod trade;

pub use config::{BacktestConfig, ConfigError};
pub use engine::{BacktestEngine, BacktestError, BacktestResult, EquityPoint, RunStats};
pub use ledger::{DailySummary, Ledger};
pub use report::{export_all, ReportError, ReportPaths};
pub use resolver::{Resolution, TradeResolver};
pub use trade::{Outcome, Trade};
