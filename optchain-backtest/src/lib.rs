pub mod backtest;
pub mod data;
pub mod metrics;
pub mod risk;
pub mod screener;
pub mod sweep;

// Re-export commonly used types
pub use backtest::{BacktestConfig, BacktestEngine, BacktestResult, DailySummary, Ledger, Outcome, Trade};
pub use data::{OptionSide, SideSelection, Snapshot, SnapshotSeries, SnapshotStore, StrikeRow};
pub use metrics::{MetricsCalculator, PerformanceMetrics};
pub use risk::{DailyCircuitBreaker, DailyLimitsConfig, StopFlag, TradeLevels};
pub use screener::{Candidate, ChainSelector};
pub use sweep::{ParameterGrid, SweepRunner};
