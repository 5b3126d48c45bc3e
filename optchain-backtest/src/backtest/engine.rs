//! Core backtesting engine.
//!
//! One sequential pass over the ordered snapshot series. For each snapshot
//! except the last:
//! 1. Roll the daily risk state when the trading day changes
//! 2. Gate the entry (stopped day, trade cap, daily limits)
//! 3. Select the reference strike and side
//! 4. Size the trade (stop, target, position size)
//! 5. Resolve the exit over the look-ahead window
//! 6. Apply PnL, evaluate daily limits, append to the ledger

use std::path::Path;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::data::{load_series, LoaderError, SnapshotSeries};
use crate::metrics::{MetricsCalculator, PerformanceMetrics};
use crate::risk::{
    DailyCircuitBreaker, EntryDecision, RejectReason, SizingConfig, StopFlag, TradeLevels,
};
use crate::screener::ChainSelector;

use super::config::{BacktestConfig, ConfigError};
use super::ledger::{DailySummary, Ledger};
use super::resolver::TradeResolver;
use super::trade::Trade;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Post-trade balance point for equity plots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub trade_index: usize,
    pub source_id: String,
    pub date: NaiveDate,
    pub balance: Decimal,
    pub stop_flag: Option<StopFlag>,
}

/// Counters describing what happened to each snapshot of a pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub snapshots: usize,
    pub rejected_stopped: usize,
    pub rejected_trade_cap: usize,
    pub rejected_limit_breach: usize,
    pub skipped_no_candidate: usize,
    pub unresolved: usize,
    pub trades: usize,
}

impl RunStats {
    fn count_rejection(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::Stopped(_) => self.rejected_stopped += 1,
            RejectReason::TradeCap(_) => self.rejected_trade_cap += 1,
            RejectReason::Breached(_) => self.rejected_limit_breach += 1,
        }
    }
}

/// Mutable state of one pass: running balance, trades and the day's risk state.
struct SimulationState {
    ledger: Ledger,
    risk: DailyCircuitBreaker,
    stats: RunStats,
}

impl SimulationState {
    fn new(config: &BacktestConfig) -> Self {
        Self {
            ledger: Ledger::new(config.initial_balance),
            risk: DailyCircuitBreaker::new(config.daily_limits.clone(), config.max_trades_per_day),
            stats: RunStats::default(),
        }
    }
}

/// Result of a completed backtest.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    /// Configuration used.
    pub config: BacktestConfig,

    /// Symbol of the first snapshot (empty for an empty series).
    pub symbol: String,

    /// All recorded trades and the final balance.
    pub ledger: Ledger,

    /// Per-day aggregates.
    pub daily: Vec<DailySummary>,

    /// Days stopped by a daily limit, in order.
    pub halts: Vec<(NaiveDate, StopFlag)>,

    pub stats: RunStats,
}

impl BacktestResult {
    pub fn trades(&self) -> &[Trade] {
        self.ledger.trades()
    }

    pub fn final_balance(&self) -> Decimal {
        self.ledger.balance()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        MetricsCalculator::calculate(&self.ledger)
    }

    /// Balance after every trade.
    pub fn equity_curve(&self) -> Vec<EquityPoint> {
        self.trades()
            .iter()
            .enumerate()
            .map(|(idx, t)| EquityPoint {
                trade_index: idx,
                source_id: t.source_id.clone(),
                date: t.day,
                balance: t.balance_after,
                stop_flag: t.stop_flag,
            })
            .collect()
    }

    /// Equity points where a daily limit fired.
    pub fn stop_markers(&self) -> Vec<EquityPoint> {
        self.equity_curve()
            .into_iter()
            .filter(|p| p.stop_flag.is_some())
            .collect()
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let m = self.metrics();
        let period = match (self.daily.first(), self.daily.last()) {
            (Some(first), Some(last)) => format!("{} to {}", first.date, last.date),
            _ => "no trades".to_string(),
        };
        format!(
            "Backtest Results {} ({})\n\
             ----------------------------------------\n\
             Total Trades: {} (W: {}, L: {}, H: {})\n\
             Win Rate: {:.2}%\n\
             Sharpe Ratio: {:.2}\n\
             Max Drawdown: {:.2}%\n\
             Final Balance: {:.2}\n\
             Stopped Days: {}\n\
             \n\
             Snapshots: {} | rejected: {} stopped, {} cap, {} limit | skipped: {} | unresolved: {}",
            self.symbol,
            period,
            m.total_trades,
            m.wins,
            m.losses,
            m.holds,
            m.win_rate,
            m.sharpe_ratio,
            m.max_drawdown_pct,
            m.final_balance,
            self.halts.len(),
            self.stats.snapshots,
            self.stats.rejected_stopped,
            self.stats.rejected_trade_cap,
            self.stats.rejected_limit_breach,
            self.stats.skipped_no_candidate,
            self.stats.unresolved,
        )
    }
}

/// The main backtesting engine.
pub struct BacktestEngine {
    config: BacktestConfig,
    sizing: SizingConfig,
    selector: ChainSelector,
    resolver: TradeResolver,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        let sizing = config.sizing();
        let resolver = TradeResolver::new(config.effective_window());
        Self {
            config,
            sizing,
            selector: ChainSelector::new(),
            resolver,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Load the snapshot directory and run a pass over it.
    pub fn run(&self, data_dir: impl AsRef<Path>) -> Result<BacktestResult, BacktestError> {
        self.config.validate()?;
        let series = load_series(data_dir)?;
        Ok(self.run_with_data(&series))
    }

    /// Run with pre-loaded data (for sweeps - avoids re-reading files).
    pub fn run_with_data(&self, series: &SnapshotSeries) -> BacktestResult {
        info!(
            "Starting backtest over {} snapshots ({})",
            series.len(),
            self.config.describe()
        );

        let mut state = SimulationState::new(&self.config);
        state.stats.snapshots = series.len();

        // The last snapshot has nothing after it to resolve against.
        for index in 0..series.len().saturating_sub(1) {
            self.process_snapshot(series, index, &mut state);
        }

        let SimulationState {
            ledger,
            risk,
            mut stats,
        } = state;
        stats.trades = ledger.len();

        let result = BacktestResult {
            symbol: series.get(0).map(|s| s.symbol.clone()).unwrap_or_default(),
            daily: ledger.daily_summaries(&self.config.daily_limits),
            halts: risk.halt_history().to_vec(),
            config: self.config.clone(),
            ledger,
            stats,
        };

        info!(
            "Backtest complete: {} trades, final balance {}",
            result.stats.trades,
            result.final_balance()
        );
        result
    }

    fn process_snapshot(&self, series: &SnapshotSeries, index: usize, state: &mut SimulationState) {
        let Some(snapshot) = series.get(index) else {
            return;
        };
        let balance = state.ledger.balance();

        state.risk.roll_day(snapshot.trading_day(), balance);

        if let EntryDecision::Rejected(reason) = state.risk.check_entry(balance) {
            debug!("{}: entry rejected ({:?})", snapshot.source_id, reason);
            state.stats.count_rejection(reason);
            return;
        }

        let candidate = match self.selector.select_candidate(snapshot, self.config.side) {
            Ok(candidate) => candidate,
            Err(e) => {
                debug!("{}: no candidate ({})", snapshot.source_id, e);
                state.stats.skipped_no_candidate += 1;
                return;
            }
        };

        let Some(levels) = TradeLevels::compute(candidate.entry_price, balance, &self.sizing) else {
            debug!("{}: cannot size entry at {}", snapshot.source_id, candidate.entry_price);
            state.stats.skipped_no_candidate += 1;
            return;
        };

        let Some(resolution) = self.resolver.resolve(series, index, candidate.side, &levels) else {
            warn!(
                "{}: no usable {} price in the next {} snapshots, entry discarded",
                snapshot.source_id,
                candidate.side,
                self.resolver.window()
            );
            state.stats.unresolved += 1;
            return;
        };

        let pnl = levels.pnl(resolution.exit_price);
        let balance_after = balance + pnl;
        let stop_flag = state.risk.record_trade(balance_after);

        debug!(
            "{}: {} {} @ {} -> {} {} pnl={} balance={}",
            snapshot.source_id,
            candidate.side,
            candidate.strike,
            candidate.entry_price,
            resolution.outcome,
            resolution.exit_price,
            pnl,
            balance_after
        );

        state.ledger.record(Trade {
            source_index: index,
            source_id: snapshot.source_id.clone(),
            day: snapshot.trading_day(),
            side: candidate.side,
            strike: candidate.strike,
            entry_price: candidate.entry_price,
            stop_price: levels.stop_price,
            target_price: levels.target_price,
            exit_index: resolution.exit_index,
            exit_price: resolution.exit_price,
            outcome: resolution.outcome,
            position_size: levels.position_size,
            pnl,
            balance_after,
            stop_flag,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::trade::Outcome;
    use crate::data::{OptionSide, SideSelection, Snapshot, StrikeRow};
    use crate::risk::DayStatus;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn snap(day: u32, minute: u32, ce_price: Decimal) -> Snapshot {
        let ts = NaiveDate::from_ymd_opt(2025, 9, day)
            .unwrap()
            .and_hms_opt(9, minute, 0)
            .unwrap();
        Snapshot::new(
            format!("NIFTY_202509{:02}_09{:02}00.csv", day, minute),
            "NIFTY",
            ts,
            vec![StrikeRow {
                strike: dec!(24000),
                ce_last_price: Some(ce_price),
                pe_last_price: Some(dec!(50)),
                ce_open_interest: 10,
                pe_open_interest: 5,
            }],
        )
    }

    fn config(sl: f64, max_trades: usize) -> BacktestConfig {
        BacktestConfig {
            stop_loss_fraction: sl,
            max_trades_per_day: max_trades,
            side: SideSelection::Ce,
            ..Default::default()
        }
    }

    fn assert_ledger_invariants(result: &BacktestResult) {
        let mut prev = result.config.initial_balance;
        let mut last_index = 0;
        for t in result.trades() {
            assert_eq!(t.balance_after, prev + t.pnl);
            assert!(t.source_index >= last_index);
            prev = t.balance_after;
            last_index = t.source_index;
        }
        assert_eq!(result.final_balance(), prev);
    }

    #[test]
    fn test_three_snapshot_scenario() {
        let series = SnapshotSeries::new(vec![
            snap(1, 15, dec!(100)),
            snap(1, 16, dec!(85)),
            snap(1, 17, dec!(130)),
        ]);
        let result = BacktestEngine::new(config(0.1, 3)).run_with_data(&series);

        let first = &result.trades()[0];
        assert_eq!(first.side, OptionSide::Call);
        assert_eq!(first.stop_price, dec!(90));
        assert_eq!(first.target_price, dec!(120));
        assert_eq!(first.outcome, Outcome::Loss);
        assert_eq!(first.exit_price, dec!(90));
        assert_eq!(first.exit_index, 1);
        assert_eq!(first.pnl, dec!(-2_000));
        assert_eq!(first.balance_after, dec!(998_000));

        // Second entry at 85 hits its target on the final snapshot.
        assert_eq!(result.trades().len(), 2);
        assert_eq!(result.trades()[1].outcome, Outcome::Win);
        assert_ledger_invariants(&result);
    }

    #[test]
    fn test_trade_cap_per_day() {
        let mut snapshots: Vec<_> = (0..6).map(|m| snap(1, 15 + m, dec!(100))).collect();
        snapshots.extend((0..4).map(|m| snap(2, 15 + m, dec!(100))));
        let series = SnapshotSeries::new(snapshots);

        let cfg = BacktestConfig {
            lookahead_window: Some(1),
            ..config(0.3, 2)
        };
        let result = BacktestEngine::new(cfg).run_with_data(&series);

        let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
        for t in result.trades() {
            *per_day.entry(t.day).or_default() += 1;
            assert_eq!(t.outcome, Outcome::Hold);
        }
        assert_eq!(per_day.len(), 2);
        assert!(per_day.values().all(|&n| n == 2));
        assert!(result.stats.rejected_trade_cap > 0);
        assert_ledger_invariants(&result);
    }

    #[test]
    fn test_no_entries_after_daily_stop() {
        let series = SnapshotSeries::new(vec![
            snap(1, 15, dec!(100)),
            snap(1, 16, dec!(40)),
            snap(1, 17, dec!(100)),
            snap(1, 18, dec!(100)),
            snap(2, 15, dec!(100)),
            snap(2, 16, dec!(100)),
        ]);
        let cfg = BacktestConfig {
            risk_fraction: 0.05,
            ..config(0.5, 3)
        };
        let result = BacktestEngine::new(cfg).run_with_data(&series);

        // risk 50k, size 500, stop 50 -> pnl -25k (-2.5%)
        let first = &result.trades()[0];
        assert_eq!(first.outcome, Outcome::Loss);
        assert_eq!(first.pnl, dec!(-25_000));
        assert_eq!(first.stop_flag, Some(StopFlag::DailyLossLimit));

        let day1 = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        assert_eq!(result.trades().iter().filter(|t| t.day == day1).count(), 1);
        assert!(result.trades().iter().any(|t| t.day != day1));

        assert_eq!(
            result.daily[0].stop_reason,
            DayStatus::Stopped(StopFlag::DailyLossLimit)
        );
        assert_eq!(result.halts, vec![(day1, StopFlag::DailyLossLimit)]);
        assert_eq!(result.stop_markers().len(), 1);
        assert_ledger_invariants(&result);
    }

    #[test]
    fn test_empty_and_single_snapshot_series() {
        let engine = BacktestEngine::new(BacktestConfig::default());

        let empty = engine.run_with_data(&SnapshotSeries::default());
        assert!(empty.trades().is_empty());
        assert_eq!(empty.final_balance(), dec!(1_000_000));

        let single = engine.run_with_data(&SnapshotSeries::new(vec![snap(1, 15, dec!(100))]));
        assert!(single.trades().is_empty());
        assert_eq!(single.metrics().sharpe_ratio, 0.0);
    }

    #[test]
    fn test_unusable_entry_snapshot_is_skipped() {
        let mut broken = snap(1, 16, dec!(100));
        broken.rows.clear();
        let series = SnapshotSeries::new(vec![
            snap(1, 15, dec!(0)),
            broken,
            snap(1, 17, dec!(100)),
            snap(1, 18, dec!(100)),
        ]);
        let result = BacktestEngine::new(config(0.3, 3)).run_with_data(&series);

        assert_eq!(result.stats.skipped_no_candidate, 2);
        assert_eq!(result.trades().len(), 1);
        assert_eq!(result.trades()[0].source_index, 2);
    }

    #[test]
    fn test_run_missing_directory() {
        let engine = BacktestEngine::new(BacktestConfig::default());
        let err = engine.run("/no/such/snapshot/dir").unwrap_err();
        assert!(matches!(err, BacktestError::Loader(LoaderError::NotFound(_))));
    }

    #[test]
    fn test_run_from_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        let header = "Strike,CE_LTP,PE_LTP,CE_OI,PE_OI";
        for (name, ce) in [
            ("NIFTY_20250901_091500.csv", "100"),
            ("NIFTY_20250901_091600.csv", "85"),
            ("NIFTY_20250901_091700.csv", "130"),
        ] {
            let body = format!("{header}\n24000,{ce},50,10,5\n");
            std::fs::write(dir.path().join(name), body).unwrap();
        }

        let result = BacktestEngine::new(config(0.1, 3)).run(dir.path()).unwrap();
        assert_eq!(result.symbol, "NIFTY");
        assert_eq!(result.trades()[0].outcome, Outcome::Loss);
        assert_eq!(result.trades()[0].exit_price, dec!(90));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let engine = BacktestEngine::new(config(0.0, 3));
        assert!(matches!(
            engine.run("/no/such/snapshot/dir"),
            Err(BacktestError::Config(_))
        ));
    }
}
