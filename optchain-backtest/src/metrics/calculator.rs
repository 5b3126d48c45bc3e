//! Performance metrics calculator.
//!
//! Pure functions over a finished ledger; nothing here mutates or caches, so
//! repeated calls on the same ledger give identical results.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::{Ledger, Outcome, Trade};

/// Periods per year used to annualise the per-trade Sharpe ratio.
pub const ANNUALIZATION_PERIODS: f64 = 252.0;

/// Summary statistics of a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    // Counts
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub holds: usize,
    /// Percentage of trades closed as WIN.
    pub win_rate: f64,

    // P&L
    pub total_pnl: Decimal,
    pub avg_pnl: Decimal,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub total_return_pct: f64,

    // Risk-adjusted
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline, as a non-positive percentage.
    pub max_drawdown_pct: f64,
    pub drawdown: DrawdownAnalysis,
}

impl PerformanceMetrics {
    /// Generate a summary report.
    pub fn summary(&self) -> String {
        format!(
            "Performance Summary\n\
             ====================\n\
             \n\
             Total Trades: {} (W: {}, L: {}, H: {})\n\
             Win Rate: {:.2}%\n\
             Total P&L: {:.2}\n\
             Avg Trade: {:.2}\n\
             \n\
             Initial Balance: {:.2}\n\
             Final Balance: {:.2}\n\
             Total Return: {:.2}%\n\
             \n\
             Sharpe Ratio: {:.2}\n\
             Max Drawdown: {:.2}%",
            self.total_trades,
            self.wins,
            self.losses,
            self.holds,
            self.win_rate,
            self.total_pnl,
            self.avg_pnl,
            self.initial_balance,
            self.final_balance,
            self.total_return_pct,
            self.sharpe_ratio,
            self.max_drawdown_pct,
        )
    }
}

/// Drawdown analysis details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAnalysis {
    pub max_drawdown_pct: f64,
    /// Trade index of the peak preceding the deepest drawdown.
    pub peak_index: Option<usize>,
    /// Trade index of the deepest point.
    pub trough_index: Option<usize>,
}

/// One bucket of the trade PnL distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate all metrics from a ledger.
    pub fn calculate(ledger: &Ledger) -> PerformanceMetrics {
        let trades = ledger.trades();
        let count = |o: Outcome| trades.iter().filter(|t| t.outcome == o).count();

        let total_trades = trades.len();
        let wins = count(Outcome::Win);
        let total_pnl: Decimal = trades.iter().map(|t| t.pnl).sum();

        let (win_rate, avg_pnl) = if total_trades == 0 {
            (0.0, Decimal::ZERO)
        } else {
            (
                wins as f64 / total_trades as f64 * 100.0,
                total_pnl / Decimal::from(total_trades),
            )
        };

        let initial_balance = ledger.initial_balance();
        let final_balance = trades
            .last()
            .map(|t| t.balance_after)
            .unwrap_or(initial_balance);

        let total_return_pct = if initial_balance.is_zero() {
            0.0
        } else {
            let ret: f64 = ((final_balance - initial_balance) / initial_balance)
                .try_into()
                .unwrap_or(0.0);
            ret * 100.0
        };

        let drawdown = Self::analyze_drawdown(&ledger.balances());

        PerformanceMetrics {
            total_trades,
            wins,
            losses: count(Outcome::Loss),
            holds: count(Outcome::Hold),
            win_rate,
            total_pnl,
            avg_pnl,
            initial_balance,
            final_balance,
            total_return_pct,
            sharpe_ratio: Self::sharpe_ratio(trades),
            max_drawdown_pct: drawdown.max_drawdown_pct,
            drawdown,
        }
    }

    /// Annualised Sharpe ratio of per-trade returns (`pnl / entry_price`).
    ///
    /// Zero when fewer than two finite returns exist or their sample standard
    /// deviation is zero.
    pub fn sharpe_ratio(trades: &[Trade]) -> f64 {
        use statrs::statistics::Statistics;

        let returns: Vec<f64> = trades.iter().filter_map(|t| t.return_on_entry()).collect();
        if returns.len() < 2 {
            return 0.0;
        }

        let mean = returns.iter().mean();
        let std_dev = returns.iter().std_dev();
        if !std_dev.is_finite() || std_dev == 0.0 {
            return 0.0;
        }

        mean / std_dev * ANNUALIZATION_PERIODS.sqrt()
    }

    /// Deepest decline of `balances` from its running maximum, in percent.
    pub fn analyze_drawdown(balances: &[Decimal]) -> DrawdownAnalysis {
        let mut analysis = DrawdownAnalysis::default();
        let Some(first) = balances.first() else {
            return analysis;
        };

        let mut peak: f64 = (*first).try_into().unwrap_or(0.0);
        let mut peak_index = 0;
        let mut worst = 0.0;

        for (idx, balance) in balances.iter().enumerate() {
            let value: f64 = (*balance).try_into().unwrap_or(0.0);
            if value > peak {
                peak = value;
                peak_index = idx;
            }
            if peak <= 0.0 {
                continue;
            }

            let dd = (value - peak) / peak;
            if dd < worst {
                worst = dd;
                analysis.peak_index = Some(peak_index);
                analysis.trough_index = Some(idx);
            }
        }

        analysis.max_drawdown_pct = worst * 100.0;
        analysis
    }

    /// Equal-width histogram of trade PnL.
    pub fn pnl_histogram(trades: &[Trade], bins: usize) -> Vec<HistogramBin> {
        let values: Vec<f64> = trades
            .iter()
            .filter_map(|t| f64::try_from(t.pnl).ok())
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() || bins == 0 {
            return Vec::new();
        }

        let mut lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let mut hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }
        let width = (hi - lo) / bins as f64;

        let mut histogram: Vec<HistogramBin> = (0..bins)
            .map(|i| HistogramBin {
                lower: lo + width * i as f64,
                upper: lo + width * (i + 1) as f64,
                count: 0,
            })
            .collect();

        for v in values {
            let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
            histogram[idx].count += 1;
        }

        histogram
    }
}
