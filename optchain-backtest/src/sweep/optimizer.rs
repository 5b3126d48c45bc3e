//! Grid search over risk parameters.
//!
//! Each combination is a full, independent backtest over the same immutable
//! series. Runs execute in parallel with rayon; each run stays sequential.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backtest::{BacktestConfig, BacktestEngine};
use crate::data::SnapshotSeries;
use crate::metrics::PerformanceMetrics;

/// Parameter values to sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterGrid {
    /// Stop-loss fractions.
    pub stop_loss_fraction: Vec<f64>,
    /// Reward-to-risk ratios.
    pub reward_ratio: Vec<f64>,
    /// Risk fractions per trade.
    pub risk_fraction: Vec<f64>,
    /// Daily trade caps.
    pub max_trades_per_day: Vec<usize>,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            stop_loss_fraction: vec![0.2, 0.3, 0.4],
            reward_ratio: vec![1.5, 2.0, 3.0],
            risk_fraction: vec![0.01, 0.02],
            max_trades_per_day: vec![2, 3, 5],
        }
    }
}

impl ParameterGrid {
    /// Calculate total number of parameter combinations.
    pub fn total_combinations(&self) -> usize {
        self.stop_loss_fraction.len()
            * self.reward_ratio.len()
            * self.risk_fraction.len()
            * self.max_trades_per_day.len()
    }

    /// Generate all parameter combinations.
    pub fn combinations(&self) -> Vec<ParameterSet> {
        let mut combos = Vec::with_capacity(self.total_combinations());

        for &stop_loss_fraction in &self.stop_loss_fraction {
            for &reward_ratio in &self.reward_ratio {
                for &risk_fraction in &self.risk_fraction {
                    for &max_trades_per_day in &self.max_trades_per_day {
                        combos.push(ParameterSet {
                            stop_loss_fraction,
                            reward_ratio,
                            risk_fraction,
                            max_trades_per_day,
                        });
                    }
                }
            }
        }

        combos
    }
}

/// A single parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub stop_loss_fraction: f64,
    pub reward_ratio: f64,
    pub risk_fraction: f64,
    pub max_trades_per_day: usize,
}

impl ParameterSet {
    /// Apply this parameter set to a backtest config.
    pub fn apply_to_config(&self, config: &mut BacktestConfig) {
        config.stop_loss_fraction = self.stop_loss_fraction;
        config.reward_ratio = self.reward_ratio;
        config.risk_fraction = self.risk_fraction;
        config.max_trades_per_day = self.max_trades_per_day;
    }

    /// Create a unique key for this parameter set.
    pub fn key(&self) -> String {
        format!(
            "sl{:.2}_rr{:.2}_risk{:.3}_max{}",
            self.stop_loss_fraction, self.reward_ratio, self.risk_fraction, self.max_trades_per_day
        )
    }
}

/// Headline numbers of one sweep run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    pub total_trades: usize,
    pub win_rate: f64,
    pub total_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub final_balance: Decimal,
}

impl From<&PerformanceMetrics> for SweepSummary {
    fn from(m: &PerformanceMetrics) -> Self {
        Self {
            total_trades: m.total_trades,
            win_rate: m.win_rate,
            total_return_pct: m.total_return_pct,
            sharpe_ratio: m.sharpe_ratio,
            max_drawdown_pct: m.max_drawdown_pct,
            final_balance: m.final_balance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResult {
    pub params: ParameterSet,
    pub summary: SweepSummary,
}

impl SweepResult {
    pub fn line(&self) -> String {
        format!(
            "{:<32} trades={:<4} win={:>6.2}% sharpe={:>7.2} mdd={:>7.2}% final={:.2}",
            self.params.key(),
            self.summary.total_trades,
            self.summary.win_rate,
            self.summary.sharpe_ratio,
            self.summary.max_drawdown_pct,
            self.summary.final_balance
        )
    }
}

/// Parallel parameter sweep runner.
pub struct SweepRunner {
    base_config: BacktestConfig,
    param_grid: ParameterGrid,
}

impl SweepRunner {
    pub fn new(base_config: BacktestConfig) -> Self {
        Self {
            base_config,
            param_grid: ParameterGrid::default(),
        }
    }

    /// Set parameter grid.
    pub fn with_param_grid(mut self, grid: ParameterGrid) -> Self {
        self.param_grid = grid;
        self
    }

    /// Run every valid combination and rank by Sharpe, then final balance.
    pub fn run(&self, series: &SnapshotSeries) -> Vec<SweepResult> {
        let combos: Vec<_> = self
            .param_grid
            .combinations()
            .into_iter()
            .filter(|params| {
                let mut config = self.base_config.clone();
                params.apply_to_config(&mut config);
                match config.validate() {
                    Ok(()) => true,
                    Err(e) => {
                        debug!("Skipping {}: {}", params.key(), e);
                        false
                    }
                }
            })
            .collect();

        let total = combos.len();
        info!(
            "Sweeping {} parameter combinations over {} snapshots",
            total,
            series.len()
        );

        let progress = AtomicUsize::new(0);
        let mut results: Vec<SweepResult> = combos
            .par_iter()
            .map(|params| {
                let mut config = self.base_config.clone();
                params.apply_to_config(&mut config);

                let result = BacktestEngine::new(config).run_with_data(series);
                let metrics = result.metrics();

                let done = progress.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                if done % (total / 10).max(1) == 0 || done == total {
                    info!(
                        "  {:.0}% ({}/{} combinations)",
                        done as f64 / total as f64 * 100.0,
                        done,
                        total
                    );
                }

                SweepResult {
                    params: params.clone(),
                    summary: SweepSummary::from(&metrics),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.summary
                .sharpe_ratio
                .partial_cmp(&a.summary.sharpe_ratio)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.summary.final_balance.cmp(&a.summary.final_balance))
        });

        if let Some(best) = results.first() {
            info!(
                "Best parameters: {}, Sharpe = {:.2}",
                best.params.key(),
                best.summary.sharpe_ratio
            );
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SideSelection, Snapshot, StrikeRow};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series(prices: &[Decimal]) -> SnapshotSeries {
        let snapshots = prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let ts = NaiveDate::from_ymd_opt(2025, 9, 1 + (i / 4) as u32)
                    .unwrap()
                    .and_hms_opt(10, (i % 4) as u32, 0)
                    .unwrap();
                Snapshot::new(
                    format!("NIFTY_{:02}.csv", i),
                    "NIFTY",
                    ts,
                    vec![StrikeRow {
                        strike: dec!(24000),
                        ce_last_price: Some(*p),
                        pe_last_price: Some(*p),
                        ce_open_interest: 1,
                        pe_open_interest: 0,
                    }],
                )
            })
            .collect();
        SnapshotSeries::new(snapshots)
    }

    #[test]
    fn test_parameter_grid_combinations() {
        let grid = ParameterGrid {
            stop_loss_fraction: vec![0.2, 0.3],
            reward_ratio: vec![2.0],
            risk_fraction: vec![0.01, 0.02],
            max_trades_per_day: vec![3],
        };
        assert_eq!(grid.total_combinations(), 4);
        assert_eq!(grid.combinations().len(), 4);
    }

    #[test]
    fn test_parameter_set_key() {
        let params = ParameterSet {
            stop_loss_fraction: 0.3,
            reward_ratio: 2.0,
            risk_fraction: 0.02,
            max_trades_per_day: 3,
        };
        assert_eq!(params.key(), "sl0.30_rr2.00_risk0.020_max3");
    }

    #[test]
    fn test_parameter_set_apply() {
        let params = ParameterSet {
            stop_loss_fraction: 0.25,
            reward_ratio: 3.0,
            risk_fraction: 0.01,
            max_trades_per_day: 5,
        };

        let mut config = BacktestConfig::default();
        params.apply_to_config(&mut config);

        assert_eq!(config.stop_loss_fraction, 0.25);
        assert_eq!(config.reward_ratio, 3.0);
        assert_eq!(config.max_trades_per_day, 5);
        assert_eq!(config.effective_window(), 5);
    }

    #[test]
    fn test_sweep_matches_sequential_runs() {
        let data = series(&[
            dec!(100),
            dec!(120),
            dec!(90),
            dec!(150),
            dec!(100),
            dec!(60),
            dec!(110),
            dec!(100),
        ]);
        let base = BacktestConfig {
            side: SideSelection::Ce,
            ..Default::default()
        };
        let grid = ParameterGrid {
            stop_loss_fraction: vec![0.1, 0.3, 1.5],
            reward_ratio: vec![1.0, 2.0],
            risk_fraction: vec![0.02],
            max_trades_per_day: vec![2],
        };

        let results = SweepRunner::new(base.clone())
            .with_param_grid(grid)
            .run(&data);

        // sl=1.5 fails validation and is skipped
        assert_eq!(results.len(), 4);

        for pair in results.windows(2) {
            assert!(pair[0].summary.sharpe_ratio >= pair[1].summary.sharpe_ratio);
        }

        for r in &results {
            let mut config = base.clone();
            r.params.apply_to_config(&mut config);
            let expected = BacktestEngine::new(config).run_with_data(&data).metrics();
            assert_eq!(r.summary, SweepSummary::from(&expected));
        }
    }
}
