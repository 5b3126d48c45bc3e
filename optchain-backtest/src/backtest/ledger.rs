//! Append-only trade ledger and per-day aggregation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::risk::{DailyLimitsConfig, DayStatus, StopFlag};

use super::trade::{Outcome, Trade};

/// Aggregate of one trading day's trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub holds: usize,
    pub day_pnl: Decimal,
    pub close_balance: Decimal,
    pub stop_reason: DayStatus,
}

/// Ordered trades and the running balance.
#[derive(Debug, Clone)]
pub struct Ledger {
    initial_balance: Decimal,
    balance: Decimal,
    trades: Vec<Trade>,
}

impl Ledger {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            trades: Vec::new(),
        }
    }

    /// Append a closed trade and apply its PnL.
    pub fn record(&mut self, trade: Trade) {
        self.balance += trade.pnl;
        debug_assert_eq!(self.balance, trade.balance_after);
        self.trades.push(trade);
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Balance after each trade, in ledger order.
    pub fn balances(&self) -> Vec<Decimal> {
        self.trades.iter().map(|t| t.balance_after).collect()
    }

    /// Per-day aggregates in date order.
    ///
    /// The stop reason comes from the trade flags (loss first). A day without
    /// flags is re-evaluated from its start and close balances.
    pub fn daily_summaries(&self, limits: &DailyLimitsConfig) -> Vec<DailySummary> {
        let mut by_day: BTreeMap<NaiveDate, Vec<&Trade>> = BTreeMap::new();
        for trade in &self.trades {
            by_day.entry(trade.day).or_default().push(trade);
        }

        by_day
            .into_iter()
            .filter_map(|(date, trades)| {
                let first = trades.first()?;
                let last = trades.last()?;
                let count = |o: Outcome| trades.iter().filter(|t| t.outcome == o).count();
                let has_flag = |f: StopFlag| trades.iter().any(|t| t.stop_flag == Some(f));

                let stop_reason = if has_flag(StopFlag::DailyLossLimit) {
                    DayStatus::Stopped(StopFlag::DailyLossLimit)
                } else if has_flag(StopFlag::DailyProfitTarget) {
                    DayStatus::Stopped(StopFlag::DailyProfitTarget)
                } else {
                    limits
                        .evaluate(first.balance_before(), last.balance_after)
                        .map(DayStatus::Stopped)
                        .unwrap_or(DayStatus::Active)
                };

                Some(DailySummary {
                    date,
                    trades: trades.len(),
                    wins: count(Outcome::Win),
                    losses: count(Outcome::Loss),
                    holds: count(Outcome::Hold),
                    day_pnl: trades.iter().map(|t| t.pnl).sum(),
                    close_balance: last.balance_after,
                    stop_reason,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::trade::fixtures::trade;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, d).unwrap()
    }

    #[test]
    fn test_balance_continuity() {
        let mut ledger = Ledger::new(dec!(1_000_000));
        ledger.record(trade(0, day(1), dec!(-2_000), dec!(998_000)));
        ledger.record(trade(1, day(1), dec!(4_000), dec!(1_002_000)));

        assert_eq!(ledger.balance(), dec!(1_002_000));
        let mut prev = ledger.initial_balance();
        for t in ledger.trades() {
            assert_eq!(t.balance_after, prev + t.pnl);
            prev = t.balance_after;
        }
        assert_eq!(ledger.balances(), vec![dec!(998_000), dec!(1_002_000)]);
    }

    #[test]
    fn test_daily_summaries_group_by_day() {
        let mut ledger = Ledger::new(dec!(1_000_000));
        ledger.record(trade(0, day(1), dec!(-2_000), dec!(998_000)));
        ledger.record(trade(1, day(1), dec!(0), dec!(998_000)));
        ledger.record(trade(5, day(2), dec!(4_000), dec!(1_002_000)));

        let daily = ledger.daily_summaries(&DailyLimitsConfig::default());
        assert_eq!(daily.len(), 2);

        assert_eq!(daily[0].date, day(1));
        assert_eq!(daily[0].trades, 2);
        assert_eq!(daily[0].losses, 1);
        assert_eq!(daily[0].holds, 1);
        assert_eq!(daily[0].day_pnl, dec!(-2_000));
        assert_eq!(daily[0].close_balance, dec!(998_000));
        assert_eq!(daily[0].stop_reason, DayStatus::Active);

        assert_eq!(daily[1].wins, 1);
        assert_eq!(daily[1].close_balance, dec!(1_002_000));
    }

    #[test]
    fn test_stop_reason_prefers_loss_flag() {
        let mut ledger = Ledger::new(dec!(1_000_000));
        let mut a = trade(0, day(1), dec!(25_000), dec!(1_025_000));
        a.stop_flag = Some(StopFlag::DailyProfitTarget);
        let mut b = trade(1, day(1), dec!(-40_000), dec!(985_000));
        b.stop_flag = Some(StopFlag::DailyLossLimit);
        ledger.record(a);
        ledger.record(b);

        let daily = ledger.daily_summaries(&DailyLimitsConfig::default());
        assert_eq!(daily[0].stop_reason.to_string(), "STOPPED by Daily Loss Limit");
    }

    #[test]
    fn test_stop_reason_recomputed_without_flags() {
        let mut ledger = Ledger::new(dec!(1_000_000));
        ledger.record(trade(0, day(1), dec!(30_000), dec!(1_030_000)));

        let daily = ledger.daily_summaries(&DailyLimitsConfig::default());
        assert_eq!(
            daily[0].stop_reason,
            DayStatus::Stopped(StopFlag::DailyProfitTarget)
        );
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = Ledger::new(dec!(1_000_000));
        assert!(ledger.is_empty());
        assert!(ledger.daily_summaries(&DailyLimitsConfig::default()).is_empty());
    }
}
