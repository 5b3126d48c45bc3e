//! Daily circuit breakers.
//!
//! Per-day state machine, ACTIVE until a limit trips and then STOPPED for the
//! rest of that trading day:
//! - Daily loss: day PnL <= -1% of day-start balance -> STOPPED
//! - Daily profit: day PnL >= +2% of day-start balance -> STOPPED
//! - Trade cap: no more than N entries per day

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Daily limit configuration, as fractions of the day-start balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyLimitsConfig {
    /// Day loss that stops trading (0.01 = 1%).
    pub max_daily_loss: f64,
    /// Day profit that stops trading (0.02 = 2%).
    pub max_daily_profit: f64,
}

impl Default for DailyLimitsConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: 0.01,
            max_daily_profit: 0.02,
        }
    }
}

impl DailyLimitsConfig {
    /// Day PnL as a fraction of the day-start balance (0 when the start is 0).
    pub fn day_return(day_start: Decimal, balance: Decimal) -> Decimal {
        if day_start.is_zero() {
            return Decimal::ZERO;
        }
        (balance - day_start) / day_start
    }

    /// Limit tripped by moving from `day_start` to `balance`. Loss is checked first.
    pub fn evaluate(&self, day_start: Decimal, balance: Decimal) -> Option<StopFlag> {
        let ret = Self::day_return(day_start, balance);
        let loss_limit = Decimal::try_from(self.max_daily_loss).unwrap_or(Decimal::ZERO);
        let profit_limit = Decimal::try_from(self.max_daily_profit).unwrap_or(Decimal::ZERO);

        if ret <= -loss_limit {
            Some(StopFlag::DailyLossLimit)
        } else if ret >= profit_limit {
            Some(StopFlag::DailyProfitTarget)
        } else {
            None
        }
    }
}

/// Limit that stopped a trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopFlag {
    DailyLossLimit,
    DailyProfitTarget,
}

impl StopFlag {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DailyLossLimit => "Daily Loss Limit",
            Self::DailyProfitTarget => "Daily Profit Target",
        }
    }
}

impl fmt::Display for StopFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of the current trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DayStatus {
    #[default]
    Active,
    Stopped(StopFlag),
}

impl DayStatus {
    pub fn allows_entries(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for DayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Stopped(flag) => write!(f, "STOPPED by {}", flag),
        }
    }
}

/// Risk state of one trading day.
#[derive(Debug, Clone, Default)]
pub struct DayState {
    pub day: Option<NaiveDate>,
    pub trades_opened: usize,
    pub day_start_balance: Decimal,
    pub status: DayStatus,
}

/// Why an entry was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Day already stopped by an earlier trade.
    Stopped(StopFlag),
    /// Daily trade cap reached.
    TradeCap(usize),
    /// Limit found breached at entry time; the day is now stopped.
    Breached(StopFlag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDecision {
    Allowed,
    Rejected(RejectReason),
}

impl EntryDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Daily circuit breaker gating every entry of a backtest pass.
#[derive(Debug, Clone)]
pub struct DailyCircuitBreaker {
    config: DailyLimitsConfig,
    max_trades_per_day: usize,
    state: DayState,
    halt_history: Vec<(NaiveDate, StopFlag)>,
}

impl DailyCircuitBreaker {
    pub fn new(config: DailyLimitsConfig, max_trades_per_day: usize) -> Self {
        Self {
            config,
            max_trades_per_day,
            state: DayState::default(),
            halt_history: Vec::new(),
        }
    }

    /// Start a new day if `day` differs from the current one.
    ///
    /// Returns true when the state was reset.
    pub fn roll_day(&mut self, day: NaiveDate, balance: Decimal) -> bool {
        if self.state.day == Some(day) {
            return false;
        }

        debug!("New trading day {} (start balance {})", day, balance);
        self.state = DayState {
            day: Some(day),
            trades_opened: 0,
            day_start_balance: balance,
            status: DayStatus::Active,
        };
        true
    }

    /// Gate a new entry: stopped day, then trade cap, then a fresh limit check.
    pub fn check_entry(&mut self, balance: Decimal) -> EntryDecision {
        if let DayStatus::Stopped(flag) = self.state.status {
            return EntryDecision::Rejected(RejectReason::Stopped(flag));
        }

        if self.state.trades_opened >= self.max_trades_per_day {
            return EntryDecision::Rejected(RejectReason::TradeCap(self.max_trades_per_day));
        }

        if let Some(flag) = self.config.evaluate(self.state.day_start_balance, balance) {
            self.halt(flag);
            return EntryDecision::Rejected(RejectReason::Breached(flag));
        }

        EntryDecision::Allowed
    }

    /// Count a closed trade and evaluate the daily limits on its balance.
    pub fn record_trade(&mut self, balance_after: Decimal) -> Option<StopFlag> {
        self.state.trades_opened += 1;

        if !self.state.status.allows_entries() {
            return None;
        }

        let flag = self.config.evaluate(self.state.day_start_balance, balance_after)?;
        self.halt(flag);
        Some(flag)
    }

    fn halt(&mut self, flag: StopFlag) {
        self.state.status = DayStatus::Stopped(flag);
        if let Some(day) = self.state.day {
            debug!("Trading stopped for {}: {}", day, flag);
            self.halt_history.push((day, flag));
        }
    }

    pub fn state(&self) -> &DayState {
        &self.state
    }

    pub fn status(&self) -> DayStatus {
        self.state.status
    }

    pub fn config(&self) -> &DailyLimitsConfig {
        &self.config
    }

    pub fn halt_history(&self) -> &[(NaiveDate, StopFlag)] {
        &self.halt_history
    }
}
