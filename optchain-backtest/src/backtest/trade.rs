//! Closed trade records.

use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::OptionSide;
use crate::risk::StopFlag;

/// How a trade was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// Target reached within the look-ahead window.
    Win,
    /// Stop reached within the look-ahead window.
    Loss,
    /// Neither level reached; closed at the last price in the window.
    Hold,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "WIN",
            Self::Loss => "LOSS",
            Self::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One simulated trade. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Series index of the entry snapshot.
    pub source_index: usize,
    /// File name of the entry snapshot.
    pub source_id: String,
    pub day: NaiveDate,
    pub side: OptionSide,
    pub strike: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    /// Series index where the exit price was read.
    pub exit_index: usize,
    pub exit_price: Decimal,
    pub outcome: Outcome,
    pub position_size: Decimal,
    pub pnl: Decimal,
    pub balance_after: Decimal,
    /// Daily limit tripped by this trade, if any.
    pub stop_flag: Option<StopFlag>,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.outcome == Outcome::Win
    }

    /// Balance before the trade was applied.
    pub fn balance_before(&self) -> Decimal {
        self.balance_after - self.pnl
    }

    /// PnL per unit of premium paid (None for a zero entry).
    pub fn return_on_entry(&self) -> Option<f64> {
        if self.entry_price.is_zero() {
            return None;
        }
        let pnl: f64 = self.pnl.try_into().unwrap_or(0.0);
        let entry: f64 = self.entry_price.try_into().unwrap_or(0.0);
        let r = pnl / entry;
        r.is_finite().then_some(r)
    }

    /// Stop flag label, empty when none.
    pub fn stop_flag_label(&self) -> &'static str {
        self.stop_flag.map(|f| f.label()).unwrap_or("")
    }
}
