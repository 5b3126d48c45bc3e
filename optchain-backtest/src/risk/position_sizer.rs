//! Stop, target and position size for a single entry.
//!
//! - Risk amount: `balance * risk_fraction`
//! - Stop: `entry * (1 - stop_loss_fraction)`
//! - Target: `entry * (1 + reward_ratio * stop_loss_fraction)`
//! - Position size: `risk_amount / entry` (fractional units allowed)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Sizing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Fraction of entry price risked before the stop (0.3 = 30%).
    pub stop_loss_fraction: f64,
    /// Target distance as a multiple of the stop distance.
    pub reward_ratio: f64,
    /// Fraction of the balance put at risk per trade.
    pub risk_fraction: f64,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            stop_loss_fraction: 0.3,
            reward_ratio: 2.0,
            risk_fraction: 0.02,
        }
    }
}

/// Price levels and size of one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub risk_amount: Decimal,
    pub position_size: Decimal,
}

impl TradeLevels {
    /// Size a trade. Returns None for a non-positive entry or parameters that
    /// do not convert to decimals.
    pub fn compute(entry_price: Decimal, balance: Decimal, config: &SizingConfig) -> Option<Self> {
        if entry_price <= Decimal::ZERO {
            return None;
        }

        let sl = Decimal::try_from(config.stop_loss_fraction).ok()?;
        let rr = Decimal::try_from(config.reward_ratio).ok()?;
        let risk = Decimal::try_from(config.risk_fraction).ok()?;

        let risk_amount = balance * risk;
        Some(Self {
            entry_price,
            stop_price: entry_price * (Decimal::ONE - sl),
            target_price: entry_price * (Decimal::ONE + rr * sl),
            risk_amount,
            position_size: risk_amount / entry_price,
        })
    }

    /// Realised PnL when exiting at `exit_price`.
    pub fn pnl(&self, exit_price: Decimal) -> Decimal {
        (exit_price - self.entry_price) * self.position_size
    }
}
