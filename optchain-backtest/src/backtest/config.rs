//! Backtest configuration.
//!
//! Loaded from TOML (see `config/default.toml`); every field has a default so a
//! partial file is valid.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::SideSelection;
use crate::risk::{DailyLimitsConfig, SizingConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Configuration for a backtest pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Starting balance.
    pub initial_balance: Decimal,

    /// Stop distance as a fraction of the entry price (0.3 = 30%).
    pub stop_loss_fraction: f64,

    /// Target distance as a multiple of the stop distance.
    pub reward_ratio: f64,

    /// Fraction of the balance risked per trade.
    pub risk_fraction: f64,

    /// Maximum entries per trading day.
    pub max_trades_per_day: usize,

    /// Future snapshots scanned to resolve an exit. Defaults to `max_trades_per_day`.
    pub lookahead_window: Option<usize>,

    /// Side to trade.
    pub side: SideSelection,

    /// Daily loss and profit stops.
    pub daily_limits: DailyLimitsConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_balance: Decimal::from(1_000_000),
            stop_loss_fraction: 0.3,
            reward_ratio: 2.0,
            risk_fraction: 0.02,
            max_trades_per_day: 3,
            lookahead_window: None,
            side: SideSelection::Auto,
            daily_limits: DailyLimitsConfig::default(),
        }
    }
}

impl BacktestConfig {
    /// Load from a TOML file and validate.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn effective_window(&self) -> usize {
        self.lookahead_window.unwrap_or(self.max_trades_per_day)
    }

    pub fn sizing(&self) -> SizingConfig {
        SizingConfig {
            stop_loss_fraction: self.stop_loss_fraction,
            reward_ratio: self.reward_ratio,
            risk_fraction: self.risk_fraction,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.initial_balance <= Decimal::ZERO {
            return invalid(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            ));
        }
        if !(self.stop_loss_fraction > 0.0 && self.stop_loss_fraction < 1.0) {
            return invalid(format!(
                "stop_loss_fraction must be in (0, 1), got {}",
                self.stop_loss_fraction
            ));
        }
        if !(self.reward_ratio > 0.0 && self.reward_ratio.is_finite()) {
            return invalid(format!(
                "reward_ratio must be positive, got {}",
                self.reward_ratio
            ));
        }
        if !(self.risk_fraction > 0.0 && self.risk_fraction <= 1.0) {
            return invalid(format!(
                "risk_fraction must be in (0, 1], got {}",
                self.risk_fraction
            ));
        }
        if self.max_trades_per_day == 0 {
            return invalid("max_trades_per_day must be at least 1".to_string());
        }
        if self.lookahead_window == Some(0) {
            return invalid("lookahead_window must be at least 1".to_string());
        }
        if !(self.daily_limits.max_daily_loss > 0.0 && self.daily_limits.max_daily_profit > 0.0) {
            return invalid("daily limits must be positive".to_string());
        }
        Ok(())
    }

    /// One-line description for logs.
    pub fn describe(&self) -> String {
        format!(
            "sl={} rr={} risk={} max_trades={} window={} side={}",
            self.stop_loss_fraction,
            self.reward_ratio,
            self.risk_fraction,
            self.max_trades_per_day,
            self.effective_window(),
            self.side
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = BacktestConfig::default();
        assert_eq!(config.initial_balance, dec!(1_000_000));
        assert_eq!(config.stop_loss_fraction, 0.3);
        assert_eq!(config.reward_ratio, 2.0);
        assert_eq!(config.risk_fraction, 0.02);
        assert_eq!(config.max_trades_per_day, 3);
        assert_eq!(config.side, SideSelection::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_window_defaults_to_trade_cap() {
        let mut config = BacktestConfig {
            max_trades_per_day: 5,
            ..Default::default()
        };
        assert_eq!(config.effective_window(), 5);

        config.lookahead_window = Some(2);
        assert_eq!(config.effective_window(), 2);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_sl = BacktestConfig {
            stop_loss_fraction: 1.5,
            ..Default::default()
        };
        assert!(matches!(bad_sl.validate(), Err(ConfigError::Invalid(_))));

        let no_trades = BacktestConfig {
            max_trades_per_day: 0,
            ..Default::default()
        };
        assert!(no_trades.validate().is_err());

        let zero_window = BacktestConfig {
            lookahead_window: Some(0),
            ..Default::default()
        };
        assert!(zero_window.validate().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: BacktestConfig = toml::from_str(
            r#"
            stop_loss_fraction = 0.2
            side = "CE"

            [daily_limits]
            max_daily_loss = 0.015
            "#,
        )
        .unwrap();

        assert_eq!(config.stop_loss_fraction, 0.2);
        assert_eq!(config.side, SideSelection::Ce);
        assert_eq!(config.daily_limits.max_daily_loss, 0.015);
        assert_eq!(config.daily_limits.max_daily_profit, 0.02);
        assert_eq!(config.max_trades_per_day, 3);
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bt.toml");
        std::fs::write(&path, "max_trades_per_day = 2\nlookahead_window = 4\n").unwrap();

        let config = BacktestConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.max_trades_per_day, 2);
        assert_eq!(config.effective_window(), 4);
    }
}
