//! Exit resolution over a bounded look-ahead window.

use rust_decimal::Decimal;

use crate::data::{OptionSide, SnapshotSeries};
use crate::risk::TradeLevels;
use crate::screener::ChainSelector;

use super::trade::Outcome;

/// Where and how a trade closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub exit_index: usize,
    pub exit_price: Decimal,
    pub outcome: Outcome,
}

/// Scans the snapshots following an entry for the stop or the target.
#[derive(Debug, Clone)]
pub struct TradeResolver {
    window: usize,
    selector: ChainSelector,
}

impl TradeResolver {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            selector: ChainSelector::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Resolve an entry made at `entry_index`.
    ///
    /// Each snapshot in `entry_index+1 ..= entry_index+window` is priced at its
    /// own reference strike. The stop is tested before the target, so a price
    /// that satisfies both closes as a loss. Without a hit the trade closes as
    /// HOLD at the last usable price; with no usable price at all it cannot be
    /// resolved.
    pub fn resolve(
        &self,
        series: &SnapshotSeries,
        entry_index: usize,
        side: OptionSide,
        levels: &TradeLevels,
    ) -> Option<Resolution> {
        let start = entry_index + 1;
        let end = entry_index.saturating_add(self.window).min(series.len().saturating_sub(1));

        let mut last_seen = None;
        for index in start..=end {
            let Some(snapshot) = series.get(index) else {
                break;
            };
            let Some(price) = self.selector.side_price(snapshot, side) else {
                continue;
            };

            if price <= levels.stop_price {
                return Some(Resolution {
                    exit_index: index,
                    exit_price: levels.stop_price,
                    outcome: Outcome::Loss,
                });
            }
            if price >= levels.target_price {
                return Some(Resolution {
                    exit_index: index,
                    exit_price: levels.target_price,
                    outcome: Outcome::Win,
                });
            }
            last_seen = Some((index, price));
        }

        last_seen.map(|(exit_index, exit_price)| Resolution {
            exit_index,
            exit_price,
            outcome: Outcome::Hold,
        })
    }
}
