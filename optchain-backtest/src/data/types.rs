//! Core data types for option-chain snapshot backtesting.
//!
//! A snapshot is one capture of a symbol's option chain: one row per strike with
//! the call (CE) and put (PE) last traded price and open interest.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract side of an option chain row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    #[serde(rename = "CE")]
    Call,
    #[serde(rename = "PE")]
    Put,
}

impl OptionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown side '{0}' (expected AUTO, CE or PE)")]
pub struct ParseSideError(pub String);

/// Which side to trade at each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SideSelection {
    /// Side with strictly greater open interest at the reference strike (ties -> PE).
    #[default]
    Auto,
    Ce,
    Pe,
}

impl FromStr for SideSelection {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "AUTO" => Ok(Self::Auto),
            "CE" | "CALL" => Ok(Self::Ce),
            "PE" | "PUT" => Ok(Self::Pe),
            _ => Err(ParseSideError(s.to_string())),
        }
    }
}

impl fmt::Display for SideSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Auto => "AUTO",
            Self::Ce => "CE",
            Self::Pe => "PE",
        };
        f.write_str(s)
    }
}

/// One strike of a chain snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeRow {
    pub strike: Decimal,

    /// Call last traded price (None when the cell was empty)
    pub ce_last_price: Option<Decimal>,

    /// Put last traded price (None when the cell was empty)
    pub pe_last_price: Option<Decimal>,

    pub ce_open_interest: i64,

    pub pe_open_interest: i64,
}

impl StrikeRow {
    /// Last traded price for the given side.
    pub fn last_price(&self, side: OptionSide) -> Option<Decimal> {
        match side {
            OptionSide::Call => self.ce_last_price,
            OptionSide::Put => self.pe_last_price,
        }
    }

    /// Open interest for the given side.
    pub fn open_interest(&self, side: OptionSide) -> i64 {
        match side {
            OptionSide::Call => self.ce_open_interest,
            OptionSide::Put => self.pe_open_interest,
        }
    }
}

/// Complete chain snapshot for one symbol at one capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// File name the snapshot was read from
    pub source_id: String,

    /// Underlying symbol (e.g., "BANKNIFTY")
    pub symbol: String,

    /// Capture time encoded in the file name
    pub captured_at: NaiveDateTime,

    /// Strike rows in file order
    pub rows: Vec<StrikeRow>,
}

impl Snapshot {
    pub fn new(
        source_id: impl Into<String>,
        symbol: impl Into<String>,
        captured_at: NaiveDateTime,
        rows: Vec<StrikeRow>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            symbol: symbol.into(),
            captured_at,
            rows,
        }
    }

    /// Trading day this snapshot belongs to.
    pub fn trading_day(&self) -> NaiveDate {
        self.captured_at.date()
    }

    /// A snapshot with no rows cannot produce a candidate or a price.
    pub fn is_usable(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Snapshots ordered by capture time.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSeries {
    snapshots: Vec<Snapshot>,
}

impl SnapshotSeries {
    /// Build a series, sorting by capture time (ties broken by source id).
    pub fn new(mut snapshots: Vec<Snapshot>) -> Self {
        snapshots.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        Self { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    pub fn as_slice(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Snapshot> {
        self.snapshots.iter()
    }

    /// Distinct trading days covered, ascending.
    pub fn trading_days(&self) -> Vec<NaiveDate> {
        let mut days: Vec<_> = self.snapshots.iter().map(|s| s.trading_day()).collect();
        days.dedup();
        days
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 9, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_side_selection_parsing() {
        assert_eq!("auto".parse::<SideSelection>(), Ok(SideSelection::Auto));
        assert_eq!("CE".parse::<SideSelection>(), Ok(SideSelection::Ce));
        assert_eq!(" pe ".parse::<SideSelection>(), Ok(SideSelection::Pe));
        assert!("straddle".parse::<SideSelection>().is_err());
    }

    #[test]
    fn test_row_accessors() {
        let row = StrikeRow {
            strike: dec!(48000),
            ce_last_price: Some(dec!(310.5)),
            pe_last_price: None,
            ce_open_interest: 1200,
            pe_open_interest: 900,
        };
        assert_eq!(row.last_price(OptionSide::Call), Some(dec!(310.5)));
        assert_eq!(row.last_price(OptionSide::Put), None);
        assert_eq!(row.open_interest(OptionSide::Put), 900);
    }

    #[test]
    fn test_series_sorted_by_capture_time() {
        let series = SnapshotSeries::new(vec![
            Snapshot::new("B_20250902_100000.csv", "B", at(2, 10), vec![]),
            Snapshot::new("B_20250901_150000.csv", "B", at(1, 15), vec![]),
            Snapshot::new("B_20250901_093000.csv", "B", at(1, 9), vec![]),
        ]);

        let ids: Vec<_> = series.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "B_20250901_093000.csv",
                "B_20250901_150000.csv",
                "B_20250902_100000.csv"
            ]
        );
        assert_eq!(series.trading_days().len(), 2);
        assert!(!series.get(0).unwrap().is_usable());
    }
}
