//! Reference strike and trade side selection.
//!
//! The reference strike is an ATM proxy: the listed strike closest to the mean
//! of all listed strikes. No underlying spot price is consulted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{OptionSide, SideSelection, Snapshot, StrikeRow};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("snapshot {0} has no strike rows")]
    EmptySnapshot(String),

    #[error("no {side} price at strike {strike} in {source_id}")]
    MissingPrice {
        source_id: String,
        side: OptionSide,
        strike: Decimal,
    },

    #[error("non-positive {side} price {price} at strike {strike} in {source_id}")]
    NonPositivePrice {
        source_id: String,
        side: OptionSide,
        strike: Decimal,
        price: Decimal,
    },
}

/// Row chosen as the reference strike of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    /// Position of the row in file order
    pub position: usize,
    pub row: StrikeRow,
    /// Mean of all strikes the reference was measured against
    pub mean_strike: Decimal,
}

/// Entry candidate for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub strike: Decimal,
    pub side: OptionSide,
    pub entry_price: Decimal,
}

/// Picks the reference strike and the side to trade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChainSelector;

impl ChainSelector {
    pub fn new() -> Self {
        Self
    }

    /// Strike minimising the distance to the mean strike. Ties go to the
    /// earliest row in file order.
    pub fn select_reference(&self, snapshot: &Snapshot) -> Result<ReferenceRow, SelectionError> {
        let rows = &snapshot.rows;
        if rows.is_empty() {
            return Err(SelectionError::EmptySnapshot(snapshot.source_id.clone()));
        }

        let total: Decimal = rows.iter().map(|r| r.strike).sum();
        let mean_strike = total / Decimal::from(rows.len());

        let mut best = 0;
        let mut best_distance = (rows[0].strike - mean_strike).abs();
        for (idx, row) in rows.iter().enumerate().skip(1) {
            let distance = (row.strike - mean_strike).abs();
            if distance < best_distance {
                best = idx;
                best_distance = distance;
            }
        }

        Ok(ReferenceRow {
            position: best,
            row: rows[best].clone(),
            mean_strike,
        })
    }

    /// Resolve the side to trade at a reference row.
    ///
    /// AUTO trades the call only when call OI is strictly greater; ties go to
    /// the put.
    pub fn resolve_side(&self, row: &StrikeRow, selection: SideSelection) -> OptionSide {
        match selection {
            SideSelection::Ce => OptionSide::Call,
            SideSelection::Pe => OptionSide::Put,
            SideSelection::Auto => {
                if row.ce_open_interest > row.pe_open_interest {
                    OptionSide::Call
                } else {
                    OptionSide::Put
                }
            }
        }
    }

    /// Build the entry candidate for a snapshot.
    pub fn select_candidate(
        &self,
        snapshot: &Snapshot,
        selection: SideSelection,
    ) -> Result<Candidate, SelectionError> {
        let reference = self.select_reference(snapshot)?;
        let side = self.resolve_side(&reference.row, selection);
        let strike = reference.row.strike;

        let price = reference
            .row
            .last_price(side)
            .ok_or_else(|| SelectionError::MissingPrice {
                source_id: snapshot.source_id.clone(),
                side,
                strike,
            })?;

        if price <= Decimal::ZERO {
            return Err(SelectionError::NonPositivePrice {
                source_id: snapshot.source_id.clone(),
                side,
                strike,
                price,
            });
        }

        Ok(Candidate {
            strike,
            side,
            entry_price: price,
        })
    }

    /// Price of `side` at this snapshot's own reference strike.
    pub fn side_price(&self, snapshot: &Snapshot, side: OptionSide) -> Option<Decimal> {
        self.select_reference(snapshot)
            .ok()
            .and_then(|r| r.row.last_price(side))
    }
}
