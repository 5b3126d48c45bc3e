//! Per-snapshot strike and side selection.

pub mod chain_selector;

pub use chain_selector::{Candidate, ChainSelector, ReferenceRow, SelectionError};
