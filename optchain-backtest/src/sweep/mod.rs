//! Parameter sweeps over a pre-loaded snapshot series.

pub mod optimizer;

pub use optimizer::{ParameterGrid, ParameterSet, SweepResult, SweepRunner, SweepSummary};
