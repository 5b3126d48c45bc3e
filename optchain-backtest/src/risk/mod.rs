//! Risk management module.
//!
//! Provides:
//! - Position sizing (stop, target and size from a fixed risk fraction)
//! - Daily circuit breakers (loss/profit stops, trade cap)

pub mod circuit_breakers;
pub mod position_sizer;

pub use circuit_breakers::{
    DailyCircuitBreaker, DailyLimitsConfig, DayState, DayStatus, EntryDecision, RejectReason,
    StopFlag,
};
pub use position_sizer::{SizingConfig, TradeLevels};
