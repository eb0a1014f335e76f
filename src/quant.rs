//! # Quant
//!
//! Portfolio construction and historical evaluation.

pub mod backtest;
pub mod portfolio;
pub mod synthetic;

/// Trading days per year used for every annualization.
pub const TRADING_DAYS: f64 = 252.0;
