//! # portfolio-rs
//!
//! $$
//! \mathbf w^\*=\arg\max_{\mathbf w}\frac{\mathbf w^\top\mu-r_f}{\sqrt{\mathbf w^\top\Sigma\mathbf w}}
//! $$
//!
//! Forecast-aware mean-variance allocation over historical prices, with a static
//! buy-and-hold backtest of the resulting weights.
//!
//! ```ignore
//! let config = PortfolioEngineConfig::default();
//! let (weights, model) = portfolio_rs::optimize(&prices, &forecasts, &config)?;
//! let report = portfolio_rs::backtest(&returns, &weights, config.risk_free_rate)?;
//! ```

pub mod error;
pub mod quant;

pub use error::ErrorKind;
pub use error::PortfolioError;
pub use error::Result;
pub use quant::backtest::backtest;
pub use quant::backtest::BacktestComparison;
pub use quant::backtest::PerformanceReport;
pub use quant::portfolio::optimize;
pub use quant::portfolio::ForecastSeries;
pub use quant::portfolio::Objective;
pub use quant::portfolio::PortfolioEngine;
pub use quant::portfolio::PortfolioEngineConfig;
pub use quant::portfolio::PriceMatrix;
pub use quant::portfolio::ReturnMatrix;
pub use quant::portfolio::RiskModel;
pub use quant::portfolio::WeightBounds;
pub use quant::portfolio::WeightVector;
