//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Forecast-aware mean-variance portfolio construction.

pub mod data;
pub mod engine;
pub mod optimizers;
mod qp;
pub mod risk_model;
pub mod sanitizer;
pub mod types;

pub use data::business_days;
pub use data::sample_covariance;
pub use data::simple_returns;
pub use data::simple_returns_series;
pub use engine::optimize;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use optimizers::check_conditioning;
pub use optimizers::condition_number;
pub use optimizers::optimize_max_sharpe;
pub use optimizers::optimize_min_volatility;
pub use optimizers::portfolio_performance;
pub use optimizers::PortfolioOptimizer;
pub use risk_model::estimate_risk_model;
pub use risk_model::forecast_annual_return;
pub use risk_model::mean_historical_return;
pub use risk_model::RiskModelEstimator;
pub use sanitizer::clean_weights;
pub use sanitizer::WeightSanitizer;
pub use types::ForecastSeries;
pub use types::Objective;
pub use types::PortfolioPerformance;
pub use types::PortfolioResult;
pub use types::PriceMatrix;
pub use types::ReturnMatrix;
pub use types::RiskModel;
pub use types::WeightBounds;
pub use types::WeightVector;
