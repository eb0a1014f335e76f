//! # Risk Model Estimation
//!
//! $$
//! \mu_i=(1+\bar r_i)^{252}-1,\qquad \Sigma = 252\cdot\widehat{\operatorname{Cov}}(r)
//! $$
//!
//! Historical expected returns and covariance, with forecast overrides for selected tickers.

use std::collections::HashSet;

use ndarray::Array1;
use ndarray::Axis;
use tracing::debug;

use super::data::sample_covariance;
use super::data::simple_returns;
use super::types::ForecastSeries;
use super::types::PriceMatrix;
use super::types::ReturnMatrix;
use super::types::RiskModel;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::TRADING_DAYS;

/// Annualize a mean per-period return by compounding over a trading year.
pub fn annualize_mean_return(mean: f64) -> f64 {
  (1.0 + mean).powf(TRADING_DAYS) - 1.0
}

/// Arithmetic mean of each column of `returns`, compounded to an annual figure.
pub fn mean_historical_return(returns: &ReturnMatrix) -> Result<Array1<f64>> {
  let means = returns
    .values()
    .mean_axis(Axis(0))
    .ok_or(PortfolioError::InsufficientData {
      required: 1,
      actual: 0,
    })?;
  Ok(means.mapv(annualize_mean_return))
}

/// Annualized sample covariance of `returns`.
pub fn annualized_covariance(returns: &ReturnMatrix) -> Result<ndarray::Array2<f64>> {
  Ok(sample_covariance(returns.values())? * TRADING_DAYS)
}

/// Annualized return implied by moving from `current_price` to the forecast horizon price.
pub fn forecast_annual_return(forecast: &ForecastSeries, current_price: f64) -> Result<f64> {
  let points = forecast.horizon_length();
  if points < 2 {
    return Err(PortfolioError::EmptyForecast {
      ticker: forecast.ticker.clone(),
      points,
    });
  }
  if let Some((index, &value)) = forecast
    .values
    .iter()
    .enumerate()
    .find(|(_, v)| !v.is_finite() || **v <= 0.0)
  {
    return Err(PortfolioError::InvalidForecast {
      ticker: forecast.ticker.clone(),
      index,
      value,
    });
  }

  let horizon_price = forecast.values[points - 1];
  let total_return = horizon_price / current_price - 1.0;
  Ok((1.0 + total_return).powf(TRADING_DAYS / points as f64) - 1.0)
}

/// Estimator of annualized expected returns and covariance.
#[derive(Clone, Debug, Default)]
pub struct RiskModelEstimator;

impl RiskModelEstimator {
  /// Build a [`RiskModel`] from `prices`, replacing the historical estimate of every ticker
  /// that has a forecast.
  pub fn estimate(&self, prices: &PriceMatrix, forecasts: &[ForecastSeries]) -> Result<RiskModel> {
    // forecast errors take precedence over history length
    let mut seen = HashSet::with_capacity(forecasts.len());
    for f in forecasts {
      if prices.column_index(&f.ticker).is_none() {
        return Err(PortfolioError::UnknownTicker(f.ticker.clone()));
      }
      if !seen.insert(f.ticker.as_str()) {
        return Err(PortfolioError::DuplicateTicker(f.ticker.clone()));
      }
      if f.horizon_length() < 2 {
        return Err(PortfolioError::EmptyForecast {
          ticker: f.ticker.clone(),
          points: f.horizon_length(),
        });
      }
    }

    if prices.nrows() < 3 {
      return Err(PortfolioError::InsufficientData {
        required: 3,
        actual: prices.nrows(),
      });
    }

    let returns = simple_returns(prices)?;
    let mut mu = mean_historical_return(&returns)?;
    let cov = annualized_covariance(&returns)?;

    for f in forecasts {
      let col = prices
        .column_index(&f.ticker)
        .ok_or_else(|| PortfolioError::UnknownTicker(f.ticker.clone()))?;
      let current_price = prices.last_price(&f.ticker)?;
      let annual = forecast_annual_return(f, current_price)?;
      debug!(
        ticker = %f.ticker,
        historical = mu[col],
        forecast = annual,
        horizon = f.horizon_length(),
        "overriding historical expected return with forecast"
      );
      mu[col] = annual;
    }

    debug!(
      tickers = prices.ncols(),
      periods = returns.nrows(),
      overrides = forecasts.len(),
      "estimated risk model"
    );

    RiskModel::new(prices.tickers().to_vec(), mu, cov)
  }
}

/// Convenience wrapper around [`RiskModelEstimator::estimate`].
pub fn estimate_risk_model(prices: &PriceMatrix, forecasts: &[ForecastSeries]) -> Result<RiskModel> {
  RiskModelEstimator.estimate(prices, forecasts)
}
