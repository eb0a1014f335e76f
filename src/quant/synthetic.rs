//! # Synthetic Market Data
//!
//! $$
//! S_{t+\Delta t}=S_t\exp\Big(\big(\mu-\tfrac12\sigma^2\big)\Delta t+\sigma\sqrt{\Delta t}\,Z\Big)
//! $$
//!
//! Seeded geometric Brownian motion price panels and forecast paths for demos and benches.

use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::portfolio::business_days;
use crate::quant::portfolio::ForecastSeries;
use crate::quant::portfolio::PriceMatrix;
use crate::quant::TRADING_DAYS;

/// Geometric Brownian motion with annual drift and volatility.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct Gbm {
  pub mu: f64,
  pub sigma: f64,
  pub x0: f64,
}

impl Gbm {
  /// `n` daily prices starting at `x0`.
  pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Array1<f64> {
    let dt = 1.0 / TRADING_DAYS;
    let drift = (self.mu - 0.5 * self.sigma * self.sigma) * dt;
    let diffusion = self.sigma * dt.sqrt();

    let mut path = Array1::<f64>::zeros(n);
    let mut x = self.x0;
    for value in path.iter_mut() {
      *value = x;
      let z: f64 = StandardNormal.sample(rng);
      x *= (drift + diffusion * z).exp();
    }
    path
  }
}

/// Seeded price panel with one GBM column per ticker on consecutive business days.
pub fn synthetic_prices(
  assets: &[(&str, Gbm)],
  days: usize,
  start: NaiveDate,
  seed: u64,
) -> Result<PriceMatrix> {
  if let Some((ticker, gbm)) = assets
    .iter()
    .find(|(_, g)| !(g.x0 > 0.0 && g.sigma >= 0.0 && g.mu.is_finite() && g.sigma.is_finite()))
  {
    return Err(PortfolioError::InvalidConfig(format!(
      "invalid GBM parameters for {ticker}: {gbm:?}"
    )));
  }

  let mut rng = StdRng::seed_from_u64(seed);
  let mut values = Array2::<f64>::zeros((days, assets.len()));
  for (j, (_, gbm)) in assets.iter().enumerate() {
    values.column_mut(j).assign(&gbm.sample(days, &mut rng));
  }

  PriceMatrix::new(
    business_days(start, days),
    assets.iter().map(|(t, _)| t.to_string()).collect(),
    values,
  )
}

/// Smooth forecast path from `last_price` growing at `annual_return` for `horizon` days.
pub fn synthetic_forecast(
  ticker: &str,
  last_price: f64,
  annual_return: f64,
  horizon: usize,
) -> ForecastSeries {
  let values = (0..horizon)
    .map(|i| last_price * (1.0 + annual_return).powf(i as f64 / TRADING_DAYS))
    .collect();
  ForecastSeries::new(ticker.to_string(), values)
}
