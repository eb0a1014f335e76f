//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Clean}\big(\operatorname{Optimize}(\mu, \Sigma)\big)
//! $$
//!
//! High-level orchestration API: estimate, optimize, sanitize and evaluate.

use rayon::prelude::*;
use tracing::info;

use super::optimizers::portfolio_performance;
use super::optimizers::PortfolioOptimizer;
use super::risk_model::RiskModelEstimator;
use super::sanitizer::WeightSanitizer;
use super::sanitizer::DEFAULT_SNAP_THRESHOLD;
use super::types::ForecastSeries;
use super::types::Objective;
use super::types::PortfolioResult;
use super::types::PriceMatrix;
use super::types::ReturnMatrix;
use super::types::RiskModel;
use super::types::WeightBounds;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::backtest;
use crate::quant::backtest::BacktestComparison;
use crate::quant::backtest::PerformanceReport;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioEngineConfig {
  /// Objective used by [`PortfolioEngine::optimize`].
  pub objective: Objective,
  /// Annual risk-free rate for the Sharpe objective, performance and backtests.
  pub risk_free_rate: f64,
  pub bounds: WeightBounds,
  /// Cleaned weights below this magnitude become exactly zero.
  pub snap_threshold: f64,
  /// Largest accepted covariance condition number.
  pub condition_threshold: f64,
  /// Iteration cap of the QP solver.
  pub max_iterations: usize,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      objective: Objective::default(),
      risk_free_rate: backtest::DEFAULT_RISK_FREE_RATE,
      bounds: WeightBounds::default(),
      snap_threshold: DEFAULT_SNAP_THRESHOLD,
      condition_threshold: 1e10,
      max_iterations: 500,
    }
  }
}

impl PortfolioEngineConfig {
  pub fn with_objective(mut self, objective: Objective) -> Self {
    self.objective = objective;
    self
  }

  pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
    self.risk_free_rate = risk_free_rate;
    self
  }

  pub fn with_bounds(mut self, bounds: WeightBounds) -> Self {
    self.bounds = bounds;
    self
  }

  /// Reject values no run could succeed with.
  pub fn validate(&self) -> Result<()> {
    if !self.risk_free_rate.is_finite() {
      return Err(PortfolioError::InvalidConfig(format!(
        "risk-free rate must be finite, got {}",
        self.risk_free_rate
      )));
    }
    if !(self.snap_threshold.is_finite() && self.snap_threshold >= 0.0) {
      return Err(PortfolioError::InvalidConfig(format!(
        "snap threshold must be a non-negative number, got {}",
        self.snap_threshold
      )));
    }
    if self.condition_threshold.is_nan() || self.condition_threshold <= 1.0 {
      return Err(PortfolioError::InvalidConfig(format!(
        "condition threshold must exceed 1, got {}",
        self.condition_threshold
      )));
    }
    if self.max_iterations == 0 {
      return Err(PortfolioError::InvalidConfig(
        "max_iterations must be positive".into(),
      ));
    }
    if let WeightBounds::Global(lo, hi) = self.bounds {
      if !(lo.is_finite() && hi.is_finite()) || lo > hi {
        return Err(PortfolioError::InvalidConfig(format!(
          "invalid global weight bounds ({lo}, {hi})"
        )));
      }
    }
    Ok(())
  }

  /// The configured objective with its risk-free rate taken from this config.
  pub fn effective_objective(&self) -> Objective {
    self.objective.with_risk_free_rate(self.risk_free_rate)
  }
}

/// Single entry-point engine for the estimate, optimize and backtest workflow.
#[derive(Clone, Debug)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine, validating `config`.
  pub fn new(config: PortfolioEngineConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Annualized risk model with forecast overrides.
  pub fn estimate(&self, prices: &PriceMatrix, forecasts: &[ForecastSeries]) -> Result<RiskModel> {
    RiskModelEstimator.estimate(prices, forecasts)
  }

  fn run(&self, model: &RiskModel, objective: Objective) -> Result<PortfolioResult> {
    let optimizer = PortfolioOptimizer {
      objective,
      bounds: self.config.bounds.clone(),
      condition_threshold: self.config.condition_threshold,
      max_iterations: self.config.max_iterations,
    };
    let raw = optimizer.solve(model)?;

    let (lower, upper) = self.config.bounds.resolve(model.tickers())?;
    let weights = WeightSanitizer::new(lower, upper, self.config.snap_threshold).clean(&raw)?;

    let risk_free_rate = match objective {
      Objective::MaxSharpe { risk_free_rate } => risk_free_rate,
      Objective::MinVolatility => self.config.risk_free_rate,
    };
    let performance = portfolio_performance(&weights, model, risk_free_rate)?;

    Ok(PortfolioResult {
      objective,
      weights,
      risk_model: model.clone(),
      performance,
    })
  }

  /// Optimize and clean weights for an already estimated `model`.
  pub fn optimize_model(&self, model: &RiskModel) -> Result<PortfolioResult> {
    self.run(model, self.config.effective_objective())
  }

  /// Full pipeline from prices and forecasts to clean weights.
  pub fn optimize(
    &self,
    prices: &PriceMatrix,
    forecasts: &[ForecastSeries],
  ) -> Result<PortfolioResult> {
    let model = self.estimate(prices, forecasts)?;
    let result = self.optimize_model(&model)?;

    info!(
      objective = %result.objective,
      assets = model.len(),
      forecasts = forecasts.len(),
      expected_return = result.performance.expected_return,
      volatility = result.performance.volatility,
      sharpe = result.performance.sharpe,
      weights = %result.weights,
      "portfolio optimized"
    );
    Ok(result)
  }

  /// Backtest static `weights` at the configured risk-free rate.
  pub fn backtest(&self, returns: &ReturnMatrix, weights: &WeightVector) -> Result<PerformanceReport> {
    backtest::backtest(returns, weights, self.config.risk_free_rate)
  }

  /// Backtest `strategy` against `benchmark` on the same window.
  pub fn compare(
    &self,
    returns: &ReturnMatrix,
    strategy: &WeightVector,
    benchmark: &WeightVector,
  ) -> Result<BacktestComparison> {
    backtest::compare(returns, strategy, benchmark, self.config.risk_free_rate)
  }

  /// Optimize `model` under every objective in parallel, keeping input order.
  pub fn sweep(&self, model: &RiskModel, objectives: &[Objective]) -> Vec<Result<PortfolioResult>> {
    objectives
      .par_iter()
      .map(|&objective| self.run(model, objective))
      .collect()
  }
}

/// Estimate, optimize and clean in one call.
pub fn optimize(
  prices: &PriceMatrix,
  forecasts: &[ForecastSeries],
  config: &PortfolioEngineConfig,
) -> Result<(WeightVector, RiskModel)> {
  let result = PortfolioEngine::new(config.clone())?.optimize(prices, forecasts)?;
  Ok((result.weights, result.risk_model))
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use approx::assert_abs_diff_eq;
  use chrono::NaiveDate;
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;
  use crate::quant::portfolio::business_days;
  use crate::quant::portfolio::risk_model::forecast_annual_return;
  use crate::quant::portfolio::simple_returns;

  const TICKERS: [&str; 3] = ["TSLA", "BND", "SPY"];

  /// Deterministic prices with distinct drifts and oscillations per asset.
  fn synthetic_prices(rows: usize) -> PriceMatrix {
    let drift = [0.0012, 0.0002, 0.0006];
    let amp = [0.03, 0.004, 0.012];
    let freq = [0.7, 1.9, 1.3];
    let phase = [0.0, 0.5, 1.1];

    let mut values = Array2::<f64>::zeros((rows, TICKERS.len()));
    for j in 0..TICKERS.len() {
      let mut p = 100.0;
      for t in 0..rows {
        if t > 0 {
          p *= 1.0 + drift[j] + amp[j] * (t as f64 * freq[j] + phase[j]).sin();
        }
        values[[t, j]] = p;
      }
    }

    PriceMatrix::new(
      business_days(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), rows),
      TICKERS.iter().map(|t| t.to_string()).collect(),
      values,
    )
    .unwrap()
  }

  fn engine(config: PortfolioEngineConfig) -> PortfolioEngine {
    PortfolioEngine::new(config).unwrap()
  }

  #[test]
  fn default_config_is_valid() {
    let config = PortfolioEngineConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.risk_free_rate, 0.02);
    assert_eq!(config.snap_threshold, 1e-4);
    assert_eq!(
      config.effective_objective(),
      Objective::MaxSharpe {
        risk_free_rate: 0.02
      }
    );
  }

  #[test]
  fn invalid_config_is_rejected() {
    let bad = [
      PortfolioEngineConfig::default().with_risk_free_rate(f64::NAN),
      PortfolioEngineConfig::default().with_bounds(WeightBounds::Global(0.6, 0.2)),
      PortfolioEngineConfig {
        snap_threshold: -1.0,
        ..Default::default()
      },
      PortfolioEngineConfig {
        max_iterations: 0,
        ..Default::default()
      },
    ];
    for config in bad {
      assert!(matches!(
        PortfolioEngine::new(config),
        Err(PortfolioError::InvalidConfig(_))
      ));
    }
  }

  #[traced_test]
  #[test]
  fn pipeline_produces_clean_weights() {
    let prices = synthetic_prices(120);
    let result = engine(PortfolioEngineConfig::default())
      .optimize(&prices, &[])
      .unwrap();

    assert_eq!(result.weights.tickers(), prices.tickers());
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-6);
    assert!(result
      .weights
      .as_slice()
      .iter()
      .all(|&w| w == 0.0 || (0.99e-4..=1.0 + 1e-12).contains(&w)));
    assert!(result.performance.volatility > 0.0);
    assert!(logs_contain("portfolio optimized"));
  }

  #[test]
  fn free_function_matches_engine() {
    let prices = synthetic_prices(90);
    let config = PortfolioEngineConfig::default().with_objective(Objective::MinVolatility);
    let (weights, model) = optimize(&prices, &[], &config).unwrap();
    let result = engine(config).optimize(&prices, &[]).unwrap();

    assert_eq!(weights, result.weights);
    assert_eq!(model.tickers(), result.risk_model.tickers());
  }

  #[test]
  fn forecast_overrides_expected_return() {
    let prices = synthetic_prices(90);
    let last = prices.last_price("BND").unwrap();
    let path = (0..126).map(|i| last * (1.0 + 0.3 * i as f64 / 125.0)).collect();
    let forecast = ForecastSeries::new("BND".into(), path);
    let (_, model) = optimize(&prices, &[forecast.clone()], &Default::default()).unwrap();

    assert_abs_diff_eq!(
      model.expected_return("BND").unwrap(),
      forecast_annual_return(&forecast, last).unwrap(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn per_ticker_caps_hold_after_cleaning() {
    let prices = synthetic_prices(120);
    let caps = BTreeMap::from([("TSLA".to_string(), (0.0, 0.3))]);
    let config = PortfolioEngineConfig::default().with_bounds(WeightBounds::PerTicker(caps));
    let result = engine(config).optimize(&prices, &[]).unwrap();

    assert!(result.weights.get("TSLA").unwrap() <= 0.3 + 1e-9);
    assert_abs_diff_eq!(result.weights.sum(), 1.0, epsilon = 1e-6);
  }

  #[test]
  fn sweep_keeps_order_and_matches_sequential_runs() {
    let prices = synthetic_prices(120);
    let engine = engine(PortfolioEngineConfig::default());
    let model = engine.estimate(&prices, &[]).unwrap();
    let objectives = [
      Objective::MinVolatility,
      Objective::MaxSharpe {
        risk_free_rate: 0.0,
      },
      Objective::MaxSharpe {
        risk_free_rate: 0.02,
      },
    ];

    let results = engine.sweep(&model, &objectives);
    assert_eq!(results.len(), objectives.len());
    for (objective, result) in objectives.iter().zip(&results) {
      let result = result.as_ref().unwrap();
      assert_eq!(result.objective, *objective);
      let sequential = engine.run(&model, *objective).unwrap();
      assert_eq!(result.weights, sequential.weights);
    }

    let min_vol = results[0].as_ref().unwrap();
    assert!(results[1..]
      .iter()
      .all(|r| r.as_ref().unwrap().performance.volatility >= min_vol.performance.volatility * (1.0 - 1e-4)));
  }

  #[test]
  fn optimized_weights_backtest_against_benchmark() {
    let prices = synthetic_prices(120);
    let engine = engine(PortfolioEngineConfig::default());
    let result = engine.optimize(&prices, &[]).unwrap();
    let returns = simple_returns(&prices).unwrap();
    let benchmark = WeightVector::from_pairs([("TSLA", 0.0), ("BND", 0.4), ("SPY", 0.6)]).unwrap();

    let cmp = engine.compare(&returns, &result.weights, &benchmark).unwrap();
    assert_eq!(cmp.strategy, engine.backtest(&returns, &result.weights).unwrap());
    assert_eq!(cmp.strategy.periods, 119);
    assert!(cmp.strategy.max_drawdown <= 0.0);
  }
}
