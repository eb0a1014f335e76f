//! # Backtest
//!
//! $$
//! V_t=\prod_{s\le t}(1+\mathbf w^\top r_s),\qquad
//! \mathrm{MDD}=\min_t \frac{V_t-\max_{s\le t}V_s}{\max_{s\le t}V_s}
//! $$
//!
//! Static buy-and-hold evaluation of a weight vector over a historical return window.

use std::fmt::Display;

use ndarray::Array1;
use prettytable::row;
use prettytable::Table;
use tracing::debug;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::quant::portfolio::ReturnMatrix;
use crate::quant::portfolio::WeightVector;
use crate::quant::TRADING_DAYS;

/// Annual risk-free rate used when none is supplied.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Allowed deviation of the weight sum from 1.
const WEIGHT_SUM_TOL: f64 = 1e-6;

/// Relative standard-deviation floor below which returns are treated as riskless.
const ZERO_VOL_TOL: f64 = 1e-12;

/// Daily portfolio returns `sum_i r[t, i] * w_i`.
///
/// The weight tickers must equal the return columns and the weights must sum to 1.
pub fn portfolio_returns(returns: &ReturnMatrix, weights: &WeightVector) -> Result<Array1<f64>> {
  let w = weights.aligned_to(returns.tickers())?;
  let sum = w.sum();
  if (sum - 1.0).abs() > WEIGHT_SUM_TOL {
    return Err(PortfolioError::UnnormalizedWeights { sum });
  }
  Ok(returns.values().dot(&w))
}

/// Growth of one unit invested at the start of the window.
pub fn cumulative_returns(returns: &[f64]) -> Array1<f64> {
  returns
    .iter()
    .scan(1.0, |acc, r| {
      *acc *= 1.0 + r;
      Some(*acc)
    })
    .collect()
}

/// Final cumulative value minus one.
pub fn total_return(cumulative: &[f64]) -> f64 {
  cumulative.last().map_or(0.0, |v| v - 1.0)
}

/// Compound `total_return` realized over `periods` trading days into an annual rate.
pub fn annualized_return(total_return: f64, periods: usize) -> f64 {
  (1.0 + total_return).powf(TRADING_DAYS / periods as f64) - 1.0
}

/// Lazily computed drawdown from the running peak.
#[derive(Clone, Debug)]
pub struct DrawdownIter<'a> {
  cumulative: std::slice::Iter<'a, f64>,
  peak: f64,
}

impl Iterator for DrawdownIter<'_> {
  type Item = f64;

  fn next(&mut self) -> Option<f64> {
    let &value = self.cumulative.next()?;
    self.peak = self.peak.max(value);
    Some((value - self.peak) / self.peak)
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.cumulative.size_hint()
  }
}

impl ExactSizeIterator for DrawdownIter<'_> {}

/// Drawdown curve of a cumulative growth series.
pub fn drawdown_curve(cumulative: &[f64]) -> DrawdownIter<'_> {
  DrawdownIter {
    cumulative: cumulative.iter(),
    peak: f64::NEG_INFINITY,
  }
}

/// Deepest drawdown, always `<= 0`.
pub fn max_drawdown(cumulative: &[f64]) -> f64 {
  drawdown_curve(cumulative).fold(0.0, f64::min)
}

/// `(annualized_return - risk_free_rate) / (std(returns) * sqrt(252))`.
///
/// A sample standard deviation below `1e-12 * (1 + mean |r|)` counts as zero volatility.
pub fn sharpe_ratio(returns: &[f64], annualized_return: f64, risk_free_rate: f64) -> Result<f64> {
  if returns.len() < 2 {
    return Err(PortfolioError::InsufficientData {
      required: 2,
      actual: returns.len(),
    });
  }
  let series = Array1::from(returns.to_vec());
  let std = series.std(1.0);
  let scale = 1.0 + series.mapv(f64::abs).mean().unwrap_or(0.0);
  if std <= ZERO_VOL_TOL * scale {
    return Err(PortfolioError::ZeroVolatility);
  }
  Ok((annualized_return - risk_free_rate) / (std * TRADING_DAYS.sqrt()))
}

/// Realized performance of a portfolio return series.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerformanceReport {
  pub total_return: f64,
  pub annualized_return: f64,
  pub sharpe_ratio: f64,
  pub max_drawdown: f64,
  /// Number of return periods evaluated.
  pub periods: usize,
}

impl PerformanceReport {
  /// Evaluate an already aggregated portfolio return series.
  pub fn from_returns(returns: &[f64], risk_free_rate: f64) -> Result<Self> {
    if returns.is_empty() {
      return Err(PortfolioError::InsufficientData {
        required: 1,
        actual: 0,
      });
    }

    let cumulative = cumulative_returns(returns);
    let cumulative = cumulative.as_slice().unwrap_or_default();
    let total_return = total_return(cumulative);
    let annualized_return = annualized_return(total_return, returns.len());
    let sharpe_ratio = sharpe_ratio(returns, annualized_return, risk_free_rate)?;

    Ok(Self {
      total_return,
      annualized_return,
      sharpe_ratio,
      max_drawdown: max_drawdown(cumulative),
      periods: returns.len(),
    })
  }

  pub fn to_table(&self) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Metric", "Value"]);
    table.add_row(row!["Total Return", format!("{:.2}%", self.total_return * 100.0)]);
    table.add_row(row![
      "Annualized Return",
      format!("{:.2}%", self.annualized_return * 100.0)
    ]);
    table.add_row(row!["Sharpe Ratio", format!("{:.2}", self.sharpe_ratio)]);
    table.add_row(row!["Max Drawdown", format!("{:.2}%", self.max_drawdown * 100.0)]);
    table
  }
}

impl Display for PerformanceReport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    writeln!(f, "Total Return: {:.2}%", self.total_return * 100.0)?;
    writeln!(f, "Annualized Return: {:.2}%", self.annualized_return * 100.0)?;
    writeln!(f, "Sharpe Ratio: {:.2}", self.sharpe_ratio)?;
    write!(f, "Max Drawdown: {:.2}%", self.max_drawdown * 100.0)
  }
}

/// Evaluate static `weights` over `returns`.
pub fn backtest(
  returns: &ReturnMatrix,
  weights: &WeightVector,
  risk_free_rate: f64,
) -> Result<PerformanceReport> {
  let daily = portfolio_returns(returns, weights)?;
  let report = PerformanceReport::from_returns(daily.as_slice().unwrap_or_default(), risk_free_rate)?;
  debug!(
    periods = report.periods,
    total_return = report.total_return,
    sharpe = report.sharpe_ratio,
    max_drawdown = report.max_drawdown,
    "backtest finished"
  );
  Ok(report)
}

/// Strategy versus benchmark on the same return window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BacktestComparison {
  pub strategy: PerformanceReport,
  pub benchmark: PerformanceReport,
}

impl BacktestComparison {
  /// Whether the strategy earned a higher total return than the benchmark.
  pub fn outperformed(&self) -> bool {
    self.strategy.total_return > self.benchmark.total_return
  }

  pub fn excess_total_return(&self) -> f64 {
    self.strategy.total_return - self.benchmark.total_return
  }

  pub fn excess_annualized_return(&self) -> f64 {
    self.strategy.annualized_return - self.benchmark.annualized_return
  }

  pub fn excess_sharpe(&self) -> f64 {
    self.strategy.sharpe_ratio - self.benchmark.sharpe_ratio
  }

  pub fn to_table(&self) -> Table {
    let pct = |x: f64| format!("{:.2}%", x * 100.0);
    let (s, b) = (&self.strategy, &self.benchmark);

    let mut table = Table::new();
    table.add_row(row!["Metric", "Strategy", "Benchmark", "Difference"]);
    table.add_row(row![
      "Total Return",
      pct(s.total_return),
      pct(b.total_return),
      pct(self.excess_total_return())
    ]);
    table.add_row(row![
      "Annualized Return",
      pct(s.annualized_return),
      pct(b.annualized_return),
      pct(self.excess_annualized_return())
    ]);
    table.add_row(row![
      "Sharpe Ratio",
      format!("{:.2}", s.sharpe_ratio),
      format!("{:.2}", b.sharpe_ratio),
      format!("{:.2}", self.excess_sharpe())
    ]);
    table.add_row(row![
      "Max Drawdown",
      pct(s.max_drawdown),
      pct(b.max_drawdown),
      pct(s.max_drawdown - b.max_drawdown)
    ]);
    table
  }
}

/// Backtest `strategy` and `benchmark` on the same returns.
pub fn compare(
  returns: &ReturnMatrix,
  strategy: &WeightVector,
  benchmark: &WeightVector,
  risk_free_rate: f64,
) -> Result<BacktestComparison> {
  Ok(BacktestComparison {
    strategy: backtest(returns, strategy, risk_free_rate)?,
    benchmark: backtest(returns, benchmark, risk_free_rate)?,
  })
}
