//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Price/return matrices, forecasts, risk models, weight vectors and optimizer objectives.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::PortfolioError;
use crate::error::Result;

/// Relative tolerance used when checking covariance symmetry.
const SYMMETRY_TOL: f64 = 1e-10;

fn ensure_unique(tickers: &[String]) -> Result<()> {
  let mut seen = HashSet::with_capacity(tickers.len());
  for t in tickers {
    if !seen.insert(t.as_str()) {
      return Err(PortfolioError::DuplicateTicker(t.clone()));
    }
  }
  Ok(())
}

fn ensure_increasing(dates: &[NaiveDate]) -> Result<()> {
  for (row, pair) in dates.windows(2).enumerate() {
    if pair[1] <= pair[0] {
      return Err(PortfolioError::UnorderedDates { row: row + 1 });
    }
  }
  Ok(())
}

/// Adjusted close prices, rows are dates and columns are tickers.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceMatrix {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl PriceMatrix {
  /// Build a price matrix, rejecting non-positive or non-finite prices.
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, values: Array2<f64>) -> Result<Self> {
    let expected = (dates.len(), tickers.len());
    if values.dim() != expected {
      return Err(PortfolioError::ShapeMismatch {
        expected,
        actual: values.dim(),
      });
    }
    ensure_unique(&tickers)?;
    ensure_increasing(&dates)?;

    for ((row, col), &value) in values.indexed_iter() {
      if !value.is_finite() || value <= 0.0 {
        return Err(PortfolioError::InvalidPrice {
          ticker: tickers[col].clone(),
          row,
          value,
        });
      }
    }

    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn nrows(&self) -> usize {
    self.values.nrows()
  }

  pub fn ncols(&self) -> usize {
    self.values.ncols()
  }

  pub fn column_index(&self, ticker: &str) -> Option<usize> {
    self.tickers.iter().position(|t| t == ticker)
  }

  /// Last observed price of `ticker`.
  pub fn last_price(&self, ticker: &str) -> Result<f64> {
    let col = self
      .column_index(ticker)
      .ok_or_else(|| PortfolioError::UnknownTicker(ticker.to_string()))?;
    let last = self
      .nrows()
      .checked_sub(1)
      .ok_or(PortfolioError::InsufficientData {
        required: 1,
        actual: 0,
      })?;
    Ok(self.values[[last, col]])
  }
}

/// Simple one-period returns, rows are dates (first price date dropped).
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnMatrix {
  dates: Vec<NaiveDate>,
  tickers: Vec<String>,
  values: Array2<f64>,
}

impl ReturnMatrix {
  pub fn new(dates: Vec<NaiveDate>, tickers: Vec<String>, values: Array2<f64>) -> Result<Self> {
    let expected = (dates.len(), tickers.len());
    if values.dim() != expected {
      return Err(PortfolioError::ShapeMismatch {
        expected,
        actual: values.dim(),
      });
    }
    ensure_unique(&tickers)?;
    ensure_increasing(&dates)?;

    if let Some(((row, col), &value)) = values.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(PortfolioError::InvalidPrice {
        ticker: tickers[col].clone(),
        row,
        value,
      });
    }

    Ok(Self {
      dates,
      tickers,
      values,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn nrows(&self) -> usize {
    self.values.nrows()
  }

  pub fn ncols(&self) -> usize {
    self.values.ncols()
  }
}

/// Projected prices for a single ticker over a future horizon.
///
/// The first point anchors the forecast to the present, the last point is the horizon price.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct ForecastSeries {
  pub ticker: String,
  pub values: Vec<f64>,
}

impl ForecastSeries {
  /// Number of periods the forecast spans.
  pub fn horizon_length(&self) -> usize {
    self.values.len()
  }

  pub fn horizon_price(&self) -> Option<f64> {
    self.values.last().copied()
  }

  pub fn anchor_price(&self) -> Option<f64> {
    self.values.first().copied()
  }
}

/// Annualized expected returns and covariance over a common ticker axis.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskModel {
  tickers: Vec<String>,
  expected_returns: Array1<f64>,
  covariance: Array2<f64>,
}

impl RiskModel {
  /// Build a risk model, checking shapes, symmetry and the covariance diagonal.
  pub fn new(
    tickers: Vec<String>,
    expected_returns: Array1<f64>,
    covariance: Array2<f64>,
  ) -> Result<Self> {
    let n = tickers.len();
    if expected_returns.len() != n {
      return Err(PortfolioError::ShapeMismatch {
        expected: (n, 1),
        actual: (expected_returns.len(), 1),
      });
    }
    if covariance.dim() != (n, n) {
      return Err(PortfolioError::ShapeMismatch {
        expected: (n, n),
        actual: covariance.dim(),
      });
    }
    ensure_unique(&tickers)?;

    if expected_returns.iter().any(|v| !v.is_finite()) || covariance.iter().any(|v| !v.is_finite())
    {
      return Err(PortfolioError::InvalidConfig(
        "risk model contains non-finite values".into(),
      ));
    }

    let scale = covariance.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    for i in 0..n {
      if covariance[[i, i]] < 0.0 {
        return Err(PortfolioError::InvalidConfig(format!(
          "negative variance for `{}`",
          tickers[i]
        )));
      }
      for j in (i + 1)..n {
        if (covariance[[i, j]] - covariance[[j, i]]).abs() > SYMMETRY_TOL * scale {
          return Err(PortfolioError::InvalidConfig(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    Ok(Self {
      tickers,
      expected_returns,
      covariance,
    })
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn expected_returns(&self) -> &Array1<f64> {
    &self.expected_returns
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  pub fn len(&self) -> usize {
    self.tickers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tickers.is_empty()
  }

  pub fn expected_return(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .position(|t| t == ticker)
      .map(|i| self.expected_returns[i])
  }
}

/// Ordered ticker -> weight mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector {
  tickers: Vec<String>,
  weights: Vec<f64>,
}

impl WeightVector {
  pub fn new(tickers: Vec<String>, weights: Vec<f64>) -> Result<Self> {
    if tickers.len() != weights.len() {
      return Err(PortfolioError::ShapeMismatch {
        expected: (tickers.len(), 1),
        actual: (weights.len(), 1),
      });
    }
    ensure_unique(&tickers)?;
    Ok(Self { tickers, weights })
  }

  /// Build from `(ticker, weight)` pairs, keeping their order.
  pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
  where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
  {
    let (tickers, weights): (Vec<String>, Vec<f64>) =
      pairs.into_iter().map(|(t, w)| (t.into(), w)).unzip();
    Self::new(tickers, weights)
  }

  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  pub fn as_slice(&self) -> &[f64] {
    &self.weights
  }

  pub fn len(&self) -> usize {
    self.weights.len()
  }

  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  pub fn get(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .position(|t| t == ticker)
      .map(|i| self.weights[i])
  }

  pub fn sum(&self) -> f64 {
    self.weights.iter().sum()
  }

  /// Weights reordered to `tickers`; the two ticker sets must be identical.
  pub fn aligned_to(&self, tickers: &[String]) -> Result<Array1<f64>> {
    let missing: Vec<String> = tickers
      .iter()
      .filter(|t| !self.tickers.contains(*t))
      .cloned()
      .collect();
    let unexpected: Vec<String> = self
      .tickers
      .iter()
      .filter(|t| !tickers.contains(*t))
      .cloned()
      .collect();
    if !missing.is_empty() || !unexpected.is_empty() || tickers.len() != self.len() {
      return Err(PortfolioError::TickerMismatch {
        missing,
        unexpected,
      });
    }

    Ok(
      tickers
        .iter()
        .filter_map(|t| self.get(t))
        .collect::<Array1<f64>>(),
    )
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .tickers
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }
}

impl Display for WeightVector {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for (i, (ticker, w)) in self.iter().enumerate() {
      if i > 0 {
        write!(f, ", ")?;
      }
      write!(f, "{ticker}: {w:.5}")?;
    }
    Ok(())
  }
}

/// Box constraints on individual weights.
#[derive(Clone, Debug, PartialEq)]
pub enum WeightBounds {
  /// Same `(lower, upper)` pair for every ticker.
  Global(f64, f64),
  /// Per-ticker pairs; tickers not listed fall back to `(0, 1)`.
  PerTicker(BTreeMap<String, (f64, f64)>),
}

impl Default for WeightBounds {
  fn default() -> Self {
    Self::Global(0.0, 1.0)
  }
}

impl WeightBounds {
  /// Expand into lower/upper vectors aligned with `tickers`.
  pub fn resolve(&self, tickers: &[String]) -> Result<(Vec<f64>, Vec<f64>)> {
    let (lower, upper): (Vec<f64>, Vec<f64>) = match self {
      Self::Global(lo, hi) => (vec![*lo; tickers.len()], vec![*hi; tickers.len()]),
      Self::PerTicker(map) => {
        if let Some(unknown) = map.keys().find(|k| !tickers.contains(*k)) {
          return Err(PortfolioError::UnknownTicker(unknown.clone()));
        }
        tickers
          .iter()
          .map(|t| map.get(t).copied().unwrap_or((0.0, 1.0)))
          .unzip()
      }
    };

    if lower.iter().chain(upper.iter()).any(|b| !b.is_finite()) {
      return Err(PortfolioError::InvalidConfig(
        "weight bounds must be finite".into(),
      ));
    }

    Ok((lower, upper))
  }
}

/// Optimization objective.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Objective {
  /// Tangency portfolio: maximize `(w'mu - r_f) / sqrt(w'Sigma w)`.
  MaxSharpe { risk_free_rate: f64 },
  /// Global minimum-variance portfolio within the bounds.
  MinVolatility,
}

impl Default for Objective {
  fn default() -> Self {
    Self::MaxSharpe {
      risk_free_rate: 0.02,
    }
  }
}

impl Objective {
  pub fn name(&self) -> &'static str {
    match self {
      Self::MaxSharpe { .. } => "max_sharpe",
      Self::MinVolatility => "min_volatility",
    }
  }

  /// Replace the risk-free rate of a [`Objective::MaxSharpe`] objective.
  pub fn with_risk_free_rate(self, risk_free_rate: f64) -> Self {
    match self {
      Self::MaxSharpe { .. } => Self::MaxSharpe { risk_free_rate },
      Self::MinVolatility => Self::MinVolatility,
    }
  }
}

impl FromStr for Objective {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().replace('-', "_").as_str() {
      "max_sharpe" | "maxsharpe" | "sharpe" => Ok(Self::default()),
      "min_volatility" | "minvolatility" | "min_vol" | "minvol" => Ok(Self::MinVolatility),
      other => Err(PortfolioError::InvalidConfig(format!(
        "unknown objective `{other}`"
      ))),
    }
  }
}

impl Display for Objective {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}

/// Model-implied performance of a weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioPerformance {
  /// Expected annual return `w'mu`.
  pub expected_return: f64,
  /// Annual volatility `sqrt(w'Sigma w)`.
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`.
  pub sharpe: f64,
}

/// Output of an optimization run.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioResult {
  pub objective: Objective,
  /// Clean weights.
  pub weights: WeightVector,
  pub risk_model: RiskModel,
  pub performance: PortfolioPerformance,
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  fn dates(n: usize) -> Vec<NaiveDate> {
    (0..n)
      .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap())
      .collect()
  }

  #[test]
  fn price_matrix_rejects_non_positive_prices() {
    let err = PriceMatrix::new(
      dates(2),
      vec!["A".into(), "B".into()],
      array![[1.0, 2.0], [1.5, 0.0]],
    )
    .unwrap_err();

    assert_eq!(
      err,
      PortfolioError::InvalidPrice {
        ticker: "B".into(),
        row: 1,
        value: 0.0,
      }
    );
  }

  #[test]
  fn price_matrix_rejects_unordered_dates() {
    let mut d = dates(3);
    d.swap(1, 2);
    let err = PriceMatrix::new(d, vec!["A".into()], array![[1.0], [1.1], [1.2]]).unwrap_err();
    assert_eq!(err, PortfolioError::UnorderedDates { row: 1 });
  }

  #[test]
  fn price_matrix_rejects_duplicate_tickers() {
    let err = PriceMatrix::new(
      dates(1),
      vec!["A".into(), "A".into()],
      array![[1.0, 2.0]],
    )
    .unwrap_err();
    assert_eq!(err, PortfolioError::DuplicateTicker("A".into()));
  }

  #[test]
  fn last_price_reads_final_row() {
    let prices = PriceMatrix::new(
      dates(3),
      vec!["A".into(), "B".into()],
      array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]],
    )
    .unwrap();
    assert_eq!(prices.last_price("B").unwrap(), 30.0);
    assert!(matches!(
      prices.last_price("Z"),
      Err(PortfolioError::UnknownTicker(_))
    ));
  }

  #[test]
  fn risk_model_rejects_asymmetric_covariance() {
    let err = RiskModel::new(
      vec!["A".into(), "B".into()],
      array![0.1, 0.2],
      array![[0.04, 0.01], [0.02, 0.09]],
    )
    .unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidConfig(_)));
  }

  #[test]
  fn per_ticker_bounds_fall_back_to_long_only() {
    let mut map = BTreeMap::new();
    map.insert("B".to_string(), (0.1, 0.5));
    let (lo, hi) = WeightBounds::PerTicker(map)
      .resolve(&["A".into(), "B".into()])
      .unwrap();
    assert_eq!(lo, vec![0.0, 0.1]);
    assert_eq!(hi, vec![1.0, 0.5]);
  }

  #[test]
  fn per_ticker_bounds_reject_unknown_tickers() {
    let mut map = BTreeMap::new();
    map.insert("Z".to_string(), (0.0, 0.5));
    assert_eq!(
      WeightBounds::PerTicker(map).resolve(&["A".into()]),
      Err(PortfolioError::UnknownTicker("Z".into()))
    );
  }

  #[test]
  fn objective_parses_common_spellings() {
    assert_eq!(
      "max-sharpe".parse::<Objective>().unwrap(),
      Objective::MaxSharpe {
        risk_free_rate: 0.02
      }
    );
    assert_eq!(
      "min_volatility".parse::<Objective>().unwrap(),
      Objective::MinVolatility
    );
    assert!("efficient_risk".parse::<Objective>().is_err());
  }

  #[test]
  fn forecast_series_exposes_anchor_and_horizon() {
    let f = ForecastSeries::new("X".to_string(), vec![200.0, 230.0, 260.0]);
    assert_eq!(f.anchor_price(), Some(200.0));
    assert_eq!(f.horizon_price(), Some(260.0));
    assert_eq!(f.horizon_length(), 3);
  }
}
