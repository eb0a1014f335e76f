//! # Errors
//!
//! $$
//! \text{Result}:\ \text{inputs}\to \mathbf{w}\ \text{or}\ \text{PortfolioError}
//! $$
//!
//! Every failure of the allocation pipeline is one of the variants below. None of them is
//! retried internally and none of them carries a partially computed result.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;

/// Coarse classification of a [`PortfolioError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
  /// The caller supplied data that violates an input contract.
  InputValidity,
  /// The inputs are well formed but the problem has no well-defined answer.
  NumericalDegeneracy,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PortfolioError {
  #[error("insufficient data: need at least {required} rows, got {actual}")]
  InsufficientData { required: usize, actual: usize },

  #[error("unknown ticker `{0}`")]
  UnknownTicker(String),

  #[error("forecast for `{ticker}` has {points} point(s), need at least 2")]
  EmptyForecast { ticker: String, points: usize },

  #[error("forecast for `{ticker}` has invalid value {value} at position {index}")]
  InvalidForecast {
    ticker: String,
    index: usize,
    value: f64,
  },

  #[error("ticker set mismatch: missing {missing:?}, unexpected {unexpected:?}")]
  TickerMismatch {
    missing: Vec<String>,
    unexpected: Vec<String>,
  },

  #[error("invalid price {value} for `{ticker}` at row {row}")]
  InvalidPrice {
    ticker: String,
    row: usize,
    value: f64,
  },

  #[error("duplicate ticker `{0}`")]
  DuplicateTicker(String),

  #[error("dates must be strictly increasing (row {row})")]
  UnorderedDates { row: usize },

  #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
  ShapeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },

  #[error("weights sum to {sum}, expected 1")]
  UnnormalizedWeights { sum: f64 },

  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("covariance matrix is ill-conditioned (condition number {condition_number:e})")]
  IllConditionedCovariance { condition_number: f64 },

  #[error("weight bounds admit no portfolio: {0}")]
  InfeasibleConstraints(String),

  #[error("no feasible portfolio earns more than the risk-free rate {risk_free_rate}")]
  NoExcessReturn { risk_free_rate: f64 },

  #[error("QP solver did not converge within {iterations} iterations")]
  SolverDidNotConverge { iterations: usize },

  #[error("allocation is degenerate: {0}")]
  DegenerateAllocation(String),

  #[error("portfolio returns have zero volatility")]
  ZeroVolatility,
}

impl PortfolioError {
  /// Whether the error stems from bad input or from an unsolvable problem.
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::InsufficientData { .. }
      | Self::UnknownTicker(_)
      | Self::EmptyForecast { .. }
      | Self::InvalidForecast { .. }
      | Self::TickerMismatch { .. }
      | Self::InvalidPrice { .. }
      | Self::DuplicateTicker(_)
      | Self::UnorderedDates { .. }
      | Self::ShapeMismatch { .. }
      | Self::UnnormalizedWeights { .. }
      | Self::InvalidConfig(_) => ErrorKind::InputValidity,
      Self::IllConditionedCovariance { .. }
      | Self::InfeasibleConstraints(_)
      | Self::NoExcessReturn { .. }
      | Self::SolverDidNotConverge { .. }
      | Self::DegenerateAllocation(_)
      | Self::ZeroVolatility => ErrorKind::NumericalDegeneracy,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn errors_are_categorized() {
    assert_eq!(
      PortfolioError::UnknownTicker("X".into()).kind(),
      ErrorKind::InputValidity
    );
    assert_eq!(
      PortfolioError::ZeroVolatility.kind(),
      ErrorKind::NumericalDegeneracy
    );
    assert_eq!(
      PortfolioError::InfeasibleConstraints("sum of lower bounds > 1".into()).kind(),
      ErrorKind::NumericalDegeneracy
    );
  }

  #[test]
  fn messages_name_the_offending_input() {
    let err = PortfolioError::EmptyForecast {
      ticker: "TSLA".into(),
      points: 1,
    };
    assert_eq!(
      err.to_string(),
      "forecast for `TSLA` has 1 point(s), need at least 2"
    );
  }
}
