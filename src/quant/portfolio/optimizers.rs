//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}}\ \mathbf{w}^\top\Sigma\mathbf{w}\quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\ \ell\le\mathbf w\le u
//! $$
//!
//! Long-only (or box-bounded) mean-variance optimizers solved as convex QPs.
//!
//! The tangency portfolio uses the homogenised form
//! $\min_y y^\top\Sigma y$ s.t. $(\mu-r_f)^\top y=1$, $\ell_i\,\mathbf 1^\top y\le y_i\le u_i\,\mathbf 1^\top y$,
//! and recovers $w=y/\mathbf 1^\top y$.

use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use ndarray::Array2;
use tracing::debug;

use super::qp::QuadraticProgram;
use super::types::Objective;
use super::types::PortfolioPerformance;
use super::types::RiskModel;
use super::types::WeightBounds;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Bound slack tolerated when checking feasibility.
const FEASIBILITY_TOL: f64 = 1e-12;

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
  DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

/// Ratio of the largest to the smallest eigenvalue of a symmetric matrix.
///
/// Returns `f64::INFINITY` when the smallest eigenvalue is not strictly positive.
pub fn condition_number(cov: &Array2<f64>) -> f64 {
  if cov.is_empty() {
    return 1.0;
  }

  let eigen = SymmetricEigen::new(to_dmatrix(cov));
  let max = eigen.eigenvalues.max();
  let min = eigen.eigenvalues.min();

  if min <= 0.0 || max <= 0.0 {
    f64::INFINITY
  } else {
    max / min
  }
}

/// Reject singular or near-singular covariance matrices.
pub fn check_conditioning(cov: &Array2<f64>, threshold: f64) -> Result<f64> {
  let condition_number = condition_number(cov);
  if !condition_number.is_finite() || condition_number > threshold {
    return Err(PortfolioError::IllConditionedCovariance { condition_number });
  }
  Ok(condition_number)
}

/// Check that `lower <= w <= upper` and `sum(w) = 1` admit at least one portfolio.
pub fn check_feasible_bounds(lower: &[f64], upper: &[f64]) -> Result<()> {
  if lower.len() != upper.len() {
    return Err(PortfolioError::ShapeMismatch {
      expected: (lower.len(), 1),
      actual: (upper.len(), 1),
    });
  }
  if let Some(i) = (0..lower.len()).find(|&i| lower[i] > upper[i]) {
    return Err(PortfolioError::InfeasibleConstraints(format!(
      "lower bound {} exceeds upper bound {} for asset {i}",
      lower[i], upper[i]
    )));
  }

  let sum_lower: f64 = lower.iter().sum();
  let sum_upper: f64 = upper.iter().sum();
  if sum_lower > 1.0 + FEASIBILITY_TOL {
    return Err(PortfolioError::InfeasibleConstraints(format!(
      "lower bounds sum to {sum_lower} > 1"
    )));
  }
  if sum_upper < 1.0 - FEASIBILITY_TOL {
    return Err(PortfolioError::InfeasibleConstraints(format!(
      "upper bounds sum to {sum_upper} < 1"
    )));
  }
  Ok(())
}

/// Start at the lower bounds and hand the remaining budget out in `order`.
fn greedy_fill(lower: &[f64], upper: &[f64], order: &[usize]) -> Vec<f64> {
  let mut w = lower.to_vec();
  let mut remaining = 1.0 - lower.iter().sum::<f64>();
  for &i in order {
    if remaining <= 0.0 {
      break;
    }
    let add = remaining.min(upper[i] - lower[i]);
    w[i] += add;
    remaining -= add;
  }
  w
}

/// `[-I; I]` box rows and `[-lower; upper]` right-hand side.
fn box_constraints(lower: &[f64], upper: &[f64]) -> (Array2<f64>, Vec<f64>) {
  let n = lower.len();
  let mut g = Array2::<f64>::zeros((2 * n, n));
  for i in 0..n {
    g[[i, i]] = -1.0;
    g[[n + i, i]] = 1.0;
  }
  let h = lower.iter().map(|l| -l).chain(upper.iter().copied()).collect();
  (g, h)
}

/// Minimum-variance weights within `[lower, upper]`.
pub fn optimize_min_volatility(
  model: &RiskModel,
  lower: &[f64],
  upper: &[f64],
  max_iterations: usize,
) -> Result<WeightVector> {
  let n = model.len();
  check_feasible_bounds(lower, upper)?;

  let (g, h) = box_constraints(lower, upper);
  let qp = QuadraticProgram {
    p: model.covariance() * 2.0,
    a_eq: Array2::ones((1, n)),
    b_eq: vec![1.0],
    g,
    h,
  };
  let sol = qp.solve(max_iterations)?;
  debug!(iterations = sol.iterations, "min volatility solved");

  WeightVector::new(model.tickers().to_vec(), sol.x)
}

/// Maximum-Sharpe (tangency) weights within `[lower, upper]`.
pub fn optimize_max_sharpe(
  model: &RiskModel,
  risk_free_rate: f64,
  lower: &[f64],
  upper: &[f64],
  max_iterations: usize,
) -> Result<WeightVector> {
  let n = model.len();
  check_feasible_bounds(lower, upper)?;

  let excess: Vec<f64> = model
    .expected_returns()
    .iter()
    .map(|mu| mu - risk_free_rate)
    .collect();

  // the bounded portfolio with the largest excess return
  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by(|&a, &b| excess[b].total_cmp(&excess[a]).then(a.cmp(&b)));
  let best: f64 = greedy_fill(lower, upper, &order)
    .iter()
    .zip(excess.iter())
    .map(|(w, e)| w * e)
    .sum();
  if best <= FEASIBILITY_TOL {
    return Err(PortfolioError::NoExcessReturn { risk_free_rate });
  }

  // rows: lo_i * sum(y) - y_i <= 0, y_i - hi_i * sum(y) <= 0, -sum(y) <= 0
  let mut g = Array2::<f64>::zeros((2 * n + 1, n));
  for i in 0..n {
    for j in 0..n {
      g[[i, j]] = lower[i];
      g[[n + i, j]] = -upper[i];
    }
    g[[i, i]] -= 1.0;
    g[[n + i, i]] += 1.0;
    g[[2 * n, i]] = -1.0;
  }

  let qp = QuadraticProgram {
    p: model.covariance() * 2.0,
    a_eq: Array2::from_shape_vec((1, n), excess)
      .map_err(|e| PortfolioError::InvalidConfig(e.to_string()))?,
    b_eq: vec![1.0],
    g,
    h: vec![0.0; 2 * n + 1],
  };
  let sol = qp.solve(max_iterations)?;

  let kappa: f64 = sol.x.iter().sum();
  if kappa <= FEASIBILITY_TOL {
    return Err(PortfolioError::DegenerateAllocation(
      "tangency solution has no net exposure".into(),
    ));
  }
  debug!(iterations = sol.iterations, kappa, "max sharpe solved");

  WeightVector::new(
    model.tickers().to_vec(),
    sol.x.iter().map(|y| y / kappa).collect(),
  )
}

/// Model-implied annual return, volatility and Sharpe ratio of `weights`.
pub fn portfolio_performance(
  weights: &WeightVector,
  model: &RiskModel,
  risk_free_rate: f64,
) -> Result<PortfolioPerformance> {
  let w = weights.aligned_to(model.tickers())?;
  let expected_return = w.dot(model.expected_returns());
  let variance = w.dot(&model.covariance().dot(&w));
  let volatility = variance.max(0.0).sqrt();
  if volatility <= 1e-15 {
    return Err(PortfolioError::ZeroVolatility);
  }

  Ok(PortfolioPerformance {
    expected_return,
    volatility,
    sharpe: (expected_return - risk_free_rate) / volatility,
  })
}

/// Bounded mean-variance optimizer for a fixed [`Objective`].
#[derive(Clone, Debug)]
pub struct PortfolioOptimizer {
  pub objective: Objective,
  pub bounds: WeightBounds,
  /// Largest accepted covariance condition number.
  pub condition_threshold: f64,
  /// Iteration cap of the QP solver.
  pub max_iterations: usize,
}

impl Default for PortfolioOptimizer {
  fn default() -> Self {
    Self {
      objective: Objective::default(),
      bounds: WeightBounds::default(),
      condition_threshold: 1e10,
      max_iterations: 500,
    }
  }
}

impl PortfolioOptimizer {
  pub fn new(objective: Objective, bounds: WeightBounds) -> Self {
    Self {
      objective,
      bounds,
      ..Self::default()
    }
  }

  /// Raw (unsanitized) weights for `model`.
  pub fn solve(&self, model: &RiskModel) -> Result<WeightVector> {
    if model.is_empty() {
      return Err(PortfolioError::InsufficientData {
        required: 1,
        actual: 0,
      });
    }

    let (lower, upper) = self.bounds.resolve(model.tickers())?;
    check_feasible_bounds(&lower, &upper)?;
    let condition_number = check_conditioning(model.covariance(), self.condition_threshold)?;
    debug!(
      objective = %self.objective,
      assets = model.len(),
      condition_number,
      "optimizing portfolio"
    );

    match self.objective {
      Objective::MaxSharpe { risk_free_rate } => {
        optimize_max_sharpe(model, risk_free_rate, &lower, &upper, self.max_iterations)
      }
      Objective::MinVolatility => {
        optimize_min_volatility(model, &lower, &upper, self.max_iterations)
      }
    }
  }
}
