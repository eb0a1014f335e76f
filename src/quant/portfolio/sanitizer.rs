//! # Weight Sanitizer
//!
//! $$
//! \tilde w_i=\operatorname{clip}(s\,w_i,\ell_i,u_i),\qquad \sum_i \tilde w_i = 1
//! $$
//!
//! Turns raw solver output into a reportable allocation: clip to bounds, snap dust to zero,
//! renormalize the survivors.

use tracing::debug;

use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;

/// Weights below this magnitude are set to exactly zero.
pub const DEFAULT_SNAP_THRESHOLD: f64 = 1e-4;

const BOUND_TOL: f64 = 1e-12;
const BISECTION_STEPS: usize = 200;

/// Clean raw optimizer weights against `[lower, upper]`.
#[derive(Clone, Debug)]
pub struct WeightSanitizer {
  pub lower: Vec<f64>,
  pub upper: Vec<f64>,
  pub snap_threshold: f64,
}

impl WeightSanitizer {
  pub fn new(lower: Vec<f64>, upper: Vec<f64>, snap_threshold: f64) -> Self {
    Self {
      lower,
      upper,
      snap_threshold,
    }
  }

  /// Long-only `[0, 1]` bounds for `n` assets and the default snap threshold.
  pub fn long_only(n: usize) -> Self {
    Self::new(vec![0.0; n], vec![1.0; n], DEFAULT_SNAP_THRESHOLD)
  }

  fn within_bounds(&self, w: &[f64]) -> bool {
    w.iter()
      .enumerate()
      .all(|(i, &x)| x >= self.lower[i] - BOUND_TOL && x <= self.upper[i] + BOUND_TOL)
  }

  fn scaled_sum(&self, w: &[f64], s: f64) -> f64 {
    w.iter()
      .enumerate()
      .filter(|&(_, &x)| x != 0.0)
      .map(|(i, &x)| (s * x).clamp(self.lower[i], self.upper[i]))
      .sum()
  }

  /// Find `s` with `sum clamp(s * w_i) = 1` over the surviving weights.
  fn bounded_scale(&self, w: &[f64]) -> Result<f64> {
    if w.iter().any(|&x| x < 0.0) {
      return Err(PortfolioError::DegenerateAllocation(
        "cannot renormalize mixed-sign weights within bounds".into(),
      ));
    }

    let mut hi = w
      .iter()
      .enumerate()
      .filter(|&(_, &x)| x > 0.0)
      .map(|(i, &x)| self.upper[i] / x)
      .fold(0.0_f64, f64::max);
    let mut lo = 0.0;

    if self.scaled_sum(w, lo) > 1.0 + BOUND_TOL || self.scaled_sum(w, hi) < 1.0 - BOUND_TOL {
      return Err(PortfolioError::DegenerateAllocation(
        "surviving weights cannot sum to 1 within their bounds".into(),
      ));
    }

    for _ in 0..BISECTION_STEPS {
      let mid = 0.5 * (lo + hi);
      if self.scaled_sum(w, mid) < 1.0 {
        lo = mid;
      } else {
        hi = mid;
      }
    }
    Ok(0.5 * (lo + hi))
  }

  pub fn clean(&self, raw: &WeightVector) -> Result<WeightVector> {
    let n = raw.len();
    if self.lower.len() != n || self.upper.len() != n {
      return Err(PortfolioError::ShapeMismatch {
        expected: (n, 1),
        actual: (self.lower.len().min(self.upper.len()), 1),
      });
    }
    if let Some(&bad) = raw.as_slice().iter().find(|w| !w.is_finite()) {
      return Err(PortfolioError::DegenerateAllocation(format!(
        "non-finite raw weight {bad}"
      )));
    }

    let mut snapped = 0usize;
    let w: Vec<f64> = raw
      .as_slice()
      .iter()
      .enumerate()
      .map(|(i, &x)| {
        let clipped = x.clamp(self.lower[i], self.upper[i]);
        let zero_allowed = self.lower[i] <= 0.0 && self.upper[i] >= 0.0;
        if clipped.abs() < self.snap_threshold && zero_allowed {
          if clipped != 0.0 {
            snapped += 1;
          }
          0.0
        } else {
          clipped
        }
      })
      .collect();

    let total: f64 = w.iter().sum();
    if w.iter().all(|&x| x == 0.0) || total.abs() <= f64::EPSILON {
      return Err(PortfolioError::DegenerateAllocation(
        "every weight was snapped to zero".into(),
      ));
    }

    let proportional: Vec<f64> = w.iter().map(|x| x / total).collect();
    let cleaned = if self.within_bounds(&proportional) {
      proportional
    } else {
      let s = self.bounded_scale(&w)?;
      w.iter()
        .enumerate()
        .map(|(i, &x)| {
          if x == 0.0 {
            0.0
          } else {
            (s * x).clamp(self.lower[i], self.upper[i])
          }
        })
        .collect()
    };

    if snapped > 0 {
      debug!(snapped, threshold = self.snap_threshold, "snapped dust weights to zero");
    }

    WeightVector::new(raw.tickers().to_vec(), cleaned)
  }
}

/// Clean `raw` with long-only `[0, 1]` bounds and the default snap threshold.
pub fn clean_weights(raw: &WeightVector) -> Result<WeightVector> {
  WeightSanitizer::long_only(raw.len()).clean(raw)
}
