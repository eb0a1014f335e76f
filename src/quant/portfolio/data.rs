//! # Portfolio Data Utilities
//!
//! $$
//! r_t=\frac{P_t}{P_{t-1}}-1,\qquad \hat\Sigma=\frac{1}{T-1}\sum_t (r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Helpers for return preprocessing and covariance construction.

use chrono::Datelike;
use chrono::Days;
use chrono::NaiveDate;
use chrono::Weekday;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use super::types::PriceMatrix;
use super::types::ReturnMatrix;
use crate::error::PortfolioError;
use crate::error::Result;

/// Convert close prices to simple one-period returns.
pub fn simple_returns_series(closes: &[f64]) -> Vec<f64> {
  closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Percentage-change return matrix of `prices`; the first date is dropped.
pub fn simple_returns(prices: &PriceMatrix) -> Result<ReturnMatrix> {
  let rows = prices.nrows();
  if rows < 2 {
    return Err(PortfolioError::InsufficientData {
      required: 2,
      actual: rows,
    });
  }

  let mut out = Array2::<f64>::zeros((rows - 1, prices.ncols()));
  for (mut column, series) in out
    .axis_iter_mut(Axis(1))
    .zip(prices.values().axis_iter(Axis(1)))
  {
    column.assign(&Array1::from(simple_returns_series(&series.to_vec())));
  }

  ReturnMatrix::new(
    prices.dates()[1..].to_vec(),
    prices.tickers().to_vec(),
    out,
  )
}

/// Unbiased (`ddof = 1`) sample covariance of the columns of `returns`, symmetrized.
pub fn sample_covariance(returns: &Array2<f64>) -> Result<Array2<f64>> {
  let n_obs = returns.nrows();
  if n_obs < 2 {
    return Err(PortfolioError::InsufficientData {
      required: 2,
      actual: n_obs,
    });
  }

  let cov = returns
    .t()
    .cov(1.0)
    .map_err(|_| PortfolioError::InsufficientData {
      required: 2,
      actual: n_obs,
    })?;

  Ok(symmetrize(&cov))
}

/// `(A + A') / 2`.
pub fn symmetrize(mat: &Array2<f64>) -> Array2<f64> {
  (mat + &mat.t()) * 0.5
}

/// `n` consecutive weekdays starting at `start` (rolled forward off a weekend).
pub fn business_days(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
  let mut out = Vec::with_capacity(n);
  let mut day = start;
  while out.len() < n {
    if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
      out.push(day);
    }
    day = match day.checked_add_days(Days::new(1)) {
      Some(next) => next,
      None => break,
    };
  }
  out
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn prices(values: Array2<f64>, tickers: &[&str]) -> PriceMatrix {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    PriceMatrix::new(
      business_days(start, values.nrows()),
      tickers.iter().map(|t| t.to_string()).collect(),
      values,
    )
    .unwrap()
  }

  #[test]
  fn returns_drop_first_row_and_keep_columns() {
    let p = prices(
      array![[100.0, 50.0], [110.0, 55.0], [121.0, 44.0], [99.0, 44.0]],
      &["A", "B"],
    );
    let r = simple_returns(&p).unwrap();

    assert_eq!(r.nrows(), p.nrows() - 1);
    assert_eq!(r.tickers(), p.tickers());
    assert_eq!(r.dates(), &p.dates()[1..]);

    let pv = p.values();
    for t in 1..p.nrows() {
      for c in 0..p.ncols() {
        let expected = (pv[[t, c]] - pv[[t - 1, c]]) / pv[[t - 1, c]];
        assert_abs_diff_eq!(r.values()[[t - 1, c]], expected, epsilon = 1e-15);
      }
    }
  }

  #[test]
  fn single_ticker_growth_of_ten_percent() {
    let p = prices(array![[100.0], [110.0], [121.0]], &["X"]);
    let r = simple_returns(&p).unwrap();
    assert_abs_diff_eq!(r.values()[[0, 0]], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r.values()[[1, 0]], 0.1, epsilon = 1e-12);
  }

  #[test]
  fn returns_need_two_rows() {
    let p = prices(array![[100.0, 1.0]], &["A", "B"]);
    assert_eq!(
      simple_returns(&p),
      Err(PortfolioError::InsufficientData {
        required: 2,
        actual: 1,
      })
    );
  }

  #[test]
  fn sample_covariance_matches_hand_computation() {
    let r = array![[0.01, 0.02], [0.03, -0.01], [-0.01, 0.0]];
    let cov = sample_covariance(&r).unwrap();

    // column means: 0.01, 0.003333..
    let var_a = (0.0f64.powi(2) + 0.02f64.powi(2) + 0.02f64.powi(2)) / 2.0;
    assert_abs_diff_eq!(cov[[0, 0]], var_a, epsilon = 1e-15);
    assert_eq!(cov[[0, 1]], cov[[1, 0]]);

    let mb = 0.01 / 3.0;
    let cov_ab = (0.0 * (0.02 - mb) + 0.02 * (-0.01 - mb) + (-0.02) * (0.0 - mb)) / 2.0;
    assert_abs_diff_eq!(cov[[0, 1]], cov_ab, epsilon = 1e-15);
  }

  #[test]
  fn sample_covariance_needs_two_observations() {
    assert!(matches!(
      sample_covariance(&array![[0.01, 0.02]]),
      Err(PortfolioError::InsufficientData { .. })
    ));
  }

  #[test]
  fn series_returns_are_one_shorter() {
    let r = simple_returns_series(&[50.0, 55.0, 44.0]);
    assert_eq!(r.len(), 2);
    assert_abs_diff_eq!(r[0], 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(r[1], -0.2, epsilon = 1e-12);
    assert!(simple_returns_series(&[1.0]).is_empty());
  }

  #[test]
  fn business_days_skip_weekends() {
    // 2024-01-05 is a Friday
    let start = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
    let days = business_days(start, 3);
    assert_eq!(
      days,
      vec![
        start,
        NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 9).unwrap(),
      ]
    );
  }
}
