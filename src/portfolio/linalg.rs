//! # Portfolio Linear Algebra
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w},\qquad
//! RC_i = \frac{w_i(\Sigma\mathbf{w})_i}{\sigma_p}
//! $$
//!
//! Dense helpers shared by the optimizers: conversions to `nalgebra`,
//! Cholesky solves and risk decomposition.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use ndarray::Array2;

use crate::error::PortfolioError;
use crate::error::Result;

/// Squared Cholesky pivots below this fraction of the largest variance count as singular.
const CONDITION_FLOOR: f64 = 1e-12;

pub(crate) fn to_dmatrix(m: &Array2<f64>) -> DMatrix<f64> {
  let (rows, cols) = m.dim();
  DMatrix::from_fn(rows, cols, |i, j| m[[i, j]])
}

pub(crate) fn to_dvector(v: &Array1<f64>) -> DVector<f64> {
  DVector::from_iterator(v.len(), v.iter().copied())
}

pub(crate) fn to_array1(v: &DVector<f64>) -> Array1<f64> {
  Array1::from_iter(v.iter().copied())
}

/// Solve `Sigma x = b` through a Cholesky factorization.
///
/// Fails with [`PortfolioError::DegenerateCovariance`] when `Sigma` is not positive definite.
pub(crate) fn cholesky_solve(cov: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
  let chol = cov.clone().cholesky().ok_or_else(|| {
    PortfolioError::DegenerateCovariance("matrix is not positive definite".into())
  })?;

  let scale = cov.diagonal().max();
  let min_pivot = chol.l_dirty().diagonal().min();
  if min_pivot * min_pivot < CONDITION_FLOOR * scale {
    return Err(PortfolioError::DegenerateCovariance(format!(
      "matrix is near-singular (smallest pivot {min_pivot:.3e})"
    )));
  }

  let x = chol.solve(b);
  if x.iter().all(|v| v.is_finite()) {
    Ok(x)
  } else {
    Err(PortfolioError::DegenerateCovariance(
      "solve produced non-finite values".into(),
    ))
  }
}

/// Rescale `x` so that its entries sum to one.
pub(crate) fn normalize_budget(x: &DVector<f64>) -> Option<DVector<f64>> {
  let total = x.sum();
  if total.is_finite() && total.abs() > 1e-300 {
    Some(x / total)
  } else {
    None
  }
}

/// Portfolio variance `w' Sigma w`.
pub fn portfolio_variance(weights: &Array1<f64>, cov: &Array2<f64>) -> f64 {
  weights.dot(&cov.dot(weights))
}

/// Absolute risk contributions `w_i (Sigma w)_i / sigma_p`; they sum to `sigma_p`.
///
/// All zeros when the portfolio variance vanishes.
pub fn risk_contributions(weights: &Array1<f64>, cov: &Array2<f64>) -> Array1<f64> {
  let marginal = cov.dot(weights);
  let vol = weights.dot(&marginal).max(0.0).sqrt();
  if vol > 1e-15 {
    weights * &marginal / vol
  } else {
    Array1::zeros(weights.len())
  }
}

/// Risk contributions as fractions of total variance; they sum to one.
pub fn fractional_risk_contributions(weights: &Array1<f64>, cov: &Array2<f64>) -> Array1<f64> {
  let marginal = cov.dot(weights);
  let var = weights.dot(&marginal);
  if var > 1e-300 {
    weights * &marginal / var
  } else {
    Array1::zeros(weights.len())
  }
}

/// Diversification ratio `w'sigma / sqrt(w'Sigma w)`; NaN for a zero-volatility portfolio.
pub fn diversification_ratio(weights: &Array1<f64>, cov: &Array2<f64>) -> f64 {
  let vols = cov.diag().mapv(|v| v.max(0.0).sqrt());
  let port_vol = portfolio_variance(weights, cov).max(0.0).sqrt();
  if port_vol > 1e-15 {
    weights.dot(&vols) / port_vol
  } else {
    f64::NAN
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn risk_contributions_sum_to_volatility() {
    let w = array![0.5, 0.3, 0.2];
    let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];

    let rc = risk_contributions(&w, &cov);
    let vol = portfolio_variance(&w, &cov).sqrt();
    assert_abs_diff_eq!(rc.sum(), vol, epsilon = 1e-14);

    let frac = fractional_risk_contributions(&w, &cov);
    assert_abs_diff_eq!(frac.sum(), 1.0, epsilon = 1e-14);
  }

  #[test]
  fn diversification_ratio_is_one_for_single_asset() {
    let w = array![1.0, 0.0];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];
    assert_abs_diff_eq!(diversification_ratio(&w, &cov), 1.0, epsilon = 1e-14);
  }

  #[test]
  fn cholesky_solve_rejects_singular_matrix() {
    let cov = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
    let b = DVector::from_element(2, 1.0);
    assert!(matches!(
      cholesky_solve(&cov, &b),
      Err(PortfolioError::DegenerateCovariance(_))
    ));
  }
}
