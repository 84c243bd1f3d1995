//! # Risk Parity
//!
//! $$
//! \min_{\mathbf{y}>0}\ \tfrac12\mathbf{y}^\top\Sigma\mathbf{y}-\sum_i b_i\ln y_i,\qquad
//! \mathbf{w}=\mathbf{y}/\mathbf{1}^\top\mathbf{y}
//! $$
//!
//! Equal (or budgeted) risk contributions via cyclical coordinate descent.
//! Each coordinate update is the positive root of
//! `Sigma_ii y_i^2 + c_i y_i - b_i = 0` with `c_i = sum_{j != i} Sigma_ij y_j`.

use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::linalg::cholesky_solve;
use super::qp::solve_nonnegative_qp;
use super::types::SolverSettings;
use super::types::Strategy;
use crate::error::PortfolioError;
use crate::error::Result;

/// Validate a custom budget or build the equal one.
pub(crate) fn resolve_budget(n: usize, budget: Option<&[f64]>) -> Result<DVector<f64>> {
  match budget {
    None => Ok(DVector::from_element(n, 1.0 / n as f64)),
    Some(b) => {
      if b.len() != n {
        return Err(PortfolioError::InvalidInput(format!(
          "risk budget has {} entries for {n} assets",
          b.len()
        )));
      }
      if b.iter().any(|&x| !(x.is_finite() && x > 0.0)) {
        return Err(PortfolioError::InvalidInput(
          "risk budget entries must be finite and positive".into(),
        ));
      }
      let total: f64 = b.iter().sum();
      if (total - 1.0).abs() > 1e-9 {
        return Err(PortfolioError::InvalidInput(format!(
          "risk budget sums to {total}, expected 1"
        )));
      }
      Ok(DVector::from_column_slice(b))
    }
  }
}

/// Correlation-scale variance below which a long-only mix counts as riskless.
const RISKLESS_MIX_FLOOR: f64 = 1e-6;

/// Reject a singular covariance that admits a zero-variance long-only portfolio.
///
/// Coordinate descent diverges on such a matrix instead of converging, so it is
/// detected up front from the long-only minimum variance of the correlation matrix.
fn ensure_no_riskless_mix(cov: &DMatrix<f64>, settings: &SolverSettings) -> Result<()> {
  let n = cov.nrows();
  let ones = DVector::from_element(n, 1.0);
  if cholesky_solve(cov, &ones).is_ok() {
    return Ok(());
  }

  let corr = DMatrix::from_fn(n, n, |i, j| {
    cov[(i, j)] / (cov[(i, i)] * cov[(j, j)]).sqrt()
  });
  match solve_nonnegative_qp(Strategy::RiskParity, &corr, &[(&ones, 1.0)], settings) {
    Ok(x) => {
      let floor = x.dot(&(&corr * &x));
      if floor < RISKLESS_MIX_FLOOR {
        return Err(PortfolioError::DegenerateCovariance(format!(
          "a long-only combination has zero variance ({floor:e})"
        )));
      }
      Ok(())
    }
    Err(err) => {
      debug!(%err, "riskless-mix check inconclusive");
      Ok(())
    }
  }
}

/// Largest minus smallest deviation of fractional risk contributions from the budget.
fn budget_deviation(
  cov: &DMatrix<f64>,
  y: &DVector<f64>,
  budget: &DVector<f64>,
  marginal: &mut DVector<f64>,
) -> f64 {
  marginal.gemv(1.0, cov, y, 0.0);
  let var = y.dot(marginal);
  if !(var > 0.0) {
    return f64::INFINITY;
  }

  let mut lo = f64::INFINITY;
  let mut hi = f64::NEG_INFINITY;
  for i in 0..y.len() {
    let dev = y[i] * marginal[i] / var - budget[i];
    lo = lo.min(dev);
    hi = hi.max(dev);
  }
  hi - lo
}

/// Solve for long-only risk-parity weights (unnormalized scale is irrelevant).
pub(crate) fn solve_risk_parity(
  cov: &DMatrix<f64>,
  budget: &DVector<f64>,
  settings: &SolverSettings,
) -> Result<DVector<f64>> {
  let n = cov.nrows();
  if let Some(i) = (0..n).find(|&i| !(cov[(i, i)] > 0.0)) {
    return Err(PortfolioError::DegenerateCovariance(format!(
      "asset {i} has non-positive variance {}",
      cov[(i, i)]
    )));
  }
  ensure_no_riskless_mix(cov, settings)?;

  // Start from inverse-volatility scaled to unit portfolio variance.
  let mut y = DVector::from_fn(n, |i, _| 1.0 / cov[(i, i)].sqrt());
  let mut marginal = DVector::zeros(n);
  marginal.gemv(1.0, cov, &y, 0.0);
  let var0 = y.dot(&marginal);
  if var0 > 0.0 {
    y /= var0.sqrt();
  }

  let mut deviation = f64::INFINITY;
  for sweep in 0..settings.risk_parity_max_iterations {
    for i in 0..n {
      let sii = cov[(i, i)];
      let cross: f64 = (0..n)
        .filter(|&j| j != i)
        .map(|j| cov[(i, j)] * y[j])
        .sum();
      y[i] = (-cross + (cross * cross + 4.0 * sii * budget[i]).sqrt()) / (2.0 * sii);
    }

    deviation = budget_deviation(cov, &y, budget, &mut marginal);
    if deviation < settings.risk_parity_tolerance {
      debug!(sweeps = sweep + 1, deviation, "risk parity converged");
      let total = y.sum();
      return Ok(y / total);
    }
  }

  Err(PortfolioError::SolverDidNotConverge {
    strategy: Strategy::RiskParity,
    iterations: settings.risk_parity_max_iterations,
    residual: deviation,
    tolerance: settings.risk_parity_tolerance,
  })
}
