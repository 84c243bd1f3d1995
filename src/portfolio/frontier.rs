//! # Efficient Frontier
//!
//! $$
//! \sigma^2(\bar r)=\min_{\mathbf{w}}\ \mathbf{w}^\top\Sigma\mathbf{w}\quad
//! \text{s.t.}\ \mathbf{1}^\top\mathbf{w}=1,\ \boldsymbol\mu^\top\mathbf{w}=\bar r
//! $$
//!
//! Frontier between the minimum-variance and the tangency portfolio.

use nalgebra::DVector;
use tracing::warn;

use super::linalg::cholesky_solve;
use super::linalg::normalize_budget;
use super::linalg::portfolio_variance;
use super::linalg::to_array1;
use super::linalg::to_dmatrix;
use super::linalg::to_dvector;
use super::optimizers::optimize_min_variance;
use super::optimizers::optimize_tangency;
use super::qp::solve_nonnegative_qp;
use super::types::FrontierPoint;
use super::types::OptimizerConfig;
use super::types::Strategy;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::MomentEstimates;

const TARGET_TOLERANCE: f64 = 1e-9;

/// Closed-form frontier weights with shorting allowed (two-fund separation).
fn unconstrained_point(estimates: &MomentEstimates, target: f64) -> Result<DVector<f64>> {
  let cov = to_dmatrix(estimates.covariance());
  let mu = to_dvector(estimates.mean());
  let ones = DVector::from_element(mu.len(), 1.0);

  let inv_ones = cholesky_solve(&cov, &ones)?;
  let inv_mu = cholesky_solve(&cov, &mu)?;
  let a = ones.dot(&inv_ones);
  let b = ones.dot(&inv_mu);
  let c = mu.dot(&inv_mu);
  let d = a * c - b * b;

  if d.abs() <= 1e-14 * (a * c).abs() {
    return Ok(inv_ones / a);
  }
  Ok((inv_ones * (c - b * target) + inv_mu * (a * target - b)) / d)
}

/// Long-only frontier weights from one QP with budget and target-return equalities.
fn long_only_point(
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
  target: f64,
) -> Result<DVector<f64>> {
  let cov = to_dmatrix(estimates.covariance());
  let mu = to_dvector(estimates.mean());
  let ones = DVector::from_element(mu.len(), 1.0);

  let lo = mu.min();
  let hi = mu.max();
  if target < lo - TARGET_TOLERANCE || target > hi + TARGET_TOLERANCE {
    return Err(PortfolioError::InvalidInput(format!(
      "target return {target} outside long-only range [{lo}, {hi}]"
    )));
  }
  let target = target.clamp(lo, hi);

  let w = solve_nonnegative_qp(
    Strategy::MinimumVariance,
    &cov,
    &[(&ones, 1.0), (&mu, target)],
    &config.solver,
  )?;
  normalize_budget(&w)
    .ok_or_else(|| PortfolioError::DegenerateCovariance("frontier point has a zero budget".into()))
}

/// Trace `points` frontier portfolios from the minimum-variance return up to the
/// tangency return (or the largest asset mean when no tangency portfolio exists).
///
/// Points that cannot be solved keep their target with NaN volatility.
pub fn efficient_frontier(
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
  points: usize,
) -> Result<Vec<FrontierPoint>> {
  if points == 0 {
    return Ok(Vec::new());
  }

  let mvp = optimize_min_variance(estimates, config)?;
  let r_min = mvp.weights().dot(estimates.mean());
  let max_mean = estimates
    .mean()
    .iter()
    .copied()
    .fold(f64::NEG_INFINITY, f64::max);
  let r_max = match optimize_tangency(estimates, config) {
    Ok(tan) => tan.weights().dot(estimates.mean()),
    Err(_) => max_mean,
  };
  let r_max = if config.long_only { r_max.min(max_mean) } else { r_max };
  let r_max = r_max.max(r_min);

  let step = if points > 1 {
    (r_max - r_min) / (points - 1) as f64
  } else {
    0.0
  };

  let mut frontier = Vec::with_capacity(points);
  for k in 0..points {
    let target = r_min + step * k as f64;
    let solved = if config.long_only {
      long_only_point(estimates, config, target)
    } else {
      unconstrained_point(estimates, target)
    }
    .and_then(|w| WeightVector::new(estimates.assets().to_vec(), to_array1(&w)));

    match solved {
      Ok(weights) => {
        let volatility = portfolio_variance(weights.weights(), estimates.covariance())
          .max(0.0)
          .sqrt();
        frontier.push(FrontierPoint {
          target_return: target,
          volatility,
          weights: Some(weights),
        });
      }
      Err(err) => {
        warn!(target, %err, "frontier point failed");
        frontier.push(FrontierPoint {
          target_return: target,
          volatility: f64::NAN,
          weights: None,
        });
      }
    }
  }

  Ok(frontier)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn estimates() -> MomentEstimates {
    MomentEstimates::new(
      vec!["A".into(), "B".into(), "C".into()],
      array![0.08, 0.1, 0.12],
      array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]],
    )
    .unwrap()
  }

  #[test]
  fn frontier_is_increasing_in_risk_and_return() {
    for long_only in [true, false] {
      let config = OptimizerConfig {
        long_only,
        ..OptimizerConfig::default()
      };
      let frontier = efficient_frontier(&estimates(), &config, 10).unwrap();

      assert_eq!(frontier.len(), 10);
      for pair in frontier.windows(2) {
        assert!(pair[1].target_return >= pair[0].target_return);
        assert!(pair[1].volatility >= pair[0].volatility - 1e-9);
      }
      for point in &frontier {
        let w = point.weights.as_ref().unwrap();
        assert_abs_diff_eq!(w.weights().dot(estimates().mean()), point.target_return, epsilon = 1e-7);
        if long_only {
          assert!(w.weights().iter().all(|&x| x >= 0.0));
        }
      }
    }
  }

  #[test]
  fn first_point_is_minimum_variance() {
    let config = OptimizerConfig::default();
    let frontier = efficient_frontier(&estimates(), &config, 5).unwrap();
    let mvp = optimize_min_variance(&estimates(), &config).unwrap();
    let mvp_vol = portfolio_variance(mvp.weights(), estimates().covariance()).sqrt();

    assert_abs_diff_eq!(frontier[0].volatility, mvp_vol, epsilon = 1e-8);
  }

  #[test]
  fn long_only_point_meets_both_equalities() {
    let config = OptimizerConfig::default();
    let w = long_only_point(&estimates(), &config, 0.11).unwrap();

    assert_abs_diff_eq!(w.sum(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(to_dvector(estimates().mean()).dot(&w), 0.11, epsilon = 1e-8);
    assert!(w.iter().all(|&x| x >= 0.0));
    assert!(matches!(
      long_only_point(&estimates(), &config, 0.13),
      Err(PortfolioError::InvalidInput(_))
    ));
  }

  #[test]
  fn zero_points_is_empty() {
    let frontier = efficient_frontier(&estimates(), &OptimizerConfig::default(), 0).unwrap();
    assert!(frontier.is_empty());
  }
}
