//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}} \ \mathbf{w}^\top\Sigma\mathbf{w}\quad \text{s.t.}\ \mathbf{1}^\top\mathbf{w}=1
//! $$
//!
//! Minimum-variance, tangency, risk-parity, maximum-diversification and
//! equal-weight allocations. Each strategy is a pure function of the moment
//! estimates and the optimizer configuration.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array1;
use tracing::debug;

use super::linalg::cholesky_solve;
use super::linalg::diversification_ratio;
use super::linalg::fractional_risk_contributions;
use super::linalg::normalize_budget;
use super::linalg::portfolio_variance;
use super::linalg::to_array1;
use super::linalg::to_dmatrix;
use super::linalg::to_dvector;
use super::qp::solve_nonnegative_qp;
use super::risk_parity::resolve_budget;
use super::risk_parity::solve_risk_parity;
use super::types::OptimizerConfig;
use super::types::PortfolioResult;
use super::types::Strategy;
use super::types::WeightVector;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::MomentEstimates;

fn ensure_assets(estimates: &MomentEstimates) -> Result<usize> {
  match estimates.n_assets() {
    0 => Err(PortfolioError::InvalidInput(
      "optimization needs at least one asset".into(),
    )),
    n => Ok(n),
  }
}

fn into_weights(estimates: &MomentEstimates, w: &DVector<f64>) -> Result<WeightVector> {
  let w = normalize_budget(w).ok_or_else(|| {
    PortfolioError::DegenerateCovariance("solution has a zero budget".into())
  })?;
  WeightVector::new(estimates.assets().to_vec(), to_array1(&w))
}

/// Minimum-variance portfolio.
///
/// With shorting allowed the closed form `w ∝ Sigma^-1 1` is returned. Long-only
/// keeps the closed form when it is already non-negative, otherwise solves the QP.
pub fn optimize_min_variance(
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
) -> Result<WeightVector> {
  let n = ensure_assets(estimates)?;
  let cov = to_dmatrix(estimates.covariance());
  let ones = DVector::from_element(n, 1.0);

  match cholesky_solve(&cov, &ones) {
    Ok(raw) => {
      if let Some(w) = normalize_budget(&raw) {
        if !config.long_only || w.iter().all(|&x| x >= 0.0) {
          return into_weights(estimates, &w);
        }
      }
    }
    Err(err) if !config.long_only => return Err(err),
    Err(err) => debug!(%err, "closed-form minimum variance unavailable, falling back to qp"),
  }

  let w = solve_nonnegative_qp(Strategy::MinimumVariance, &cov, &[(&ones, 1.0)], &config.solver)?;
  into_weights(estimates, &w)
}

/// Maximum Sharpe ratio portfolio.
///
/// Solves `min y'Sigma y` s.t. `y'(mu - r_f) = 1` and rescales `w = y / sum(y)`.
pub fn optimize_tangency(
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
) -> Result<WeightVector> {
  ensure_assets(estimates)?;
  let rf = config.risk_free_rate;
  let excess = to_dvector(&(estimates.mean() - rf));
  if excess.iter().all(|&e| e <= 0.0) {
    return Err(PortfolioError::NoTangencyPortfolio { risk_free_rate: rf });
  }

  let cov = to_dmatrix(estimates.covariance());
  match cholesky_solve(&cov, &excess) {
    Ok(raw) => {
      let budget = raw.sum();
      if budget > 0.0 {
        let w = raw / budget;
        if !config.long_only || w.iter().all(|&x| x >= 0.0) {
          return into_weights(estimates, &w);
        }
      } else if !config.long_only {
        return Err(PortfolioError::NoTangencyPortfolio { risk_free_rate: rf });
      }
    }
    Err(err) if !config.long_only => return Err(err),
    Err(err) => debug!(%err, "closed-form tangency unavailable, falling back to qp"),
  }

  let scaled = &excess / excess.max();
  let y = solve_nonnegative_qp(Strategy::Tangency, &cov, &[(&scaled, 1.0)], &config.solver)?;
  into_weights(estimates, &y)
}

/// Long-only risk parity with equal or custom risk budgets.
pub fn optimize_risk_parity(
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
) -> Result<WeightVector> {
  let n = ensure_assets(estimates)?;
  let budget = resolve_budget(n, config.risk_budget.as_deref())?;
  let cov = to_dmatrix(estimates.covariance());
  let w = solve_risk_parity(&cov, &budget, &config.solver)?;
  into_weights(estimates, &w)
}

/// Long-only maximum diversification portfolio.
///
/// Minimum variance on the correlation matrix `C` gives `x`; the weights are `x_i / sigma_i`
/// renormalized.
pub fn optimize_max_diversification(
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
) -> Result<WeightVector> {
  let n = ensure_assets(estimates)?;
  let cov = estimates.covariance();
  let vols = estimates.volatilities();
  if let Some(i) = vols.iter().position(|&v| !(v > 0.0)) {
    return Err(PortfolioError::DegenerateCovariance(format!(
      "asset '{}' has zero volatility",
      estimates.assets()[i]
    )));
  }

  let corr = DMatrix::from_fn(n, n, |i, j| cov[[i, j]] / (vols[i] * vols[j]));
  let ones = DVector::from_element(n, 1.0);

  let closed_form = cholesky_solve(&corr, &ones)
    .ok()
    .and_then(|raw| normalize_budget(&raw))
    .filter(|x| x.iter().all(|&v| v >= 0.0));

  let x = match closed_form {
    Some(x) => x,
    None => solve_nonnegative_qp(
      Strategy::MaxDiversification,
      &corr,
      &[(&ones, 1.0)],
      &config.solver,
    )?,
  };

  let w = DVector::from_fn(n, |i, _| x[i] / vols[i]);
  into_weights(estimates, &w)
}

/// `1/N` allocation; never fails for a non-empty universe.
pub fn optimize_equal_weight(estimates: &MomentEstimates) -> Result<WeightVector> {
  ensure_assets(estimates)?;
  WeightVector::equal(estimates.assets().to_vec())
}

/// Dispatch to the selected strategy.
pub fn optimize(
  strategy: Strategy,
  estimates: &MomentEstimates,
  config: &OptimizerConfig,
) -> Result<WeightVector> {
  match strategy {
    Strategy::MinimumVariance => optimize_min_variance(estimates, config),
    Strategy::Tangency => optimize_tangency(estimates, config),
    Strategy::RiskParity => optimize_risk_parity(estimates, config),
    Strategy::MaxDiversification => optimize_max_diversification(estimates, config),
    Strategy::EqualWeight => optimize_equal_weight(estimates),
  }
}

/// Evaluate `weights` under `estimates`.
pub fn summarize(
  strategy: Strategy,
  weights: WeightVector,
  estimates: &MomentEstimates,
  risk_free: f64,
) -> PortfolioResult {
  let w: &Array1<f64> = weights.weights();
  let cov = estimates.covariance();

  let expected_return = w.dot(estimates.mean());
  let volatility = portfolio_variance(w, cov).max(0.0).sqrt();
  let sharpe = if volatility > 0.0 {
    (expected_return - risk_free) / volatility
  } else {
    f64::NAN
  };
  let diversification_ratio = diversification_ratio(w, cov);
  let risk_contributions = fractional_risk_contributions(w, cov).to_vec();

  PortfolioResult {
    strategy,
    weights,
    expected_return,
    volatility,
    sharpe,
    diversification_ratio,
    risk_contributions,
  }
}
