//! # Moment Estimation
//!
//! $$
//! \hat\mu = \frac{1}{T}\sum_t r_t,\qquad
//! \hat\Sigma = \frac{1}{T-1}\sum_t (r_t-\hat\mu)(r_t-\hat\mu)^\top
//! $$
//!
//! Sample mean vector and unbiased sample covariance over a return window.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;
use serde::Serialize;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;

/// Mean vector and covariance matrix of a return window.
#[derive(Clone, Debug, Serialize)]
pub struct MomentEstimates {
  assets: Vec<String>,
  mean: Array1<f64>,
  covariance: Array2<f64>,
  observations: usize,
}

impl MomentEstimates {
  /// Build estimates from externally supplied moments.
  ///
  /// The covariance is symmetrized; shape mismatches and non-finite entries are rejected.
  pub fn new(assets: Vec<String>, mean: Array1<f64>, covariance: Array2<f64>) -> Result<Self> {
    let n = assets.len();
    if mean.len() != n || covariance.dim() != (n, n) {
      return Err(PortfolioError::InvalidInput(format!(
        "moments for {n} assets have mean length {} and covariance shape {:?}",
        mean.len(),
        covariance.dim()
      )));
    }
    if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::InvalidInput(
        "moments contain non-finite values".into(),
      ));
    }

    let covariance = (&covariance + &covariance.t()) * 0.5;

    Ok(Self {
      assets,
      mean,
      covariance,
      observations: 0,
    })
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn mean(&self) -> &Array1<f64> {
    &self.mean
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  /// Number of observations the estimate was computed from (0 if supplied externally).
  pub fn observations(&self) -> usize {
    self.observations
  }

  /// Scale per-period moments to an annual horizon (`mu * k`, `Sigma * k`).
  pub fn annualize(&self, periods_per_year: usize) -> Self {
    let k = periods_per_year as f64;
    Self {
      assets: self.assets.clone(),
      mean: &self.mean * k,
      covariance: &self.covariance * k,
      observations: self.observations,
    }
  }

  /// Per-asset volatility `sqrt(diag(Sigma))`.
  pub fn volatilities(&self) -> Array1<f64> {
    self.covariance.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Correlation matrix implied by the covariance. Zero-volatility assets get zero correlation.
  pub fn correlation(&self) -> Array2<f64> {
    let vols = self.volatilities();
    let n = self.n_assets();
    Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        1.0
      } else {
        let denom = vols[i] * vols[j];
        if denom > 1e-15 {
          (self.covariance[[i, j]] / denom).clamp(-1.0, 1.0)
        } else {
          0.0
        }
      }
    })
  }
}

/// Estimate sample moments from a `T x N` window (rows are observations).
pub fn estimate_moments(assets: &[String], window: ArrayView2<f64>) -> Result<MomentEstimates> {
  let (t, n) = window.dim();
  if n != assets.len() {
    return Err(PortfolioError::InvalidInput(format!(
      "{} asset ids for a window with {n} columns",
      assets.len()
    )));
  }
  if t < 2 {
    return Err(PortfolioError::InsufficientData {
      required: 2,
      available: t,
    });
  }
  if t < n + 1 {
    warn!(
      observations = t,
      assets = n,
      "estimation window shorter than assets + 1, covariance is singular or ill-conditioned"
    );
  }

  let mean = window
    .mean_axis(Axis(0))
    .ok_or(PortfolioError::InsufficientData {
      required: 2,
      available: t,
    })?;
  let covariance = window
    .t()
    .cov(1.0)
    .map_err(|_| PortfolioError::InsufficientData {
      required: 2,
      available: t,
    })?;

  Ok(MomentEstimates {
    assets: assets.to_vec(),
    mean,
    covariance,
    observations: t,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;

  fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("A{i}")).collect()
  }

  #[test]
  fn sample_moments_use_unbiased_covariance() {
    let window = array![[0.01, 0.02], [0.03, -0.02], [-0.01, 0.0], [0.05, 0.04]];
    let est = estimate_moments(&names(2), window.view()).unwrap();

    assert_abs_diff_eq!(est.mean()[0], 0.02, epsilon = 1e-15);
    assert_abs_diff_eq!(est.mean()[1], 0.01, epsilon = 1e-15);

    // deviations a: [-0.01, 0.01, -0.03, 0.03], b: [0.01, -0.03, -0.01, 0.03]
    assert_abs_diff_eq!(est.covariance()[[0, 0]], 0.002 / 3.0, epsilon = 1e-15);
    assert_abs_diff_eq!(est.covariance()[[1, 1]], 0.002 / 3.0, epsilon = 1e-15);
    assert_abs_diff_eq!(est.covariance()[[0, 1]], 0.0008 / 3.0, epsilon = 1e-15);
    assert_eq!(est.covariance()[[0, 1]], est.covariance()[[1, 0]]);
    assert_eq!(est.observations(), 4);
  }

  #[test]
  fn single_observation_is_insufficient() {
    let window = array![[0.01, 0.02]];
    let err = estimate_moments(&names(2), window.view()).unwrap_err();

    assert_eq!(
      err,
      PortfolioError::InsufficientData {
        required: 2,
        available: 1
      }
    );
  }

  #[test]
  #[traced_test]
  fn short_window_warns_but_succeeds() {
    let window = array![[0.01, 0.02, 0.0], [0.03, -0.02, 0.01]];
    let est = estimate_moments(&names(3), window.view());

    assert!(est.is_ok());
    assert!(logs_contain("ill-conditioned"));
  }

  #[test]
  fn annualize_scales_both_moments() {
    let est = MomentEstimates::new(names(2), array![0.001, 0.002], array![[1e-4, 0.0], [0.0, 4e-4]])
      .unwrap()
      .annualize(252);

    assert_abs_diff_eq!(est.mean()[1], 0.504, epsilon = 1e-12);
    assert_abs_diff_eq!(est.covariance()[[1, 1]], 0.1008, epsilon = 1e-12);
  }

  #[test]
  fn correlation_from_covariance() {
    let est = MomentEstimates::new(names(2), array![0.0, 0.0], array![[0.04, 0.012], [0.012, 0.09]]).unwrap();
    let corr = est.correlation();

    assert_abs_diff_eq!(corr[[0, 1]], 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(corr[[1, 1]], 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(est.volatilities()[1], 0.3, epsilon = 1e-12);
  }

  #[test]
  fn rejects_mismatched_shapes() {
    let err = MomentEstimates::new(names(2), array![0.0], array![[1.0]]).unwrap_err();
    assert!(matches!(err, PortfolioError::InvalidInput(_)));
  }
}
