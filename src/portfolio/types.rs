//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared enums, configuration and result containers for portfolio optimization.

use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array1;
use serde::Deserialize;
use serde::Serialize;

use crate::error::PortfolioError;
use crate::error::Result;

/// Tolerance on `sum(w) - 1` accepted by [`WeightVector::new`].
pub const BUDGET_TOLERANCE: f64 = 1e-9;

/// Supported allocation strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Minimum-variance portfolio.
  MinimumVariance,
  /// Maximum Sharpe ratio portfolio.
  Tangency,
  /// Equal risk contributions.
  RiskParity,
  /// Maximum diversification ratio.
  MaxDiversification,
  /// `1/N` in every asset.
  EqualWeight,
}

impl Strategy {
  /// Every strategy, in reporting order.
  pub const ALL: [Strategy; 5] = [
    Strategy::MinimumVariance,
    Strategy::Tangency,
    Strategy::RiskParity,
    Strategy::EqualWeight,
    Strategy::MaxDiversification,
  ];

  /// Whether the strategy can hold negative weights when shorting is enabled.
  pub fn supports_short(self) -> bool {
    matches!(self, Strategy::MinimumVariance | Strategy::Tangency)
  }
}

impl Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Strategy::MinimumVariance => write!(f, "MVP"),
      Strategy::Tangency => write!(f, "Tangency"),
      Strategy::RiskParity => write!(f, "Risk Parity"),
      Strategy::MaxDiversification => write!(f, "Max Diversification"),
      Strategy::EqualWeight => write!(f, "Equal Weights"),
    }
  }
}

impl FromStr for Strategy {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().replace(['_', ' '], "-").as_str() {
      "mvp" | "min-variance" | "minimum-variance" => Ok(Self::MinimumVariance),
      "tangency" | "max-sharpe" => Ok(Self::Tangency),
      "risk-parity" | "riskparity" | "erc" => Ok(Self::RiskParity),
      "max-diversification" | "maxdiv" | "mdp" => Ok(Self::MaxDiversification),
      "equal-weight" | "equal-weights" | "ew" => Ok(Self::EqualWeight),
      other => Err(PortfolioError::InvalidInput(format!(
        "unknown strategy '{other}'"
      ))),
    }
  }
}

/// Iteration caps and tolerances of the iterative solvers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
  /// Feasibility and duality-gap tolerance of the interior-point QP.
  pub tolerance: f64,
  /// Interior-point iteration cap for the long-only QP.
  pub max_iterations: usize,
  /// Max pairwise deviation of fractional risk contributions.
  pub risk_parity_tolerance: f64,
  /// Sweep cap for risk-parity coordinate descent.
  pub risk_parity_max_iterations: usize,
}

impl Default for SolverSettings {
  fn default() -> Self {
    Self {
      tolerance: 1e-8,
      max_iterations: 200,
      risk_parity_tolerance: 1e-8,
      risk_parity_max_iterations: 10_000,
    }
  }
}

/// Inputs shared by every strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
  /// Risk-free rate on the same horizon as the moment estimates.
  pub risk_free_rate: f64,
  /// Forbid short positions for MVP and Tangency.
  pub long_only: bool,
  /// Risk budgets for risk parity; equal budgets when `None`.
  pub risk_budget: Option<Vec<f64>>,
  /// Tolerances and iteration caps of the QP and risk-parity solvers.
  pub solver: SolverSettings,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.02,
      long_only: true,
      risk_budget: None,
      solver: SolverSettings::default(),
    }
  }
}

/// Fully-invested allocation keyed by asset id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WeightVector {
  assets: Vec<String>,
  weights: Array1<f64>,
}

impl WeightVector {
  /// Validate and wrap `weights`; they must be finite and sum to one within [`BUDGET_TOLERANCE`].
  pub fn new(assets: Vec<String>, weights: Array1<f64>) -> Result<Self> {
    if assets.len() != weights.len() {
      return Err(PortfolioError::InvalidInput(format!(
        "{} weights for {} assets",
        weights.len(),
        assets.len()
      )));
    }
    if assets.is_empty() {
      return Err(PortfolioError::InvalidInput(
        "weight vector needs at least one asset".into(),
      ));
    }
    if weights.iter().any(|w| !w.is_finite()) {
      return Err(PortfolioError::InvalidInput(
        "weights contain non-finite values".into(),
      ));
    }
    let total = weights.sum();
    if (total - 1.0).abs() > BUDGET_TOLERANCE {
      return Err(PortfolioError::InvalidInput(format!(
        "weights sum to {total}, expected 1"
      )));
    }

    Ok(Self { assets, weights })
  }

  /// `1/N` allocation.
  pub fn equal(assets: Vec<String>) -> Result<Self> {
    let n = assets.len();
    if n == 0 {
      return Err(PortfolioError::InvalidInput(
        "equal weighting needs at least one asset".into(),
      ));
    }
    Self::new(assets, Array1::from_elem(n, 1.0 / n as f64))
  }

  /// Asset ids, aligned with [`Self::weights`].
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Weights in asset order.
  pub fn weights(&self) -> &Array1<f64> {
    &self.weights
  }

  /// Number of assets.
  pub fn len(&self) -> usize {
    self.weights.len()
  }

  /// Always false for a validated vector.
  pub fn is_empty(&self) -> bool {
    self.weights.is_empty()
  }

  /// Weight of `asset`, if present.
  pub fn get(&self, asset: &str) -> Option<f64> {
    self
      .assets
      .iter()
      .position(|a| a == asset)
      .map(|i| self.weights[i])
  }

  /// `(asset, weight)` pairs.
  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
    self
      .assets
      .iter()
      .map(String::as_str)
      .zip(self.weights.iter().copied())
  }

  /// Whether any weight is negative.
  pub fn has_short(&self) -> bool {
    self.weights.iter().any(|&w| w < 0.0)
  }
}

/// Summary of an optimized allocation under the estimates it was solved on.
#[derive(Clone, Debug, Serialize)]
pub struct PortfolioResult {
  pub strategy: Strategy,
  /// Final portfolio weights.
  pub weights: WeightVector,
  /// Model expected portfolio return (annualized if inputs are annualized).
  pub expected_return: f64,
  /// Model portfolio volatility.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`, NaN for zero volatility.
  pub sharpe: f64,
  /// `w'sigma / sqrt(w'Sigma w)`.
  pub diversification_ratio: f64,
  /// Fractional risk contribution of each asset (sums to one).
  pub risk_contributions: Vec<f64>,
}

/// One point of the mean-variance efficient frontier.
#[derive(Clone, Debug, Serialize)]
pub struct FrontierPoint {
  pub target_return: f64,
  /// NaN when the point could not be solved.
  pub volatility: f64,
  pub weights: Option<WeightVector>,
}
