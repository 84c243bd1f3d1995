//! # Errors
//!
//! Failure taxonomy shared by estimation, optimization and backtesting.

use thiserror::Error;

use crate::portfolio::Strategy;

/// Errors raised by the allocation pipeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
  /// Not enough observations to estimate moments or run a backtest.
  #[error("insufficient data: {required} observations required, {available} available")]
  InsufficientData { required: usize, available: usize },

  /// An iterative solver hit its iteration cap before meeting its tolerance.
  #[error(
    "{strategy} solver did not converge after {iterations} iterations (residual {residual:.3e}, tolerance {tolerance:.3e})"
  )]
  SolverDidNotConverge {
    strategy: Strategy,
    iterations: usize,
    residual: f64,
    tolerance: f64,
  },

  /// No asset (or no long/short combination) beats the risk-free rate.
  #[error("no tangency portfolio exists for risk-free rate {risk_free_rate}")]
  NoTangencyPortfolio { risk_free_rate: f64 },

  /// Covariance matrix is singular, near-singular or has non-positive variances.
  #[error("degenerate covariance matrix: {0}")]
  DegenerateCovariance(String),

  /// Inputs with wrong shape, non-finite values or invalid parameters.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Return table violates its structural invariants.
  #[error("invalid return series: {0}")]
  InvalidReturnSeries(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PortfolioError>;
