//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Allocation strategies, the solvers behind them and risk decomposition helpers.

pub mod frontier;
pub(crate) mod linalg;
pub mod optimizers;
pub(crate) mod qp;
pub(crate) mod risk_parity;
pub mod types;

pub use frontier::efficient_frontier;
pub use linalg::diversification_ratio;
pub use linalg::fractional_risk_contributions;
pub use linalg::portfolio_variance;
pub use linalg::risk_contributions;
pub use optimizers::optimize;
pub use optimizers::optimize_equal_weight;
pub use optimizers::optimize_max_diversification;
pub use optimizers::optimize_min_variance;
pub use optimizers::optimize_risk_parity;
pub use optimizers::optimize_tangency;
pub use optimizers::summarize;
pub use types::FrontierPoint;
pub use types::OptimizerConfig;
pub use types::PortfolioResult;
pub use types::SolverSettings;
pub use types::Strategy;
pub use types::WeightVector;
pub use types::BUDGET_TOLERANCE;
