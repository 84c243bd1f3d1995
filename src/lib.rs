//! # portfolio-rs
//!
//! $$
//! \text{prices}\to\mathbf{r}_t\to(\hat\mu,\hat\Sigma)\to\mathbf{w}\to r^p_t\to\text{metrics}
//! $$
//!
//! Portfolio allocation (minimum variance, tangency, risk parity, maximum
//! diversification, equal weight), walk-forward backtesting without look-ahead
//! and performance analytics.

pub mod backtest;
pub mod engine;
pub mod error;
pub mod estimation;
pub mod performance;
pub mod portfolio;
pub mod returns;

pub use backtest::BacktestConfig;
pub use backtest::BacktestEngine;
pub use backtest::BacktestResult;
pub use backtest::PortfolioReturnSeries;
pub use backtest::RebalanceFrequency;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use error::PortfolioError;
pub use estimation::estimate_moments;
pub use estimation::MomentEstimates;
pub use performance::PerformanceAnalyzer;
pub use performance::PerformanceReport;
pub use portfolio::OptimizerConfig;
pub use portfolio::Strategy;
pub use portfolio::WeightVector;
pub use returns::ReturnSeries;
