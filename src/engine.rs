//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(\mu, \Sigma, \text{strategy})
//! $$
//!
//! High-level orchestration API: estimation, one-shot optimization, backtests
//! and side-by-side strategy comparison.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Deserialize;
use serde::Serialize;

use crate::backtest::BacktestConfig;
use crate::backtest::BacktestEngine;
use crate::backtest::BacktestResult;
use crate::error::Result;
use crate::estimation::estimate_moments;
use crate::estimation::MomentEstimates;
use crate::performance::rolling_correlation;
use crate::performance::PerformanceAnalyzer;
use crate::performance::PerformanceReport;
use crate::portfolio::efficient_frontier;
use crate::portfolio::optimize;
use crate::portfolio::summarize;
use crate::portfolio::FrontierPoint;
use crate::portfolio::OptimizerConfig;
use crate::portfolio::PortfolioResult;
use crate::portfolio::Strategy;
use crate::returns::ReturnSeries;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioEngineConfig {
  /// Strategies evaluated by [`PortfolioEngine::optimize_all`] and [`PortfolioEngine::compare`].
  pub strategies: Vec<Strategy>,
  pub optimizer: OptimizerConfig,
  pub backtest: BacktestConfig,
  /// Window length of the rolling Sharpe and benchmark correlation series.
  pub rolling_window: usize,
}

impl Default for PortfolioEngineConfig {
  fn default() -> Self {
    Self {
      strategies: Strategy::ALL.to_vec(),
      optimizer: OptimizerConfig::default(),
      backtest: BacktestConfig::default(),
      rolling_window: 252,
    }
  }
}

impl PortfolioEngineConfig {
  /// Parse a JSON document; missing fields take their defaults.
  pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
    serde_json::from_str(json).context("failed to parse portfolio engine config")
  }

  /// Read and parse a JSON config file.
  pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)
      .with_context(|| format!("failed to read config file {path:?}"))?;
    Self::from_json_str(&json).with_context(|| format!("invalid config file {path:?}"))
  }
}

/// Backtest outcome and metrics of one strategy.
#[derive(Clone, Debug, Serialize)]
pub struct StrategyReport {
  pub strategy: Strategy,
  pub report: PerformanceReport,
  pub rolling_sharpe: Vec<(NaiveDate, f64)>,
  /// Present when the series carries a benchmark.
  pub rolling_benchmark_correlation: Option<Vec<(NaiveDate, f64)>>,
  pub backtest: BacktestResult,
}

/// Strategy reports ranked by Sharpe ratio (NaN last), plus the benchmark's own report.
#[derive(Clone, Debug, Serialize)]
pub struct StrategyComparison {
  pub strategies: Vec<StrategyReport>,
  pub benchmark: Option<PerformanceReport>,
}

impl StrategyComparison {
  /// Highest-Sharpe strategy.
  pub fn best(&self) -> Option<&StrategyReport> {
    self.strategies.first()
  }

  /// Report of `strategy`, if it was compared.
  pub fn get(&self, strategy: Strategy) -> Option<&StrategyReport> {
    self.strategies.iter().find(|s| s.strategy == strategy)
  }
}

fn by_sharpe_desc(a: f64, b: f64) -> Ordering {
  match (a.is_nan(), b.is_nan()) {
    (true, true) => Ordering::Equal,
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    (false, false) => b.total_cmp(&a),
  }
}

/// Single entry-point engine for allocation workflows.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Analyzer using the backtest frequency and the optimizer's risk-free rate.
  pub fn analyzer(&self) -> PerformanceAnalyzer {
    PerformanceAnalyzer::new(
      self.config.backtest.periods_per_year,
      self.config.optimizer.risk_free_rate,
    )
  }

  fn backtest_engine(&self) -> BacktestEngine {
    BacktestEngine::new(self.config.backtest.clone(), self.config.optimizer.clone())
  }

  /// Full-sample annualized moments of `series`.
  pub fn estimate(&self, series: &ReturnSeries) -> Result<MomentEstimates> {
    Ok(
      estimate_moments(series.assets(), series.returns())?
        .annualize(self.config.backtest.periods_per_year),
    )
  }

  /// One-shot optimization; errors propagate to the caller.
  pub fn optimize(&self, strategy: Strategy, estimates: &MomentEstimates) -> Result<PortfolioResult> {
    let weights = optimize(strategy, estimates, &self.config.optimizer)?;
    Ok(summarize(
      strategy,
      weights,
      estimates,
      self.config.optimizer.risk_free_rate,
    ))
  }

  /// Optimize every configured strategy in parallel.
  pub fn optimize_all(&self, estimates: &MomentEstimates) -> Vec<(Strategy, Result<PortfolioResult>)> {
    self
      .config
      .strategies
      .par_iter()
      .map(|&strategy| (strategy, self.optimize(strategy, estimates)))
      .collect()
  }

  /// Walk-forward backtest of one strategy.
  pub fn backtest(&self, series: &ReturnSeries, strategy: Strategy) -> Result<BacktestResult> {
    self.backtest_engine().run(series, strategy)
  }

  /// Frontier of `points` portfolios under the configured optimizer settings.
  pub fn efficient_frontier(
    &self,
    estimates: &MomentEstimates,
    points: usize,
  ) -> Result<Vec<FrontierPoint>> {
    efficient_frontier(estimates, &self.config.optimizer, points)
  }

  fn strategy_report(&self, backtest: BacktestResult) -> Result<StrategyReport> {
    let analyzer = self.analyzer();
    let window = self.config.rolling_window;
    let rolling_benchmark_correlation = backtest
      .benchmark
      .as_ref()
      .map(|bench| rolling_correlation(&backtest.returns, bench, window))
      .transpose()?;

    Ok(StrategyReport {
      strategy: backtest.strategy,
      report: analyzer.report(&backtest.returns),
      rolling_sharpe: analyzer.rolling_sharpe(&backtest.returns, window),
      rolling_benchmark_correlation,
      backtest,
    })
  }

  /// Backtest every configured strategy in parallel and rank them by Sharpe ratio.
  pub fn compare(&self, series: &ReturnSeries) -> Result<StrategyComparison> {
    let engine = self.backtest_engine();
    let mut strategies = self
      .config
      .strategies
      .par_iter()
      .map(|&strategy| {
        engine
          .run(series, strategy)
          .and_then(|bt| self.strategy_report(bt))
      })
      .collect::<Result<Vec<_>>>()?;

    strategies.sort_by(|a, b| by_sharpe_desc(a.report.sharpe_ratio, b.report.sharpe_ratio));

    let benchmark = strategies
      .first()
      .and_then(|s| s.backtest.benchmark.as_ref())
      .map(|bench| self.analyzer().report(bench));

    Ok(StrategyComparison {
      strategies,
      benchmark,
    })
  }
}
