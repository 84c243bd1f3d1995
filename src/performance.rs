//! # Performance
//!
//! $$
//! R_{ann}=\Big(\prod_{t=1}^{T}(1+r_t)\Big)^{P/T}-1,\qquad
//! \text{Sharpe}=\frac{R_{ann}-r_f}{\hat\sigma\sqrt{P}}
//! $$
//!
//! Scalar and rolling risk/return statistics of a periodic return series.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::backtest::PortfolioReturnSeries;
use crate::error::PortfolioError;
use crate::error::Result;

/// Wealth curve of one unit invested at the start.
pub fn cumulative_returns(returns: &[f64]) -> Vec<f64> {
  returns
    .iter()
    .scan(1.0, |wealth, &r| {
      *wealth *= 1.0 + r;
      Some(*wealth)
    })
    .collect()
}

/// Drawdown of the wealth curve from its running peak (initial capital counts as a peak).
pub fn drawdowns(returns: &[f64]) -> Vec<f64> {
  let mut peak = 1.0_f64;
  cumulative_returns(returns)
    .into_iter()
    .map(|wealth| {
      peak = peak.max(wealth);
      wealth / peak - 1.0
    })
    .collect()
}

/// Most negative drawdown; `0.0` for a non-decreasing wealth curve.
pub fn max_drawdown(returns: &[f64]) -> f64 {
  drawdowns(returns).into_iter().fold(0.0, f64::min)
}

/// Compounded return over the whole series.
pub fn total_return(returns: &[f64]) -> f64 {
  returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
}

/// Named scalar metrics of one return series.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceReport {
  pub annualized_return: f64,
  pub annualized_volatility: f64,
  pub sharpe_ratio: f64,
  /// Always `<= 0`.
  pub max_drawdown: f64,
  pub calmar_ratio: f64,
  pub total_return: f64,
  pub periods: usize,
}

impl PerformanceReport {
  /// Metric name to value, in a stable order.
  pub fn metrics(&self) -> BTreeMap<&'static str, f64> {
    BTreeMap::from([
      ("Annualized Return", self.annualized_return),
      ("Annualized Volatility", self.annualized_volatility),
      ("Sharpe Ratio", self.sharpe_ratio),
      ("Max Drawdown", self.max_drawdown),
      ("Calmar Ratio", self.calmar_ratio),
      ("Total Return", self.total_return),
    ])
  }
}

/// Annualization and risk-free settings for the metrics.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct PerformanceAnalyzer {
  /// Return periods per year (252 for daily, 12 for monthly).
  pub periods_per_year: usize,
  /// Annual risk-free rate.
  pub risk_free_rate: f64,
}

impl Default for PerformanceAnalyzer {
  fn default() -> Self {
    Self::new(252, 0.02)
  }
}

impl PerformanceAnalyzer {
  /// Geometric annualized return; NaN for an empty series.
  pub fn annualized_return(&self, returns: &[f64]) -> f64 {
    if returns.is_empty() {
      return f64::NAN;
    }
    let growth = 1.0 + total_return(returns);
    growth.powf(self.periods_per_year as f64 / returns.len() as f64) - 1.0
  }

  /// Sample standard deviation scaled by `sqrt(periods_per_year)`; NaN below two observations.
  ///
  /// A constant series has exactly zero volatility regardless of rounding in the variance.
  pub fn annualized_volatility(&self, returns: &[f64]) -> f64 {
    if let [first, rest @ ..] = returns {
      if !rest.is_empty() && rest.iter().all(|r| r == first) {
        return 0.0;
      }
    }
    returns.std_dev() * (self.periods_per_year as f64).sqrt()
  }

  /// NaN when volatility is exactly zero.
  pub fn sharpe_ratio(&self, returns: &[f64]) -> f64 {
    let vol = self.annualized_volatility(returns);
    if vol == 0.0 {
      return f64::NAN;
    }
    (self.annualized_return(returns) - self.risk_free_rate) / vol
  }

  /// NaN when the max drawdown is exactly zero.
  pub fn calmar_ratio(&self, returns: &[f64]) -> f64 {
    let mdd = max_drawdown(returns);
    if mdd == 0.0 {
      return f64::NAN;
    }
    self.annualized_return(returns) / mdd.abs()
  }

  /// Scalar metrics of a backtest's return series.
  pub fn report(&self, series: &PortfolioReturnSeries) -> PerformanceReport {
    self.report_returns(series.returns())
  }

  /// Scalar metrics of raw per-period returns.
  pub fn report_returns(&self, returns: &[f64]) -> PerformanceReport {
    PerformanceReport {
      annualized_return: self.annualized_return(returns),
      annualized_volatility: self.annualized_volatility(returns),
      sharpe_ratio: self.sharpe_ratio(returns),
      max_drawdown: max_drawdown(returns),
      calmar_ratio: self.calmar_ratio(returns),
      total_return: total_return(returns),
      periods: returns.len(),
    }
  }

  /// Sharpe ratio over each trailing window.
  pub fn rolling_sharpe(&self, series: &PortfolioReturnSeries, window: usize) -> Vec<(NaiveDate, f64)> {
    rolling(series, window, |w| self.sharpe_ratio(w))
  }

  /// Annualized volatility over each trailing window.
  pub fn rolling_volatility(&self, series: &PortfolioReturnSeries, window: usize) -> Vec<(NaiveDate, f64)> {
    rolling(series, window, |w| self.annualized_volatility(w))
  }

  /// Annualized return over each trailing window.
  pub fn rolling_return(&self, series: &PortfolioReturnSeries, window: usize) -> Vec<(NaiveDate, f64)> {
    rolling(series, window, |w| self.annualized_return(w))
  }

  /// Max drawdown within each trailing window, measured from the window's start.
  pub fn rolling_max_drawdown(&self, series: &PortfolioReturnSeries, window: usize) -> Vec<(NaiveDate, f64)> {
    rolling(series, window, max_drawdown)
  }
}

/// Apply `metric` to every window of `window` consecutive returns, stamped with the window's last date.
fn rolling<F>(series: &PortfolioReturnSeries, window: usize, metric: F) -> Vec<(NaiveDate, f64)>
where
  F: Fn(&[f64]) -> f64,
{
  if window == 0 || series.len() < window {
    return Vec::new();
  }

  series
    .returns()
    .windows(window)
    .zip(&series.timestamps()[window - 1..])
    .map(|(w, &date)| (date, metric(w)))
    .collect()
}

/// Rolling Pearson correlation between a portfolio and a benchmark on the same timeline.
pub fn rolling_correlation(
  series: &PortfolioReturnSeries,
  benchmark: &PortfolioReturnSeries,
  window: usize,
) -> Result<Vec<(NaiveDate, f64)>> {
  if series.timestamps() != benchmark.timestamps() {
    return Err(PortfolioError::InvalidInput(
      "portfolio and benchmark timelines differ".into(),
    ));
  }
  if window == 0 || series.len() < window {
    return Ok(Vec::new());
  }

  let a = series.returns();
  let b = benchmark.returns();
  Ok(
    (window - 1..series.len())
      .map(|end| {
        let xs = &a[end + 1 - window..=end];
        let ys = &b[end + 1 - window..=end];
        let denom = xs.std_dev() * ys.std_dev();
        let corr = if denom > 0.0 {
          xs.covariance(ys) / denom
        } else {
          f64::NAN
        };
        (series.timestamps()[end], corr)
      })
      .collect(),
  )
}
