//! # Return Series
//!
//! $$
//! r_{t,i} = \frac{p_{t,i}}{p_{t-1,i}} - 1
//! $$
//!
//! Validated table of periodic asset returns with an optional benchmark column.

use std::collections::HashSet;

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;
use ndarray::s;

use crate::error::PortfolioError;
use crate::error::Result;

/// Periodic returns per asset on a common, strictly increasing timeline.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
  timestamps: Vec<NaiveDate>,
  assets: Vec<String>,
  /// `T x N`, one row per timestamp.
  returns: Array2<f64>,
  benchmark: Option<Array1<f64>>,
  degenerate: Vec<String>,
}

/// Collects the pieces of a [`ReturnSeries`] and validates them in [`build`](Self::build).
#[derive(Clone, Debug)]
pub struct ReturnSeriesBuilder {
  timestamps: Vec<NaiveDate>,
  assets: Vec<String>,
  returns: Array2<f64>,
  benchmark: Option<Array1<f64>>,
  degenerate: Vec<String>,
}

impl ReturnSeriesBuilder {
  /// Attach benchmark returns, one per timestamp.
  pub fn benchmark(mut self, benchmark: impl Into<Array1<f64>>) -> Self {
    self.benchmark = Some(benchmark.into());
    self
  }

  /// Allow `asset` to have a zero-variance return column (e.g. a cash sleeve).
  pub fn allow_degenerate(mut self, asset: impl Into<String>) -> Self {
    self.degenerate.push(asset.into());
    self
  }

  pub fn build(self) -> Result<ReturnSeries> {
    let (t, n) = self.returns.dim();

    if n == 0 {
      return Err(PortfolioError::InvalidReturnSeries(
        "at least one asset is required".into(),
      ));
    }
    if self.assets.len() != n {
      return Err(PortfolioError::InvalidReturnSeries(format!(
        "{} asset ids for {} return columns",
        self.assets.len(),
        n
      )));
    }
    if self.timestamps.len() != t {
      return Err(PortfolioError::InvalidReturnSeries(format!(
        "{} timestamps for {} return rows",
        self.timestamps.len(),
        t
      )));
    }

    let mut seen = HashSet::with_capacity(n);
    for asset in &self.assets {
      if !seen.insert(asset.as_str()) {
        return Err(PortfolioError::InvalidReturnSeries(format!(
          "duplicate asset id '{asset}'"
        )));
      }
    }
    for asset in &self.degenerate {
      if !seen.contains(asset.as_str()) {
        return Err(PortfolioError::InvalidReturnSeries(format!(
          "degenerate flag for unknown asset '{asset}'"
        )));
      }
    }

    if let Some(w) = self.timestamps.windows(2).find(|w| w[0] >= w[1]) {
      return Err(PortfolioError::InvalidReturnSeries(format!(
        "timestamps not strictly increasing at {} -> {}",
        w[0], w[1]
      )));
    }

    if let Some(((row, col), value)) = self.returns.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(PortfolioError::InvalidReturnSeries(format!(
        "non-finite return {value} for '{}' at {}",
        self.assets[col], self.timestamps[row]
      )));
    }

    if let Some(benchmark) = &self.benchmark {
      if benchmark.len() != t {
        return Err(PortfolioError::InvalidReturnSeries(format!(
          "{} benchmark returns for {} rows",
          benchmark.len(),
          t
        )));
      }
      if benchmark.iter().any(|v| !v.is_finite()) {
        return Err(PortfolioError::InvalidReturnSeries(
          "benchmark contains non-finite returns".into(),
        ));
      }
    }

    if t >= 2 {
      for (col, column) in self.returns.axis_iter(Axis(1)).enumerate() {
        let first = column[0];
        let flat = column.iter().all(|&v| v == first);
        if flat && !self.degenerate.contains(&self.assets[col]) {
          return Err(PortfolioError::InvalidReturnSeries(format!(
            "asset '{}' has zero return variance and is not flagged as degenerate",
            self.assets[col]
          )));
        }
      }
    }

    Ok(ReturnSeries {
      timestamps: self.timestamps,
      assets: self.assets,
      returns: self.returns,
      benchmark: self.benchmark,
      degenerate: self.degenerate,
    })
  }
}

impl ReturnSeries {
  /// Start building a series from a `T x N` return table.
  pub fn builder(
    timestamps: Vec<NaiveDate>,
    assets: Vec<String>,
    returns: Array2<f64>,
  ) -> ReturnSeriesBuilder {
    ReturnSeriesBuilder {
      timestamps,
      assets,
      returns,
      benchmark: None,
      degenerate: Vec::new(),
    }
  }

  /// Convert a `T x N` price table into simple returns.
  ///
  /// The first row is consumed, so the series starts at `timestamps[1]`.
  pub fn from_prices(
    timestamps: Vec<NaiveDate>,
    assets: Vec<String>,
    prices: ArrayView2<f64>,
    benchmark_prices: Option<ArrayView1<f64>>,
  ) -> Result<Self> {
    let (t, _) = prices.dim();
    if t < 2 {
      return Err(PortfolioError::InsufficientData {
        required: 2,
        available: t,
      });
    }
    if timestamps.len() != t {
      return Err(PortfolioError::InvalidReturnSeries(format!(
        "{} timestamps for {} price rows",
        timestamps.len(),
        t
      )));
    }
    if prices.iter().any(|&p| !(p.is_finite() && p > 0.0)) {
      return Err(PortfolioError::InvalidReturnSeries(
        "prices must be finite and strictly positive".into(),
      ));
    }

    let returns = &prices.slice(s![1.., ..]) / &prices.slice(s![..-1, ..]) - 1.0;
    let mut builder = Self::builder(timestamps[1..].to_vec(), assets, returns);

    if let Some(bench) = benchmark_prices {
      if bench.len() != t {
        return Err(PortfolioError::InvalidReturnSeries(format!(
          "{} benchmark prices for {} rows",
          bench.len(),
          t
        )));
      }
      if bench.iter().any(|&p| !(p.is_finite() && p > 0.0)) {
        return Err(PortfolioError::InvalidReturnSeries(
          "benchmark prices must be finite and strictly positive".into(),
        ));
      }
      let bench_returns = &bench.slice(s![1..]) / &bench.slice(s![..-1]) - 1.0;
      builder = builder.benchmark(bench_returns);
    }

    builder.build()
  }

  /// Number of rows.
  pub fn len(&self) -> usize {
    self.timestamps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.timestamps.is_empty()
  }

  pub fn n_assets(&self) -> usize {
    self.assets.len()
  }

  pub fn timestamps(&self) -> &[NaiveDate] {
    &self.timestamps
  }

  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  /// Full `T x N` return table.
  pub fn returns(&self) -> ArrayView2<'_, f64> {
    self.returns.view()
  }

  /// Returns of row `t`, one entry per asset.
  pub fn row(&self, t: usize) -> ArrayView1<'_, f64> {
    self.returns.row(t)
  }

  /// Rows `start..end` of the return table.
  pub fn window(&self, start: usize, end: usize) -> ArrayView2<'_, f64> {
    self.returns.slice(s![start..end, ..])
  }

  pub fn benchmark(&self) -> Option<ArrayView1<'_, f64>> {
    self.benchmark.as_ref().map(|b| b.view())
  }

  /// Assets explicitly allowed to carry zero variance.
  pub fn degenerate_assets(&self) -> &[String] {
    &self.degenerate
  }
}
