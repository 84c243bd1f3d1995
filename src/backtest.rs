//! # Backtest
//!
//! $$
//! r^{p}_t=\mathbf{w}_{k(t)}^\top\mathbf{r}_t,\qquad
//! \mathbf{w}_k=\mathcal{O}\big(\hat\mu,\hat\Sigma \mid \mathbf{r}_{s_k-W},\dots,\mathbf{r}_{s_k-1}\big)
//! $$
//!
//! Walk-forward backtest: weights for the holding period starting at row `s_k`
//! are estimated only from the `W` rows strictly before it.

use chrono::Datelike;
use chrono::NaiveDate;
use ndarray::s;
use serde::Deserialize;
use serde::Serialize;
use serde::Serializer;
use tracing::debug;
use tracing::warn;

use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimation::estimate_moments;
use crate::portfolio::optimize;
use crate::portfolio::OptimizerConfig;
use crate::portfolio::Strategy;
use crate::portfolio::WeightVector;
use crate::returns::ReturnSeries;

/// How often the optimizer is re-run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebalanceFrequency {
  /// Every row.
  EveryPeriod,
  /// First row of each calendar month.
  Monthly,
  Quarterly,
  Annual,
  /// Every `n` rows.
  Periods(usize),
  /// Estimate once, hold to the end.
  Static,
}

impl RebalanceFrequency {
  /// Whether row `t` opens a new holding period given the previous row's date.
  fn starts_period(self, prev: NaiveDate, date: NaiveDate, offset: usize) -> bool {
    match self {
      RebalanceFrequency::EveryPeriod => true,
      RebalanceFrequency::Monthly => (prev.year(), prev.month()) != (date.year(), date.month()),
      RebalanceFrequency::Quarterly => {
        (prev.year(), prev.month0() / 3) != (date.year(), date.month0() / 3)
      }
      RebalanceFrequency::Annual => prev.year() != date.year(),
      RebalanceFrequency::Periods(n) => offset % n == 0,
      RebalanceFrequency::Static => false,
    }
  }
}

/// Walk-forward backtest settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
  /// Trailing rows used for each estimate; also the warm-up length.
  pub estimation_window: usize,
  pub rebalance: RebalanceFrequency,
  /// Annualization factor applied to the moment estimates.
  pub periods_per_year: usize,
}

impl Default for BacktestConfig {
  fn default() -> Self {
    Self {
      estimation_window: 252,
      rebalance: RebalanceFrequency::Monthly,
      periods_per_year: 252,
    }
  }
}

/// Realized per-period portfolio returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioReturnSeries {
  timestamps: Vec<NaiveDate>,
  returns: Vec<f64>,
}

impl PortfolioReturnSeries {
  /// Pair dates with returns; both must have the same length.
  pub fn new(timestamps: Vec<NaiveDate>, returns: Vec<f64>) -> Result<Self> {
    if timestamps.len() != returns.len() {
      return Err(PortfolioError::InvalidInput(format!(
        "{} timestamps for {} returns",
        timestamps.len(),
        returns.len()
      )));
    }
    Ok(Self {
      timestamps,
      returns,
    })
  }

  pub fn timestamps(&self) -> &[NaiveDate] {
    &self.timestamps
  }

  pub fn returns(&self) -> &[f64] {
    &self.returns
  }

  pub fn len(&self) -> usize {
    self.returns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.returns.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
    self
      .timestamps
      .iter()
      .copied()
      .zip(self.returns.iter().copied())
  }
}

/// Where a holding period's weights came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightSource {
  Optimized,
  /// Rebalance failed; the previous period's weights were kept.
  CarriedForward,
  /// First rebalance failed; `1/N` was used.
  EqualWeightFallback,
}

/// Weights chosen at one rebalance date.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RebalanceRecord {
  /// First date of the holding period.
  pub date: NaiveDate,
  pub weights: WeightVector,
  pub source: WeightSource,
}

/// A rebalance that failed and was absorbed by the fallback policy.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BacktestWarning {
  pub date: NaiveDate,
  #[serde(serialize_with = "serialize_error")]
  pub error: PortfolioError,
}

fn serialize_error<S: Serializer>(error: &PortfolioError, serializer: S) -> std::result::Result<S::Ok, S::Error> {
  serializer.collect_str(error)
}

#[derive(Clone, Debug, Serialize)]
pub struct BacktestResult {
  pub strategy: Strategy,
  pub returns: PortfolioReturnSeries,
  /// One entry per holding period, in date order.
  pub rebalances: Vec<RebalanceRecord>,
  pub warnings: Vec<BacktestWarning>,
  /// Benchmark returns on the same timestamps as `returns`.
  pub benchmark: Option<PortfolioReturnSeries>,
}

impl BacktestResult {
  /// Weights in force on `date`.
  pub fn weights_at(&self, date: NaiveDate) -> Option<&WeightVector> {
    self
      .rebalances
      .iter()
      .take_while(|r| r.date <= date)
      .last()
      .map(|r| &r.weights)
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BacktestState {
  AwaitingEstimation,
  Rebalancing,
  Holding,
  Done,
}

/// Walk-forward backtester over a [`ReturnSeries`].
#[derive(Clone, Debug, Default)]
pub struct BacktestEngine {
  config: BacktestConfig,
  optimizer: OptimizerConfig,
}

impl BacktestEngine {
  /// Construct a backtester from its schedule and optimizer settings.
  pub fn new(config: BacktestConfig, optimizer: OptimizerConfig) -> Self {
    Self { config, optimizer }
  }

  /// Borrow the backtest configuration.
  pub fn config(&self) -> &BacktestConfig {
    &self.config
  }

  /// Borrow the optimizer configuration used at each rebalance.
  pub fn optimizer(&self) -> &OptimizerConfig {
    &self.optimizer
  }

  /// Weights for a holding period starting at row `start`, from rows `[start - W, start)` only.
  fn target_weights(
    &self,
    series: &ReturnSeries,
    strategy: Strategy,
    start: usize,
  ) -> Result<WeightVector> {
    let window = series.window(start - self.config.estimation_window, start);
    let estimates =
      estimate_moments(series.assets(), window)?.annualize(self.config.periods_per_year);
    optimize(strategy, &estimates, &self.optimizer)
  }

  fn validate(&self, series: &ReturnSeries) -> Result<()> {
    let window = self.config.estimation_window;
    if window < 2 {
      return Err(PortfolioError::InsufficientData {
        required: 2,
        available: window,
      });
    }
    if series.len() <= window {
      return Err(PortfolioError::InsufficientData {
        required: window + 1,
        available: series.len(),
      });
    }
    if self.config.periods_per_year == 0 {
      return Err(PortfolioError::InvalidInput(
        "periods_per_year must be positive".into(),
      ));
    }
    if self.config.rebalance == RebalanceFrequency::Periods(0) {
      return Err(PortfolioError::InvalidInput(
        "rebalance period length must be positive".into(),
      ));
    }
    Ok(())
  }

  /// Walk `series` forward, rebalancing into `strategy` at every period boundary.
  pub fn run(&self, series: &ReturnSeries, strategy: Strategy) -> Result<BacktestResult> {
    self.validate(series)?;

    let window = self.config.estimation_window;
    let total = series.len();
    let dates = series.timestamps();
    let assets = series.assets().to_vec();

    let mut returns = Vec::with_capacity(total - window);
    let mut rebalances: Vec<RebalanceRecord> = Vec::new();
    let mut warnings = Vec::new();

    let mut state = BacktestState::AwaitingEstimation;
    let mut t = 0;
    loop {
      let next = match state {
        BacktestState::AwaitingEstimation => {
          t = window;
          BacktestState::Rebalancing
        }
        BacktestState::Rebalancing => {
          let date = dates[t];
          let record = match self.target_weights(series, strategy, t) {
            Ok(weights) => RebalanceRecord {
              date,
              weights,
              source: WeightSource::Optimized,
            },
            Err(error) => {
              let record = match rebalances.last() {
                Some(prev) => {
                  warn!(%date, %strategy, %error, "rebalance failed, carrying previous weights forward");
                  RebalanceRecord {
                    date,
                    weights: prev.weights.clone(),
                    source: WeightSource::CarriedForward,
                  }
                }
                None => {
                  warn!(%date, %strategy, %error, "initial rebalance failed, falling back to equal weights");
                  RebalanceRecord {
                    date,
                    weights: WeightVector::equal(assets.clone())?,
                    source: WeightSource::EqualWeightFallback,
                  }
                }
              };
              warnings.push(BacktestWarning { date, error });
              record
            }
          };
          rebalances.push(record);
          BacktestState::Holding
        }
        BacktestState::Holding => {
          if let Some(current) = rebalances.last() {
            returns.push(current.weights.weights().dot(&series.row(t)));
          }
          t += 1;
          if t == total {
            BacktestState::Done
          } else if self
            .config
            .rebalance
            .starts_period(dates[t - 1], dates[t], t - window)
          {
            BacktestState::Rebalancing
          } else {
            BacktestState::Holding
          }
        }
        BacktestState::Done => break,
      };

      if next != state && next != BacktestState::Holding {
        debug!(from = ?state, to = ?next, row = t, "backtest state transition");
      }
      state = next;
    }

    let timestamps = dates[window..].to_vec();
    let benchmark = series
      .benchmark()
      .map(|b| PortfolioReturnSeries::new(timestamps.clone(), b.slice(s![window..]).to_vec()))
      .transpose()?;

    Ok(BacktestResult {
      strategy,
      returns: PortfolioReturnSeries::new(timestamps, returns)?,
      rebalances,
      warnings,
      benchmark,
    })
  }
}
