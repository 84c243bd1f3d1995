//! Property tests for allocation, backtest and drawdown invariants.

use chrono::NaiveDate;
use ndarray::Array1;
use ndarray::Array2;
use portfolio_rs::backtest::BacktestConfig;
use portfolio_rs::backtest::BacktestEngine;
use portfolio_rs::backtest::RebalanceFrequency;
use portfolio_rs::estimation::MomentEstimates;
use portfolio_rs::performance::drawdowns;
use portfolio_rs::performance::max_drawdown;
use portfolio_rs::portfolio::optimize;
use portfolio_rs::portfolio::optimize_equal_weight;
use portfolio_rs::portfolio::optimize_min_variance;
use portfolio_rs::portfolio::OptimizerConfig;
use portfolio_rs::portfolio::Strategy as Allocation;
use portfolio_rs::returns::ReturnSeries;
use proptest::prelude::*;

fn asset_ids(n: usize) -> Vec<String> {
  (0..n).map(|i| format!("A{i}")).collect()
}

fn dates(count: usize) -> Vec<NaiveDate> {
  let start = NaiveDate::from_ymd_opt(2019, 1, 1).unwrap();
  (0..count)
    .map(|d| start + chrono::Duration::days(d as i64))
    .collect()
}

/// Positive-definite covariance `0.01 (A A' + 0.1 I)` with means in `[-0.05, 0.2]`.
fn moments() -> impl Strategy<Value = MomentEstimates> {
  (2usize..6).prop_flat_map(|n| {
    (
      prop::collection::vec(-1.0..1.0f64, n * n),
      prop::collection::vec(-0.05..0.2f64, n),
    )
      .prop_map(move |(a, mu)| {
        let a = Array2::from_shape_vec((n, n), a).unwrap();
        let cov = (a.dot(&a.t()) + Array2::<f64>::eye(n) * 0.1) * 0.01;
        MomentEstimates::new(asset_ids(n), Array1::from(mu), cov).unwrap()
      })
  })
}

fn return_table(rows: usize, cols: usize) -> impl Strategy<Value = Array2<f64>> {
  prop::collection::vec(-0.05..0.05f64, rows * cols)
    .prop_map(move |v| Array2::from_shape_vec((rows, cols), v).unwrap())
}

fn frequency() -> impl Strategy<Value = RebalanceFrequency> {
  prop_oneof![
    Just(RebalanceFrequency::EveryPeriod),
    Just(RebalanceFrequency::Monthly),
    Just(RebalanceFrequency::Quarterly),
    Just(RebalanceFrequency::Annual),
    Just(RebalanceFrequency::Static),
    (1usize..30).prop_map(RebalanceFrequency::Periods),
  ]
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(48))]

  #[test]
  fn optimized_weights_are_fully_invested(estimates in moments(), long_only in any::<bool>()) {
    let config = OptimizerConfig { long_only, ..OptimizerConfig::default() };

    for strategy in Allocation::ALL {
      match optimize(strategy, &estimates, &config) {
        Ok(w) => {
          prop_assert!((w.weights().sum() - 1.0).abs() <= 1e-9);
          if long_only || !strategy.supports_short() {
            prop_assert!(w.weights().iter().all(|&x| x >= 0.0));
          }
        }
        Err(err) => {
          prop_assert_eq!(strategy, Allocation::Tangency, "{}", err);
        }
      }
    }
  }

  #[test]
  fn equal_weight_is_exact(n in 1usize..50) {
    let estimates = MomentEstimates::new(asset_ids(n), Array1::zeros(n), Array2::eye(n)).unwrap();
    let w = optimize_equal_weight(&estimates).unwrap();

    prop_assert!(w.weights().iter().all(|&x| x == 1.0 / n as f64));
  }

  #[test]
  fn risk_parity_on_identical_uncorrelated_assets_is_equal(n in 2usize..12, var in 0.001..1.0f64) {
    let estimates = MomentEstimates::new(asset_ids(n), Array1::zeros(n), Array2::eye(n) * var).unwrap();
    let w = optimize(Allocation::RiskParity, &estimates, &OptimizerConfig::default()).unwrap();

    for &x in w.weights() {
      prop_assert!((x - 1.0 / n as f64).abs() < 1e-9);
    }
  }

  #[test]
  fn min_variance_ignores_covariance_scale(
    estimates in moments(),
    k in 0.01..100.0f64,
    long_only in any::<bool>(),
  ) {
    let config = OptimizerConfig { long_only, ..OptimizerConfig::default() };
    let scaled = MomentEstimates::new(
      estimates.assets().to_vec(),
      estimates.mean().clone(),
      estimates.covariance() * k,
    )
    .unwrap();

    let base = optimize_min_variance(&estimates, &config).unwrap();
    let other = optimize_min_variance(&scaled, &config).unwrap();
    for (a, b) in base.weights().iter().zip(other.weights()) {
      prop_assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    }
  }

  #[test]
  fn backtest_drops_exactly_the_warmup(
    table in (40usize..160).prop_flat_map(|t| return_table(t, 3)),
    window in 5usize..30,
    rebalance in frequency(),
  ) {
    let t = table.nrows();
    let series = ReturnSeries::builder(dates(t), asset_ids(3), table).build().unwrap();
    let engine = BacktestEngine::new(
      BacktestConfig { estimation_window: window, rebalance, periods_per_year: 252 },
      OptimizerConfig::default(),
    );
    let result = engine.run(&series, Allocation::EqualWeight).unwrap();

    prop_assert_eq!(result.returns.len(), t - window);
    prop_assert_eq!(result.returns.timestamps(), &series.timestamps()[window..]);
  }

  #[test]
  fn rebalance_weights_ignore_later_returns(
    table in return_table(90, 3),
    shock in return_table(90, 3),
    cut in 30usize..90,
  ) {
    let engine = BacktestEngine::new(
      BacktestConfig {
        estimation_window: 20,
        rebalance: RebalanceFrequency::Periods(10),
        periods_per_year: 252,
      },
      OptimizerConfig::default(),
    );
    let mut perturbed = table.clone();
    for r in cut..90 {
      for c in 0..3 {
        perturbed[[r, c]] += shock[[r, c]];
      }
    }

    let base = ReturnSeries::builder(dates(90), asset_ids(3), table).build().unwrap();
    let other = ReturnSeries::builder(dates(90), asset_ids(3), perturbed).build().unwrap();
    let a = engine.run(&base, Allocation::RiskParity).unwrap();
    let b = engine.run(&other, Allocation::RiskParity).unwrap();

    let cut_date = base.timestamps()[cut];
    for (x, y) in a.rebalances.iter().zip(&b.rebalances) {
      if x.date <= cut_date {
        prop_assert_eq!(&x.weights, &y.weights);
      }
    }
  }

  #[test]
  fn drawdown_is_never_positive(returns in prop::collection::vec(-0.5..0.5f64, 0..200)) {
    prop_assert!(max_drawdown(&returns) <= 0.0);
    prop_assert!(drawdowns(&returns).iter().all(|&d| d <= 0.0));
  }

  #[test]
  fn rising_wealth_has_no_drawdown(returns in prop::collection::vec(0.0..0.1f64, 1..100)) {
    prop_assert_eq!(max_drawdown(&returns), 0.0);
  }
}
