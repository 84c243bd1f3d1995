use std::hint::black_box;
use std::time::Duration;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use ndarray::Array1;
use ndarray::Array2;
use portfolio_rs::estimation::MomentEstimates;
use portfolio_rs::portfolio::OptimizerConfig;
use portfolio_rs::portfolio::Strategy;
use portfolio_rs::portfolio::efficient_frontier;
use portfolio_rs::portfolio::optimize;

/// Deterministic block-correlated universe with dispersed means.
fn universe(n: usize) -> MomentEstimates {
  let vols = Array1::from_shape_fn(n, |i| 0.12 + 0.25 * (i as f64 / n as f64));
  let cov = Array2::from_shape_fn((n, n), |(i, j)| {
    let rho = if i == j {
      1.0
    } else if i % 4 == j % 4 {
      0.6
    } else {
      0.2
    };
    rho * vols[i] * vols[j]
  });
  let mean = Array1::from_shape_fn(n, |i| 0.03 + 0.1 * ((i * 7 % n) as f64 / n as f64));
  let assets = (0..n).map(|i| format!("A{i}")).collect();
  MomentEstimates::new(assets, mean, cov).unwrap()
}

fn bench_strategies(c: &mut Criterion) {
  let mut group = c.benchmark_group("Optimizers");
  group.measurement_time(Duration::from_secs(3));
  group.warm_up_time(Duration::from_millis(500));

  for &n in &[10usize, 50, 200] {
    let estimates = universe(n);
    for long_only in [true, false] {
      let config = OptimizerConfig {
        long_only,
        ..OptimizerConfig::default()
      };
      for strategy in Strategy::ALL {
        if !long_only && !strategy.supports_short() {
          continue;
        }
        let id = format!("{strategy}/{}", if long_only { "long" } else { "short" });
        group.bench_with_input(BenchmarkId::new(id, n), &n, |b, _| {
          b.iter(|| black_box(optimize(strategy, &estimates, &config)));
        });
      }
    }
  }

  group.finish();
}

fn bench_frontier(c: &mut Criterion) {
  let mut group = c.benchmark_group("EfficientFrontier");
  group.measurement_time(Duration::from_secs(3));

  for &n in &[10usize, 50] {
    let estimates = universe(n);
    let config = OptimizerConfig::default();
    group.bench_with_input(BenchmarkId::new("long_only/20", n), &n, |b, _| {
      b.iter(|| black_box(efficient_frontier(&estimates, &config, 20)));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_strategies, bench_frontier);
criterion_main!(benches);
