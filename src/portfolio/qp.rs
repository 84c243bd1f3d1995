//! # Non-negative QP
//!
//! $$
//! \min_{\mathbf{x}\ge 0}\ \mathbf{x}^\top Q\mathbf{x}\quad
//! \text{s.t.}\ \mathbf{a}_k^\top\mathbf{x}=b_k
//! $$
//!
//! Interior-point solve with `clarabel`, followed by an exact re-solve of the
//! equality-constrained problem on the detected support.

use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::types::SolverSettings;
use super::types::Strategy;
use crate::error::PortfolioError;
use crate::error::Result;

/// Entries below this fraction of the largest weight are treated as inactive.
const SUPPORT_THRESHOLD: f64 = 1e-6;
/// Allowed violation of the multiplier sign on inactive coordinates.
const DUAL_TOLERANCE: f64 = 1e-9;

/// Solve the KKT system restricted to the support of `x`.
///
/// Returns `None` unless the result is primal and dual feasible, in which case it
/// is an exact optimum.
fn polish(q: &DMatrix<f64>, equalities: &[(&DVector<f64>, f64)], x: &DVector<f64>) -> Option<DVector<f64>> {
  let n = x.len();
  let scale = x.amax();
  let support: Vec<usize> = (0..n).filter(|&i| x[i] > SUPPORT_THRESHOLD * scale).collect();
  let k = support.len();
  let m = equalities.len();

  let mut kkt = DMatrix::zeros(k + m, k + m);
  let mut rhs = DVector::zeros(k + m);
  for (r, &i) in support.iter().enumerate() {
    for (c, &j) in support.iter().enumerate() {
      kkt[(r, c)] = 2.0 * q[(i, j)];
    }
    for (e, (a, _)) in equalities.iter().enumerate() {
      kkt[(r, k + e)] = a[i];
      kkt[(k + e, r)] = a[i];
    }
  }
  for (e, (_, b)) in equalities.iter().enumerate() {
    rhs[k + e] = *b;
  }

  let sol = kkt.lu().solve(&rhs)?;
  if sol.iter().any(|v| !v.is_finite()) {
    return None;
  }

  let mut polished = DVector::zeros(n);
  for (r, &i) in support.iter().enumerate() {
    if sol[r] < 0.0 {
      return None;
    }
    polished[i] = sol[r];
  }

  let grad = q * &polished * 2.0;
  let tol = DUAL_TOLERANCE * (1.0 + grad.amax());
  let dual_feasible = (0..n).filter(|i| !support.contains(i)).all(|i| {
    let reduced = grad[i]
      + equalities
        .iter()
        .enumerate()
        .map(|(e, (a, _))| a[i] * sol[k + e])
        .sum::<f64>();
    reduced >= -tol
  });

  dual_feasible.then_some(polished)
}

/// Minimize `x'Qx` over `x >= 0` subject to the linear `equalities` `(a, b)`.
///
/// Solver statuses other than solved map to [`PortfolioError::SolverDidNotConverge`],
/// infeasible constraints to [`PortfolioError::InvalidInput`].
pub(crate) fn solve_nonnegative_qp(
  strategy: Strategy,
  q: &DMatrix<f64>,
  equalities: &[(&DVector<f64>, f64)],
  settings: &SolverSettings,
) -> Result<DVector<f64>> {
  use clarabel::algebra::*;
  use clarabel::solver::*;

  let n = q.nrows();
  let m = equalities.len();

  // Objective 1/2 x'Px with P = 2Q, upper triangle in CSC.
  let mut p_colptr = vec![0];
  let mut p_rowval = Vec::new();
  let mut p_nzval = Vec::new();
  for j in 0..n {
    for i in 0..=j {
      let v = 2.0 * q[(i, j)];
      if v != 0.0 {
        p_rowval.push(i);
        p_nzval.push(v);
      }
    }
    p_colptr.push(p_nzval.len());
  }
  let p = CscMatrix::new(n, n, p_colptr, p_rowval, p_nzval);
  let linear = vec![0.0; n];

  // Constraint rows: equalities, then -x + s = 0 with s >= 0.
  let mut a_colptr = vec![0];
  let mut a_rowval = Vec::new();
  let mut a_nzval = Vec::new();
  for j in 0..n {
    for (e, (a, _)) in equalities.iter().enumerate() {
      if a[j] != 0.0 {
        a_rowval.push(e);
        a_nzval.push(a[j]);
      }
    }
    a_rowval.push(m + j);
    a_nzval.push(-1.0);
    a_colptr.push(a_nzval.len());
  }
  let a = CscMatrix::new(m + n, n, a_colptr, a_rowval, a_nzval);

  let mut b: Vec<f64> = equalities.iter().map(|(_, rhs)| *rhs).collect();
  b.resize(m + n, 0.0);
  let cones = [ZeroConeT(m), NonnegativeConeT(n)];

  let solver_settings = DefaultSettingsBuilder::default()
    .max_iter(settings.max_iterations as u32)
    .tol_gap_abs(settings.tolerance)
    .tol_gap_rel(settings.tolerance)
    .tol_feas(settings.tolerance)
    .verbose(false)
    .build()
    .map_err(|e| PortfolioError::InvalidInput(format!("invalid qp settings: {e}")))?;

  let mut solver = DefaultSolver::new(&p, &linear, &a, &b, &cones, solver_settings)
    .map_err(|e| PortfolioError::InvalidInput(format!("qp setup failed: {e:?}")))?;
  solver.solve();

  let solution = &solver.solution;
  match solution.status {
    SolverStatus::Solved => {}
    SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
      return Err(PortfolioError::InvalidInput(format!(
        "{strategy} constraints are infeasible"
      )));
    }
    status => {
      debug!(%strategy, ?status, iterations = solution.iterations, "qp stopped");
      return Err(PortfolioError::SolverDidNotConverge {
        strategy,
        iterations: solution.iterations as usize,
        residual: solution.r_prim.max(solution.r_dual),
        tolerance: settings.tolerance,
      });
    }
  }
  debug!(%strategy, iterations = solution.iterations, "qp solved");

  let x = DVector::from_iterator(n, solution.x.iter().map(|v| v.max(0.0)));
  Ok(polish(q, equalities, &x).unwrap_or(x))
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn ones(n: usize) -> DVector<f64> {
    DVector::from_element(n, 1.0)
  }

  #[test]
  fn solves_two_asset_minimum_variance() {
    // Closed form: w1 = (s2^2 - s12) / (s1^2 + s2^2 - 2 s12) = 0.08 / 0.11.
    let q = DMatrix::from_row_slice(2, 2, &[0.04, 0.01, 0.01, 0.09]);
    let budget = ones(2);

    let x = solve_nonnegative_qp(
      Strategy::MinimumVariance,
      &q,
      &[(&budget, 1.0)],
      &SolverSettings::default(),
    )
    .unwrap();

    assert_abs_diff_eq!(x[0], 0.08 / 0.11, epsilon = 1e-12);
    assert_abs_diff_eq!(x.sum(), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn binds_non_negativity_constraint() {
    // Unconstrained optimum shorts the second asset.
    let q = DMatrix::from_row_slice(2, 2, &[0.01, 0.018, 0.018, 0.04]);
    let budget = ones(2);

    let x = solve_nonnegative_qp(
      Strategy::MinimumVariance,
      &q,
      &[(&budget, 1.0)],
      &SolverSettings::default(),
    )
    .unwrap();

    assert_eq!(x[1], 0.0);
    assert_abs_diff_eq!(x[0], 1.0, epsilon = 1e-12);
  }

  #[test]
  fn honours_second_equality() {
    let q = DMatrix::from_row_slice(3, 3, &[0.04, 0.01, 0.0, 0.01, 0.09, 0.02, 0.0, 0.02, 0.16]);
    let budget = ones(3);
    let mu = DVector::from_vec(vec![0.08, 0.1, 0.12]);

    let x = solve_nonnegative_qp(
      Strategy::MinimumVariance,
      &q,
      &[(&budget, 1.0), (&mu, 0.1)],
      &SolverSettings::default(),
    )
    .unwrap();

    assert!(x.iter().all(|&v| v >= 0.0));
    assert_abs_diff_eq!(x.sum(), 1.0, epsilon = 1e-10);
    assert_abs_diff_eq!(mu.dot(&x), 0.1, epsilon = 1e-10);
  }

  #[test]
  fn reports_iteration_cap() {
    let q = DMatrix::from_row_slice(2, 2, &[0.04, 0.01, 0.01, 0.09]);
    let budget = ones(2);
    let settings = SolverSettings {
      max_iterations: 1,
      ..SolverSettings::default()
    };

    let err = solve_nonnegative_qp(Strategy::MinimumVariance, &q, &[(&budget, 1.0)], &settings)
      .unwrap_err();
    assert!(matches!(err, PortfolioError::SolverDidNotConverge { .. }));
  }

  #[test]
  fn polish_rejects_wrong_support() {
    // Forcing the binding asset into the support yields a negative weight.
    let q = DMatrix::from_row_slice(2, 2, &[0.01, 0.018, 0.018, 0.04]);
    let budget = ones(2);
    let x = DVector::from_vec(vec![0.5, 0.5]);

    assert!(polish(&q, &[(&budget, 1.0)], &x).is_none());
  }
}
