//! # Conic Quadratic Programming
//!
//! $$
//! \min_x \tfrac12 x^\top P x\quad\text{s.t.}\quad Ax=b,\ Gx\le h
//! $$
//!
//! Dense convex QPs handed to the Clarabel interior-point solver. Equalities map to a zero
//! cone, inequalities to a nonnegative cone on the slack `h - Gx`.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use ndarray::concatenate;
use ndarray::Array2;
use ndarray::Axis;
use tracing::trace;

use crate::error::PortfolioError;
use crate::error::Result;

/// Gap and feasibility tolerance passed to the solver.
const SOLVER_TOL: f64 = 1e-9;

/// Dense convex quadratic program without a linear term.
#[derive(Clone, Debug)]
pub(crate) struct QuadraticProgram {
  pub p: Array2<f64>,
  pub a_eq: Array2<f64>,
  pub b_eq: Vec<f64>,
  pub g: Array2<f64>,
  pub h: Vec<f64>,
}

#[derive(Clone, Debug)]
pub(crate) struct QpSolution {
  pub x: Vec<f64>,
  pub iterations: u32,
}

/// Column-compressed copy of `a`, optionally keeping only the upper triangle.
fn to_csc(a: &Array2<f64>, upper_only: bool) -> CscMatrix<f64> {
  let (m, n) = a.dim();
  let mut colptr = Vec::with_capacity(n + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();

  colptr.push(0);
  for j in 0..n {
    let rows = if upper_only { 0..(j + 1).min(m) } else { 0..m };
    for i in rows {
      let v = a[[i, j]];
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(nzval.len());
  }

  CscMatrix::new(m, n, colptr, rowval, nzval)
}

impl QuadraticProgram {
  pub fn solve(&self, max_iterations: usize) -> Result<QpSolution> {
    let n = self.p.ncols();
    let m_eq = self.a_eq.nrows();
    let m_in = self.g.nrows();

    let p = to_csc(&self.p, true);
    let q = vec![0.0; n];
    let stacked = concatenate(Axis(0), &[self.a_eq.view(), self.g.view()])
      .map_err(|e| PortfolioError::InvalidConfig(format!("constraint shapes disagree: {e}")))?;
    let a = to_csc(&stacked, false);
    let b: Vec<f64> = self.b_eq.iter().chain(self.h.iter()).copied().collect();

    let mut cones = Vec::with_capacity(2);
    if m_eq > 0 {
      cones.push(SupportedConeT::ZeroConeT(m_eq));
    }
    if m_in > 0 {
      cones.push(SupportedConeT::NonnegativeConeT(m_in));
    }

    let max_iter = u32::try_from(max_iterations).unwrap_or(u32::MAX);
    let settings = DefaultSettingsBuilder::default()
      .max_iter(max_iter)
      .tol_gap_abs(SOLVER_TOL)
      .tol_gap_rel(SOLVER_TOL)
      .tol_feas(SOLVER_TOL)
      .verbose(false)
      .build()
      .map_err(|e| PortfolioError::InvalidConfig(format!("solver settings: {e}")))?;

    let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings)
      .map_err(|e| PortfolioError::InvalidConfig(format!("solver setup: {e:?}")))?;
    solver.solve();

    let solution = &solver.solution;
    trace!(
      status = ?solution.status,
      iterations = solution.iterations,
      "quadratic program finished"
    );

    match solution.status {
      SolverStatus::Solved => Ok(QpSolution {
        x: solution.x.clone(),
        iterations: solution.iterations,
      }),
      SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => Err(
        PortfolioError::InfeasibleConstraints("solver proved the constraints infeasible".into()),
      ),
      SolverStatus::MaxIterations => Err(PortfolioError::SolverDidNotConverge {
        iterations: max_iterations,
      }),
      status => Err(PortfolioError::DegenerateAllocation(format!(
        "quadratic program ended with status {status:?}"
      ))),
    }
  }
}
