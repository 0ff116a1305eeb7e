//! Primal-dual interior point method for NLP (nonlinear programming).
//!
//! Minimize a function `f(x)` beginning from a starting point `x0`, subject
//! to optional linear and nonlinear constraints and variable bounds.
//!
//! ```text
//!       min f(x)
//!        x
//!
//! subject to
//!
//!       h(x) = 0            (nonlinear equalities)
//!       g(x) <= 0           (nonlinear inequalities)
//!       l <= A*x <= u       (linear constraints)
//!       xmin <= x <= xmax   (variable bounds)
//! ```
mod nlp;
mod qp;

pub use nlp::*;
pub use qp::*;

use anyhow::Result;
use sparsetools::csr::CSR;
use std::fmt;

/// Evaluates the objective function and its gradient.
pub trait ObjectiveFunction {
    fn f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)>;
}

/// Evaluates the nonlinear constraints and their Jacobians.
pub trait NonlinearConstraint {
    /// Returns `(h, g, dh, dg)` where `h(x) = 0` and `g(x) <= 0`. The
    /// Jacobians have one row per constraint and one column per variable.
    fn gh(&self, x: &[f64]) -> Result<(Vec<f64>, Vec<f64>, CSR<usize, f64>, CSR<usize, f64>)>;
}

/// Evaluates the Hessian of the Lagrangian.
pub trait Hessian {
    /// `lam` and `mu` are the multipliers on the nonlinear equality and
    /// inequality constraints. The objective contribution must be scaled
    /// by `cost_mult`.
    fn hess(&self, x: &[f64], lam: &[f64], mu: &[f64], cost_mult: f64) -> Result<CSR<usize, f64>>;
}

/// Reason for abandoning the iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DivergenceReason {
    NotANumber,
    /// Primal or dual step length fell below the minimum.
    StepCollapsed { alphap: f64, alphad: f64 },
    /// The barrier parameter left its numerically meaningful range.
    BarrierOutOfRange(f64),
    /// The KKT system could not be solved.
    SingularKkt,
    /// An objective, constraint or Hessian callback returned an error.
    EvaluationFailed,
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceReason::NotANumber => write!(f, "numerically failed (NaN)"),
            DivergenceReason::StepCollapsed { alphap, alphad } => {
                write!(f, "step size too small (alphap = {:e}, alphad = {:e})", alphap, alphad)
            }
            DivergenceReason::BarrierOutOfRange(gamma) => {
                write!(f, "barrier parameter out of range (gamma = {:e})", gamma)
            }
            DivergenceReason::SingularKkt => write!(f, "singular KKT system"),
            DivergenceReason::EvaluationFailed => write!(f, "function evaluation failed"),
        }
    }
}

/// Termination status.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IpmStatus {
    Converged,
    /// Maximum number of iterations reached.
    Exhausted,
    Diverged(DivergenceReason),
}

/// Lagrange multipliers.
#[derive(Debug, Clone, Default)]
pub struct Lambda {
    /// Nonlinear equality constraints.
    pub eq_nonlin: Vec<f64>,
    /// Nonlinear inequality constraints.
    pub ineq_nonlin: Vec<f64>,
    /// Lower (left-hand) limit on linear constraints.
    pub mu_l: Vec<f64>,
    /// Upper (right-hand) limit on linear constraints.
    pub mu_u: Vec<f64>,
    /// Lower bound on optimization variables.
    pub lower: Vec<f64>,
    /// Upper bound on optimization variables.
    pub upper: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Solution {
    pub x: Vec<f64>,
    /// Final objective function value.
    pub f: f64,
    pub status: IpmStatus,
    pub iterations: usize,
    pub lambda: Lambda,
    pub feascond: f64,
    pub gradcond: f64,
    pub compcond: f64,
    pub costcond: f64,
}

impl Solution {
    pub fn converged(&self) -> bool {
        self.status == IpmStatus::Converged
    }
}
