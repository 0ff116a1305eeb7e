use super::{nlp, Hessian, ObjectiveFunction, Solution};
use crate::error::CaseError;
use crate::opt::IpmOpt;

use anyhow::Result;
use sparsetools::csr::CSR;
use spsolve::Solver;
use std::iter::zip;

struct QpObjective<'a> {
    h: Option<&'a CSR<usize, f64>>,
    c: &'a [f64],
}

impl<'a> ObjectiveFunction for QpObjective<'a> {
    fn f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        let hx: Vec<f64> = match self.h {
            Some(h) => h * x,
            None => vec![0.0; x.len()],
        };
        let f = zip(x, zip(&hx, self.c))
            .map(|(x, (hx, c))| 0.5 * x * hx + c * x)
            .sum();
        let df = zip(hx, self.c).map(|(hx, c)| hx + c).collect();
        Ok((f, df))
    }
}

impl<'a> Hessian for QpObjective<'a> {
    fn hess(&self, x: &[f64], _lam: &[f64], _mu: &[f64], cost_mult: f64) -> Result<CSR<usize, f64>> {
        Ok(match self.h {
            Some(h) => h * cost_mult,
            None => CSR::with_size(x.len(), x.len()),
        })
    }
}

/// Starting point inside the variable bounds: the midpoint of a finite
/// box, one unit inside a single finite bound and zero otherwise.
pub(crate) fn interior_point(xmin: &[f64], xmax: &[f64]) -> Vec<f64> {
    zip(xmin, xmax)
        .map(|(&lo, &hi)| match (lo.is_finite(), hi.is_finite()) {
            (true, true) => (lo + hi) / 2.0,
            (true, false) => lo + 1.0,
            (false, true) => hi - 1.0,
            (false, false) => 0.0,
        })
        .collect()
}

/// Quadratic program solver based on the primal-dual interior point method.
///
/// ```text
///       min 1/2 x'*H*x + c'*x
///        x
///
/// subject to
///
///       l <= A*x <= u       (linear constraints)
///       xmin <= x <= xmax   (variable bounds)
/// ```
///
/// A missing `h` gives a linear program. Without `x0` the iteration starts
/// from a point inside the variable bounds.
pub fn qp(
    h: Option<&CSR<usize, f64>>,
    c: &[f64],
    a: Option<&CSR<usize, f64>>,
    l: &[f64],
    u: &[f64],
    xmin: &[f64],
    xmax: &[f64],
    x0: Option<&[f64]>,
    opt: &IpmOpt,
    solver: &dyn Solver<usize, f64>,
) -> Result<Solution> {
    let nx = c.len();
    if let Some(h) = h {
        if h.rows() != nx || h.cols() != nx {
            return Err(CaseError::DimensionMismatch {
                name: "H".to_string(),
                expected: nx,
                actual: h.rows().max(h.cols()),
            }
            .into());
        }
    }

    let x0 = match x0 {
        Some(x0) => x0.to_vec(),
        None => {
            let lo = if xmin.is_empty() { vec![f64::NEG_INFINITY; nx] } else { xmin.to_vec() };
            let hi = if xmax.is_empty() { vec![f64::INFINITY; nx] } else { xmax.to_vec() };
            interior_point(&lo, &hi)
        }
    };

    let objective = QpObjective { h, c };
    nlp(&objective, &x0, a, l, u, xmin, xmax, None, &objective, opt, solver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipm::{DivergenceReason, IpmStatus, NonlinearConstraint};
    use anyhow::format_err;
    use crate::opt::IpmOptBuilder;
    use sparsetools::coo::Coo;
    use spsolve::rlu::RLU;

    fn dense(rows: &[&[f64]]) -> CSR<usize, f64> {
        let mut m = Coo::with_size(rows.len(), rows[0].len());
        for (i, r) in rows.iter().enumerate() {
            for (j, &v) in r.iter().enumerate() {
                if v != 0.0 {
                    m.push(i, j, v);
                }
            }
        }
        m.to_csr()
    }

    #[test]
    fn equality_constrained_qp() -> Result<()> {
        let h = dense(&[&[2.0, 0.0], &[0.0, 2.0]]);
        let a = dense(&[&[1.0, 1.0]]);
        let s = qp(
            Some(&h),
            &[0.0, 0.0],
            Some(&a),
            &[1.0],
            &[1.0],
            &[],
            &[],
            None,
            &IpmOpt::default(),
            &RLU::default(),
        )?;
        assert!(s.converged());
        assert!((s.x[0] - 0.5).abs() < 1e-6);
        assert!((s.x[1] - 0.5).abs() < 1e-6);
        assert!((s.f - 0.5).abs() < 1e-6);
        assert!((s.lambda.mu_l[0] - 1.0).abs() < 1e-5);
        assert!(s.lambda.mu_u[0].abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn bounded_lp() -> Result<()> {
        let a = dense(&[&[1.0, 2.0]]);
        let s = qp(
            None,
            &[-1.0, -1.0],
            Some(&a),
            &[f64::NEG_INFINITY],
            &[4.0],
            &[0.0, 0.0],
            &[3.0, 3.0],
            None,
            &IpmOpt::default(),
            &RLU::default(),
        )?;
        assert!(s.converged());
        assert!((s.x[0] - 3.0).abs() < 1e-4);
        assert!((s.x[1] - 0.5).abs() < 1e-4);
        assert!((s.f + 3.5).abs() < 1e-4);
        assert!((s.lambda.mu_u[0] - 0.5).abs() < 1e-4);
        assert!((s.lambda.upper[0] - 0.5).abs() < 1e-4);
        assert!(s.lambda.lower[0].abs() < 1e-4);
        assert!(s.lambda.upper[1].abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn infeasible_bounds_diverge() -> Result<()> {
        let a = dense(&[&[1.0, 1.0]]);
        let s = qp(
            None,
            &[1.0, 1.0],
            Some(&a),
            &[5.0],
            &[f64::INFINITY],
            &[0.0, 0.0],
            &[1.0, 1.0],
            None,
            &IpmOpt::default(),
            &RLU::default(),
        )?;
        assert!(!s.converged());
        assert!(
            matches!(
                s.status,
                IpmStatus::Diverged(DivergenceReason::StepCollapsed { .. })
            ),
            "{:?}",
            s.status
        );
        Ok(())
    }

    /// `-x` with an objective that is undefined beyond `x = 5`.
    struct Truncated;

    impl ObjectiveFunction for Truncated {
        fn f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
            if x[0] > 5.0 {
                return Err(format_err!("x = {} outside the domain", x[0]));
            }
            Ok((-x[0], vec![-1.0]))
        }
    }

    impl Hessian for Truncated {
        fn hess(&self, _x: &[f64], _lam: &[f64], _mu: &[f64], _cost_mult: f64) -> Result<CSR<usize, f64>> {
            Ok(CSR::with_size(1, 1))
        }
    }

    #[test]
    fn evaluation_failure_diverges() -> Result<()> {
        let s = nlp(
            &Truncated,
            &[1.0],
            None,
            &[],
            &[],
            &[0.0],
            &[10.0],
            None,
            &Truncated,
            &IpmOpt::default(),
            &RLU::default(),
        )?;
        assert_eq!(s.status, IpmStatus::Diverged(DivergenceReason::EvaluationFailed));
        assert!(s.x[0] > 5.0);

        // failing at the starting point is an error
        let result = nlp(
            &Truncated,
            &[6.0],
            None,
            &[],
            &[],
            &[0.0],
            &[10.0],
            None,
            &Truncated,
            &IpmOpt::default(),
            &RLU::default(),
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn dimension_mismatch() {
        let a = dense(&[&[1.0, 1.0, 1.0]]);
        let result = qp(
            None,
            &[1.0, 1.0],
            Some(&a),
            &[0.0],
            &[1.0],
            &[],
            &[],
            None,
            &IpmOpt::default(),
            &RLU::default(),
        );
        assert!(result.is_err());
    }

    /// Hock-Schittkowski problem 71.
    struct Hs071;

    impl ObjectiveFunction for Hs071 {
        fn f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
            let s = x[0] + x[1] + x[2];
            let f = x[0] * x[3] * s + x[2];
            let df = vec![
                x[0] * x[3] + x[3] * s,
                x[0] * x[3],
                x[0] * x[3] + 1.0,
                x[0] * s,
            ];
            Ok((f, df))
        }
    }

    impl NonlinearConstraint for Hs071 {
        fn gh(&self, x: &[f64]) -> Result<(Vec<f64>, Vec<f64>, CSR<usize, f64>, CSR<usize, f64>)> {
            let g = vec![25.0 - x[0] * x[1] * x[2] * x[3]];
            let h = vec![x.iter().map(|x| x * x).sum::<f64>() - 40.0];
            let dg = dense(&[&[
                -x[1] * x[2] * x[3],
                -x[0] * x[2] * x[3],
                -x[0] * x[1] * x[3],
                -x[0] * x[1] * x[2],
            ]]);
            let dh = dense(&[&[2.0 * x[0], 2.0 * x[1], 2.0 * x[2], 2.0 * x[3]]]);
            Ok((h, g, dh, dg))
        }
    }

    impl Hessian for Hs071 {
        fn hess(&self, x: &[f64], lam: &[f64], mu: &[f64], cost_mult: f64) -> Result<CSR<usize, f64>> {
            let s = 2.0 * x[0] + x[1] + x[2];
            let hf = [
                [2.0 * x[3], x[3], x[3], s],
                [x[3], 0.0, 0.0, x[0]],
                [x[3], 0.0, 0.0, x[0]],
                [s, x[0], x[0], 0.0],
            ];
            let hg = [
                [0.0, x[2] * x[3], x[1] * x[3], x[1] * x[2]],
                [x[2] * x[3], 0.0, x[0] * x[3], x[0] * x[2]],
                [x[1] * x[3], x[0] * x[3], 0.0, x[0] * x[1]],
                [x[1] * x[2], x[0] * x[2], x[0] * x[1], 0.0],
            ];
            let mut lxx = Coo::with_size(4, 4);
            for i in 0..4 {
                for j in 0..4 {
                    let mut v = cost_mult * hf[i][j] - mu[0] * hg[i][j];
                    if i == j {
                        v += 2.0 * lam[0];
                    }
                    if v != 0.0 {
                        lxx.push(i, j, v);
                    }
                }
            }
            Ok(lxx.to_csr())
        }
    }

    #[test]
    fn hock_schittkowski_71() -> Result<()> {
        let s = nlp(
            &Hs071,
            &[1.0, 5.0, 5.0, 1.0],
            None,
            &[],
            &[],
            &[1.0; 4],
            &[5.0; 4],
            Some(&Hs071),
            &Hs071,
            &IpmOpt::default(),
            &RLU::default(),
        )?;
        assert!(s.converged());
        let expected = [1.0, 4.7429994, 3.8211503, 1.3794082];
        for (x, e) in zip(&s.x, &expected) {
            assert!((x - e).abs() < 1e-5, "{} != {}", x, e);
        }
        assert!((s.f - 17.0140173).abs() < 1e-5);
        assert!((s.lambda.eq_nonlin[0] - 0.1614686).abs() < 1e-4);
        assert!((s.lambda.ineq_nonlin[0] - 0.55229366).abs() < 1e-4);
        assert!((s.lambda.lower[0] - 1.0878712).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn hock_schittkowski_71_step_control() -> Result<()> {
        let opt = IpmOptBuilder::default().step_control(true).build()?;
        let s = nlp(
            &Hs071,
            &[1.0, 5.0, 5.0, 1.0],
            None,
            &[],
            &[],
            &[1.0; 4],
            &[5.0; 4],
            Some(&Hs071),
            &Hs071,
            &opt,
            &RLU::default(),
        )?;
        assert!(s.converged());
        assert!((s.f - 17.0140173).abs() < 1e-5);
        Ok(())
    }
}
