use super::{DivergenceReason, Hessian, IpmStatus, Lambda, NonlinearConstraint, ObjectiveFunction, Solution};
use crate::error::CaseError;
use crate::opt::IpmOpt;
use crate::sparse::{mul_t, push_block, push_block_t, row, vstack};

use anyhow::Result;
use full::slice::norm_inf;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use spsolve::Solver;
use std::iter::zip;

/// Constant used in alpha updates.
const XI: f64 = 0.99995;
/// Centering parameter.
const SIGMA: f64 = 0.1;
/// Used to initialize slack variables.
const Z0: f64 = 1.0;
/// Minimum primal and dual step length.
const ALPHA_MIN: f64 = 1e-8;
/// Acceptable range of actual to predicted merit function improvement.
const RHO_MIN: f64 = 0.95;
const RHO_MAX: f64 = 1.05;
/// Multipliers below this value on non-binding constraints are zeroed.
const MU_THRESHOLD: f64 = 1e-5;
const EPS: f64 = f64::EPSILON;

/// Limits beyond which bounds are treated as infinite.
const INF_LIMIT: f64 = 1e10;

/// Function values and derivatives at a point, with the linear
/// constraints and variable bounds folded into `h` and `g`.
struct Point {
    f: f64,
    df: Vec<f64>,
    h: Vec<f64>,
    g: Vec<f64>,
    dh: CSR<usize, f64>,
    dg: CSR<usize, f64>,
}

struct Evaluator<'a> {
    f_fcn: &'a dyn ObjectiveFunction,
    gh_fcn: Option<&'a dyn NonlinearConstraint>,
    nx: usize,
    ae: CSR<usize, f64>,
    be: Vec<f64>,
    ai: CSR<usize, f64>,
    bi: Vec<f64>,
    cost_mult: f64,
}

impl<'a> Evaluator<'a> {
    fn eval(&self, x: &[f64]) -> Result<Point> {
        let (f, df) = self.f_fcn.f(x)?;
        if df.len() != self.nx {
            return Err(CaseError::DimensionMismatch {
                name: "df".to_string(),
                expected: self.nx,
                actual: df.len(),
            }
            .into());
        }
        let f = f * self.cost_mult;
        let df: Vec<f64> = df.iter().map(|d| d * self.cost_mult).collect();

        let (hn, gn, dhn, dgn) = match self.gh_fcn {
            Some(gh_fcn) => gh_fcn.gh(x)?,
            None => (
                Vec::new(),
                Vec::new(),
                CSR::with_size(0, self.nx),
                CSR::with_size(0, self.nx),
            ),
        };

        let ae_x: Vec<f64> = &self.ae * x;
        let ai_x: Vec<f64> = &self.ai * x;
        let h = hn
            .into_iter()
            .chain(zip(ae_x, &self.be).map(|(ax, b)| ax - b))
            .collect();
        let g = gn
            .into_iter()
            .chain(zip(ai_x, &self.bi).map(|(ax, b)| ax - b))
            .collect();

        Ok(Point {
            f,
            df,
            h,
            g,
            dh: vstack(&dhn, &self.ae),
            dg: vstack(&dgn, &self.ai),
        })
    }
}

fn inf_norm(v: &[f64]) -> f64 {
    if v.is_empty() {
        0.0
    } else {
        norm_inf(v)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    zip(a, b).map(|(a, b)| a * b).sum()
}

// Lx = df + dh' * lam + dg' * mu
fn lagrangian_gradient(p: &Point, lam: &[f64], mu: &[f64]) -> Vec<f64> {
    let dh_lam = mul_t(&p.dh, lam);
    let dg_mu = mul_t(&p.dg, mu);
    (0..p.df.len())
        .map(|i| p.df[i] + dh_lam[i] + dg_mu[i])
        .collect()
}

fn feas_cond(p: &Point, x: &[f64], z: &[f64]) -> f64 {
    let max_g = p.g.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    inf_norm(&p.h).max(max_g) / (1.0 + inf_norm(x).max(inf_norm(z)))
}

fn grad_cond(lx: &[f64], lam: &[f64], mu: &[f64]) -> f64 {
    inf_norm(lx) / (1.0 + inf_norm(lam).max(inf_norm(mu)))
}

// L = f + lam' * h + mu' * (g + z) - gamma * sum(log(z))
fn merit(p: &Point, lam: &[f64], mu: &[f64], z: &[f64], gamma: f64) -> f64 {
    let g_z: Vec<f64> = zip(&p.g, z).map(|(g, z)| g + z).collect();
    p.f + dot(lam, &p.h) + dot(mu, &g_z) - gamma * z.iter().map(|z| z.ln()).sum::<f64>()
}

/// Largest step in `(0, 1]`, scaled by `XI`, that keeps `v + alpha*dv`
/// strictly positive.
fn step_length(v: &[f64], dv: &[f64]) -> f64 {
    let m = zip(v, dv)
        .filter(|(_, dv)| **dv < 0.0)
        .map(|(v, dv)| v / -dv)
        .fold(f64::INFINITY, f64::min);
    (XI * m).min(1.0)
}

/// Primal-dual interior point method for NLP (nonlinear programming).
///
/// `f_fcn` evaluates the objective and its gradient, `gh_fcn` the optional
/// nonlinear constraints and `hess_fcn` the Hessian of the Lagrangian.
/// `a_mat`, `l` and `u` define the optional linear constraints
/// `l <= A*x <= u`. Empty `xmin` and `xmax` mean unbounded variables.
///
/// Numerical failures are reported through the returned status. Errors
/// are returned only for inconsistent dimensions or failing callbacks.
pub fn nlp(
    f_fcn: &dyn ObjectiveFunction,
    x0: &[f64],
    a_mat: Option<&CSR<usize, f64>>,
    l: &[f64],
    u: &[f64],
    xmin: &[f64],
    xmax: &[f64],
    gh_fcn: Option<&dyn NonlinearConstraint>,
    hess_fcn: &dyn Hessian,
    opt: &IpmOpt,
    solver: &dyn Solver<usize, f64>,
) -> Result<Solution> {
    let nx = x0.len();
    let na = a_mat.map(|a| a.rows()).unwrap_or_default();

    let check = |name: &str, expected: usize, actual: usize| {
        if expected != actual {
            let err = CaseError::DimensionMismatch {
                name: name.to_string(),
                expected,
                actual,
            };
            log::error!("{}", err);
            Err(err)
        } else {
            Ok(())
        }
    };
    if let Some(a) = a_mat {
        check("A columns", nx, a.cols())?;
    }
    check("l", na, l.len())?;
    check("u", na, u.len())?;
    let xmin = if xmin.is_empty() { vec![f64::NEG_INFINITY; nx] } else { xmin.to_vec() };
    let xmax = if xmax.is_empty() { vec![f64::INFINITY; nx] } else { xmax.to_vec() };
    check("xmin", nx, xmin.len())?;
    check("xmax", nx, xmax.len())?;

    // add var limits to linear constraints
    //   AA = [speye(nx); A], ll = [xmin; l], uu = [xmax; u]
    let ll: Vec<f64> = xmin.iter().chain(l).copied().collect();
    let uu: Vec<f64> = xmax.iter().chain(u).copied().collect();
    let aa_row = |k: usize| -> Vec<(usize, f64)> {
        if k < nx {
            vec![(k, 1.0)]
        } else {
            match a_mat {
                Some(a) => row(a, k - nx).collect(),
                None => Vec::new(),
            }
        }
    };

    // split up linear constraints
    let n_aa = nx + na;
    let ieq: Vec<usize> = (0..n_aa).filter(|&k| (uu[k] - ll[k]).abs() <= EPS).collect();
    let igt: Vec<usize> = (0..n_aa)
        .filter(|&k| uu[k] >= INF_LIMIT && ll[k] > -INF_LIMIT)
        .collect();
    let ilt: Vec<usize> = (0..n_aa)
        .filter(|&k| ll[k] <= -INF_LIMIT && uu[k] < INF_LIMIT)
        .collect();
    let ibx: Vec<usize> = (0..n_aa)
        .filter(|&k| (uu[k] - ll[k]).abs() > EPS && uu[k] < INF_LIMIT && ll[k] > -INF_LIMIT)
        .collect();
    let (nlt, ngt, nbx) = (ilt.len(), igt.len(), ibx.len());

    let mut ae = Coo::with_size(ieq.len(), nx);
    let mut be = Vec::with_capacity(ieq.len());
    for (r, &k) in ieq.iter().enumerate() {
        for (j, v) in aa_row(k) {
            ae.push(r, j, v);
        }
        be.push(uu[k]);
    }

    //   Ai = [AA(ilt, :); -AA(igt, :); AA(ibx, :); -AA(ibx, :)]
    //   bi = [uu(ilt); -ll(igt); uu(ibx); -ll(ibx)]
    let mut ai = Coo::with_size(nlt + ngt + 2 * nbx, nx);
    let mut bi = Vec::with_capacity(nlt + ngt + 2 * nbx);
    let blocks: [(&[usize], f64, &[f64]); 4] = [
        (&ilt, 1.0, &uu),
        (&igt, -1.0, &ll),
        (&ibx, 1.0, &uu),
        (&ibx, -1.0, &ll),
    ];
    for (rows, sign, bound) in blocks {
        for &k in rows {
            let r = bi.len();
            for (j, v) in aa_row(k) {
                ai.push(r, j, sign * v);
            }
            bi.push(sign * bound[k]);
        }
    }

    let ev = Evaluator {
        f_fcn,
        gh_fcn,
        nx,
        ae: ae.to_csr(),
        be,
        ai: ai.to_csr(),
        bi,
        cost_mult: opt.cost_mult,
    };

    // evaluate cost f(x0) and constraints g(x0), h(x0)
    let mut x = x0.to_vec();
    let mut p = ev.eval(&x)?;
    let neq = p.h.len();
    let niq = p.g.len();
    let neqnln = neq - ev.be.len();
    let niqnln = niq - ev.bi.len();

    // initialize gamma, lam, mu, z, e
    let mut gamma = 1.0;
    let mut lam = vec![0.0; neq];
    let mut z: Vec<f64> = p.g.iter().map(|&g| if g < -Z0 { -g } else { Z0 }).collect();
    let mut mu: Vec<f64> = z
        .iter()
        .map(|&z| if gamma / z > Z0 { gamma / z } else { Z0 })
        .collect();

    let mut f0 = p.f;
    let mut l_merit = if opt.step_control {
        merit(&p, &lam, &mu, &z, gamma)
    } else {
        0.0
    };

    // check tolerance
    let mut lx = lagrangian_gradient(&p, &lam, &mu);
    let mut feascond = feas_cond(&p, &x, &z);
    let mut gradcond = grad_cond(&lx, &lam, &mu);
    let mut compcond = dot(&z, &mu) / (1.0 + inf_norm(&x));
    let mut costcond = (p.f - f0).abs() / (1.0 + f0.abs());

    log::debug!(" it    objective   step size   feascond     gradcond     compcond     costcond");
    log::debug!("----  ------------ --------- ------------ ------------ ------------ ------------");
    log::debug!(
        "{:3}  {:12.8}            {:10.5e} {:12.5e} {:12.5e} {:12.5e}",
        0,
        p.f / opt.cost_mult,
        feascond,
        gradcond,
        compcond,
        costcond
    );

    let tol_met = |feascond: f64, gradcond: f64, compcond: f64, costcond: f64| {
        feascond < opt.feastol && gradcond < opt.gradtol && compcond < opt.comptol && costcond < opt.costtol
    };

    let mut status = IpmStatus::Exhausted;
    let mut i = 0;
    if tol_met(feascond, gradcond, compcond, costcond) {
        status = IpmStatus::Converged;
    }

    let evaluation_failed = |err: anyhow::Error| {
        log::error!("function evaluation failed: {:#}", err);
        IpmStatus::Diverged(DivergenceReason::EvaluationFailed)
    };

    'iter: while status == IpmStatus::Exhausted && i < opt.max_it {
        i += 1;

        // compute update step
        let lxx = match hess_fcn.hess(&x, &lam[..neqnln], &mu[..niqnln], opt.cost_mult) {
            Ok(lxx) => lxx,
            Err(err) => {
                status = evaluation_failed(err);
                break;
            }
        };

        //   M = Lxx + dg' * diag(mu ./ z) * dg
        //   N = Lx + dg' * ((mu .* g + gamma) ./ z)
        let n = nx + neq;
        let mut kkt = Coo::with_size(n, n);
        push_block(&mut kkt, &lxx, 0, 0);
        let mut m_dg = Coo::with_size(nx, nx);
        for r in 0..niq {
            let w = mu[r] / z[r];
            for (j, a) in row(&p.dg, r) {
                for (k, b) in row(&p.dg, r) {
                    m_dg.push(j, k, w * a * b);
                }
            }
        }
        push_block(&mut kkt, &m_dg.to_csr(), 0, 0);
        push_block_t(&mut kkt, &p.dh, 0, nx);
        push_block(&mut kkt, &p.dh, nx, 0);
        let kkt = kkt.to_csc();

        let w: Vec<f64> = (0..niq).map(|r| (mu[r] * p.g[r] + gamma) / z[r]).collect();
        let dg_w = mul_t(&p.dg, &w);

        let mut rhs: Vec<f64> = (0..nx)
            .map(|j| -(lx[j] + dg_w[j]))
            .chain(p.h.iter().map(|h| -h))
            .collect();
        if let Err(err) = solver.solve(n, kkt.rowidx(), kkt.colptr(), kkt.values(), &mut rhs, false) {
            log::error!("KKT solve failed: {}", err);
            status = IpmStatus::Diverged(DivergenceReason::SingularKkt);
            break;
        }
        let mut dx = rhs[..nx].to_vec();
        let mut dlam = rhs[nx..].to_vec();

        //   dz = -g - z - dg * dx
        //   dmu = -mu + (gamma - mu .* dz) ./ z
        let dg_dx: Vec<f64> = &p.dg * &dx;
        let mut dz: Vec<f64> = (0..niq).map(|r| -p.g[r] - z[r] - dg_dx[r]).collect();
        let mut dmu: Vec<f64> = (0..niq)
            .map(|r| -mu[r] + (gamma - mu[r] * dz[r]) / z[r])
            .collect();

        // optional step-size control
        let mut sc = false;
        if opt.step_control {
            let x1: Vec<f64> = zip(&x, &dx).map(|(x, dx)| x + dx).collect();
            let p1 = match ev.eval(&x1) {
                Ok(p1) => p1,
                Err(err) => {
                    status = evaluation_failed(err);
                    break;
                }
            };
            let lx1 = lagrangian_gradient(&p1, &lam, &mu);
            let feascond1 = feas_cond(&p1, &x1, &z);
            let gradcond1 = grad_cond(&lx1, &lam, &mu);
            if feascond1 > feascond && gradcond1 > gradcond {
                sc = true;
            }
        }
        if sc {
            let mut alpha = 1.0;
            for _ in 0..opt.max_red {
                let dx1: Vec<f64> = dx.iter().map(|dx| alpha * dx).collect();
                let x1: Vec<f64> = zip(&x, &dx1).map(|(x, dx)| x + dx).collect();
                let p1 = match ev.eval(&x1) {
                    Ok(p1) => p1,
                    Err(err) => {
                        status = evaluation_failed(err);
                        break 'iter;
                    }
                };
                let l1 = merit(&p1, &lam, &mu, &z, gamma);

                let lxx_dx1: Vec<f64> = &lxx * &dx1;
                let rho = (l1 - l_merit) / (dot(&lx, &dx1) + 0.5 * dot(&dx1, &lxx_dx1));
                if rho > RHO_MIN && rho < RHO_MAX {
                    break;
                }
                alpha /= 2.0;
            }
            dx.iter_mut().for_each(|v| *v *= alpha);
            dz.iter_mut().for_each(|v| *v *= alpha);
            dlam.iter_mut().for_each(|v| *v *= alpha);
            dmu.iter_mut().for_each(|v| *v *= alpha);
        }

        // do the update
        let alphap = step_length(&z, &dz);
        let alphad = step_length(&mu, &dmu);
        zip(&mut x, &dx).for_each(|(x, dx)| *x += alphap * dx);
        zip(&mut z, &dz).for_each(|(z, dz)| *z += alphap * dz);
        zip(&mut lam, &dlam).for_each(|(lam, dlam)| *lam += alphad * dlam);
        zip(&mut mu, &dmu).for_each(|(mu, dmu)| *mu += alphad * dmu);
        if niq > 0 {
            gamma = SIGMA * dot(&z, &mu) / niq as f64;
        }

        // evaluate cost, constraints, derivatives
        if x.iter().any(|x| x.is_nan()) {
            status = IpmStatus::Diverged(DivergenceReason::NotANumber);
            break;
        }
        p = match ev.eval(&x) {
            Ok(p) => p,
            Err(err) => {
                status = evaluation_failed(err);
                break;
            }
        };
        lx = lagrangian_gradient(&p, &lam, &mu);

        feascond = feas_cond(&p, &x, &z);
        gradcond = grad_cond(&lx, &lam, &mu);
        compcond = dot(&z, &mu) / (1.0 + inf_norm(&x));
        costcond = (p.f - f0).abs() / (1.0 + f0.abs());

        log::debug!(
            "{:3}  {:12.8} {:10.5e} {:10.5e} {:12.5e} {:12.5e} {:12.5e}",
            i,
            p.f / opt.cost_mult,
            inf_norm(&dx),
            feascond,
            gradcond,
            compcond,
            costcond
        );

        if tol_met(feascond, gradcond, compcond, costcond) {
            status = IpmStatus::Converged;
        } else {
            if p.f.is_nan() || lx.iter().any(|v| v.is_nan()) {
                status = IpmStatus::Diverged(DivergenceReason::NotANumber);
            } else if alphap < ALPHA_MIN || alphad < ALPHA_MIN {
                status = IpmStatus::Diverged(DivergenceReason::StepCollapsed { alphap, alphad });
            } else if gamma < EPS || gamma > 1.0 / EPS {
                status = IpmStatus::Diverged(DivergenceReason::BarrierOutOfRange(gamma));
            }
            f0 = p.f;
            if opt.step_control {
                l_merit = merit(&p, &lam, &mu, &z, gamma);
            }
        }
    }

    match status {
        IpmStatus::Converged => log::info!("Converged in {} iterations.", i),
        IpmStatus::Exhausted => log::info!("Did not converge in {} iterations.", i),
        IpmStatus::Diverged(reason) => log::info!("Did not converge in {} iterations: {}.", i, reason),
    }

    // zero out multipliers on non-binding constraints
    for (mu, &g) in zip(&mut mu, &p.g) {
        if g < -opt.feastol && *mu < MU_THRESHOLD {
            *mu = 0.0;
        }
    }

    // un-scale cost and prices
    let f = p.f / opt.cost_mult;
    lam.iter_mut().for_each(|v| *v /= opt.cost_mult);
    mu.iter_mut().for_each(|v| *v /= opt.cost_mult);

    // re-package multipliers
    let lam_lin = &lam[neqnln..];
    let mu_lin = &mu[niqnln..];

    let mut mu_l = vec![0.0; n_aa];
    let mut mu_u = vec![0.0; n_aa];
    for (&k, &lam) in zip(&ieq, lam_lin) {
        if lam < 0.0 {
            mu_l[k] = -lam;
        } else if lam > 0.0 {
            mu_u[k] = lam;
        }
    }
    for (j, &k) in ilt.iter().enumerate() {
        mu_u[k] = mu_lin[j];
    }
    for (j, &k) in igt.iter().enumerate() {
        mu_l[k] = mu_lin[nlt + j];
    }
    for (j, &k) in ibx.iter().enumerate() {
        mu_u[k] = mu_lin[nlt + ngt + j];
        mu_l[k] = mu_lin[nlt + ngt + nbx + j];
    }

    let lambda = Lambda {
        eq_nonlin: lam[..neqnln].to_vec(),
        ineq_nonlin: mu[..niqnln].to_vec(),
        mu_l: mu_l[nx..].to_vec(),
        mu_u: mu_u[nx..].to_vec(),
        lower: mu_l[..nx].to_vec(),
        upper: mu_u[..nx].to_vec(),
    };

    Ok(Solution {
        x,
        f,
        status,
        iterations: i,
        lambda,
        feascond,
        gradcond,
        compcond,
        costcond,
    })
}
