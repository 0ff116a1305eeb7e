use crate::debug::{format_f64_vec, format_polar_vec};
use crate::jac::reduced_jac;
use crate::opt::PfOpt;
use crate::sbus::d_sbus_d_v;

use anyhow::Result;
use full::slice::norm_inf;
use num_complex::Complex64;
use sparsetools::csc::CSC;
use sparsetools::csr::CSR;
use spsolve::Solver;
use std::iter::zip;

/// Outcome of a power flow iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PfStatus {
    Converged,
    /// The iteration limit was reached.
    Exhausted,
    /// The mismatch or update became non-finite, or the Jacobian is
    /// singular.
    Diverged,
}

impl PfStatus {
    pub fn converged(&self) -> bool {
        *self == PfStatus::Converged
    }
}

pub trait ProgressMonitor {
    fn update(&self, i: usize, norm_f: f64);
}

/// Prints the mismatch norm of each iteration to the log.
pub struct LogProgress;

impl ProgressMonitor for LogProgress {
    fn update(&self, i: usize, norm_f: f64) {
        log::info!("{:>3} {:12.6e}", i, norm_f);
    }
}

/// Solves power flow using full Newton's method (power/polar).
///
/// Solves for bus voltages using a full Newton-Raphson method, using nodal
/// power balance equations and polar coordinate representation of
/// voltages.
///
/// The bus voltage vector contains the set point for generator
/// (including ref bus) buses, and the reference angle of the swing
/// bus, as well as an initial guess for remaining magnitudes and
/// angles. `s_bus` is the vector of specified complex bus injections.
///
/// Returns the final complex voltages, the outcome and the number of
/// iterations performed.
pub fn newtonpf(
    y_bus: &CSR<usize, Complex64>,
    s_bus: &[Complex64],
    v0: &[Complex64],
    _ref: &[usize],
    pv: &[usize],
    pq: &[usize],
    solver: &dyn Solver<usize, f64>,
    opt: &PfOpt,
    progress: Option<&dyn ProgressMonitor>,
) -> Result<(Vec<Complex64>, PfStatus, usize)> {
    let pv_pq = [pv, pq].concat();

    let mut i = 0;
    let mut v: Vec<Complex64> = v0.to_vec();
    let mut va: Vec<f64> = v.iter().map(|v| v.arg()).collect();
    let mut vm: Vec<f64> = v.iter().map(|v| v.norm()).collect();

    // set up indexing for updating V
    let npv = pv.len();
    let npq = pq.len();
    let (j1, j2) = (0, npv); // j1:j2 - V angle of pv buses
    let (j3, j4) = (j2, j2 + npq); // j3:j4 - V angle of pq buses
    let (j5, j6) = (j4, j4 + npq); // j5:j6 - V mag of pq buses

    // evaluate F(x0)
    let mut f = mismatch(y_bus, s_bus, &v, &pv_pq, pq);

    let norm_f = mismatch_norm(&f);
    if let Some(pm) = progress {
        pm.update(i, norm_f);
    }
    log::debug!("norm_f0: {}", norm_f);
    if !norm_f.is_finite() {
        log::error!("Newton's method power flow: non-finite initial mismatch.");
        return Ok((v, PfStatus::Diverged, i));
    }
    if norm_f < opt.tolerance {
        log::info!("Converged!");
        return Ok((v, PfStatus::Converged, i));
    }

    while i < opt.max_it {
        i += 1;

        // evaluate Jacobian
        let (d_sbus_d_va, d_sbus_d_vm) = d_sbus_d_v(y_bus, &v)?;
        let jac = reduced_jac(&d_sbus_d_va, &d_sbus_d_vm, &pv_pq, pq)?;
        if has_empty_line(&jac) {
            log::error!("Newton's method power flow: singular Jacobian.");
            return Ok((v, PfStatus::Diverged, i));
        }

        // compute update step
        let mut dx: Vec<f64> = f.iter().map(|f| -f).collect();
        if let Err(err) = solver.solve(
            jac.cols(),
            jac.rowidx(),
            jac.colptr(),
            jac.values(),
            &mut dx,
            false,
        ) {
            log::error!("Newton's method power flow: linear solve failed: {}", err);
            return Ok((v, PfStatus::Diverged, i));
        }
        log::trace!("dx: {}", format_f64_vec(&dx));

        if dx.iter().any(|dx| !dx.is_finite()) {
            log::error!("Newton's method power flow diverged in {} iterations.", i);
            return Ok((v, PfStatus::Diverged, i));
        }

        // update voltage
        for (k, j) in (j1..j2).enumerate() {
            va[pv[k]] += dx[j];
        }
        for (k, j) in (j3..j4).enumerate() {
            va[pq[k]] += dx[j];
        }
        for (k, j) in (j5..j6).enumerate() {
            vm[pq[k]] += dx[j];
        }

        // update Vm and Va again in case we wrapped around with a negative Vm
        v = zip(&vm, &va)
            .map(|(&vm, &va)| Complex64::from_polar(vm, va))
            .collect();
        va = v.iter().map(|v| v.arg()).collect();
        vm = v.iter().map(|v| v.norm()).collect();
        log::debug!("V_{}: {}", i, format_polar_vec(&v));

        // evalute F(x)
        f = mismatch(y_bus, s_bus, &v, &pv_pq, pq);

        // check for convergence
        let norm_f = mismatch_norm(&f);
        if let Some(pm) = progress {
            pm.update(i, norm_f);
        }
        log::debug!("norm_f{}: {}", i, norm_f);
        if !norm_f.is_finite() {
            log::error!("Newton's method power flow diverged in {} iterations.", i);
            return Ok((v, PfStatus::Diverged, i));
        }
        if norm_f < opt.tolerance {
            log::info!(
                "Newton's method power flow (power balance, polar) converged in {} iterations.",
                i
            );
            return Ok((v, PfStatus::Converged, i));
        }
    }

    log::info!(
        "Newton's method power flow (power balance, polar) did not converge in {} iterations.",
        i
    );
    Ok((v, PfStatus::Exhausted, i))
}

// NaN if any element is not finite.
fn mismatch_norm(f: &[f64]) -> f64 {
    if f.iter().all(|f| f.is_finite()) {
        norm_inf(f)
    } else {
        f64::NAN
    }
}

// True if a row or column of the Jacobian has no non-zero entry,
// e.g. for a PQ bus with no connected branches.
fn has_empty_line(jac: &CSC<usize, f64>) -> bool {
    let (colptr, rowidx, values) = (jac.colptr(), jac.rowidx(), jac.values());
    let mut row_nz = vec![false; jac.rows()];
    let mut col_nz = vec![false; jac.cols()];
    for j in 0..jac.cols() {
        for k in colptr[j]..colptr[j + 1] {
            if values[k] != 0.0 {
                row_nz[rowidx[k]] = true;
                col_nz[j] = true;
            }
        }
    }
    row_nz.contains(&false) || col_nz.contains(&false)
}

// F(x) = [Re(mis(pv_pq)); Im(mis(pq))]
fn mismatch(
    y_bus: &CSR<usize, Complex64>,
    s_bus: &[Complex64],
    v: &[Complex64],
    pv_pq: &[usize],
    pq: &[usize],
) -> Vec<f64> {
    let i_bus: Vec<Complex64> = y_bus * v;
    let mis: Vec<Complex64> = zip(v, zip(&i_bus, s_bus))
        .map(|(v, (i_bus, s_bus))| v * i_bus.conj() - s_bus)
        .collect();
    [
        pv_pq.iter().map(|&i| mis[i].re).collect::<Vec<_>>(),
        pq.iter().map(|&i| mis[i].im).collect::<Vec<_>>(),
    ]
    .concat()
}
