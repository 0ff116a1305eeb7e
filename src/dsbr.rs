use crate::sbus::check_voltage;
use crate::sparse::entries;
use anyhow::Result;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use std::iter::zip;

/// Partial derivatives of a branch flow quantity (complex power or
/// current) at both ends of every branch w.r.t. voltage angle and
/// magnitude, together with the flows themselves.
pub struct BranchDerivatives {
    pub df_dva: CSR<usize, Complex64>,
    pub df_dvm: CSR<usize, Complex64>,
    pub dt_dva: CSR<usize, Complex64>,
    pub dt_dvm: CSR<usize, Complex64>,
    pub f: Vec<Complex64>,
    pub t: Vec<Complex64>,
}

/// Computes partial derivatives of branch power flows w.r.t. voltage.
///
/// `f` and `t` are the "from" and "to" bus of each branch.
///
/// ```text
/// dSf/dVa = 1j * (conj(diag(If)) * sparse(1:nl, f, V(f)) - diag(V(f)) * conj(Yf * diag(V)))
/// dSf/dVm = diag(V(f)) * conj(Yf * diag(V./|V|)) + conj(diag(If)) * sparse(1:nl, f, V(f)./|V(f)|)
/// ```
///
/// and similarly for the "to" end.
pub fn d_sbr_d_v(
    y_f: &CSR<usize, Complex64>,
    y_t: &CSR<usize, Complex64>,
    f: &[usize],
    t: &[usize],
    v: &[Complex64],
) -> Result<BranchDerivatives> {
    check_voltage(v)?;

    let (df_dva, df_dvm, s_f) = d_send_d_v(y_f, f, v);
    let (dt_dva, dt_dvm, s_t) = d_send_d_v(y_t, t, v);

    Ok(BranchDerivatives {
        df_dva,
        df_dvm,
        dt_dva,
        dt_dvm,
        f: s_f,
        t: s_t,
    })
}

fn d_send_d_v(
    y_br: &CSR<usize, Complex64>,
    bus: &[usize],
    v: &[Complex64],
) -> (CSR<usize, Complex64>, CSR<usize, Complex64>, Vec<Complex64>) {
    let (nl, nb) = (y_br.rows(), y_br.cols());
    let j = Complex64::i();

    let i_br: Vec<Complex64> = y_br * v;
    let v_norm: Vec<Complex64> = v.iter().map(|v| v / v.norm()).collect();

    let mut d_va = Coo::with_size(nl, nb);
    let mut d_vm = Coo::with_size(nl, nb);

    for (l, k, y) in entries(y_br) {
        let vb = v[bus[l]];
        d_va.push(l, k, -j * vb * (y * v[k]).conj());
        d_vm.push(l, k, vb * (y * v_norm[k]).conj());
    }
    for (l, &b) in bus.iter().enumerate() {
        d_va.push(l, b, j * i_br[l].conj() * v[b]);
        d_vm.push(l, b, i_br[l].conj() * v_norm[b]);
    }

    let s_br = zip(bus, &i_br).map(|(&b, i)| v[b] * i.conj()).collect();

    (d_va.to_csr(), d_vm.to_csr(), s_br)
}

/// Computes partial derivatives of branch currents w.r.t. voltage.
///
/// ```text
/// dIf/dVa = Yf * 1j * diag(V)
/// dIf/dVm = Yf * diag(V./|V|)
/// ```
pub fn d_ibr_d_v(
    y_f: &CSR<usize, Complex64>,
    y_t: &CSR<usize, Complex64>,
    v: &[Complex64],
) -> Result<BranchDerivatives> {
    check_voltage(v)?;

    let d = |y_br: &CSR<usize, Complex64>| {
        let mut d_va = Coo::with_size(y_br.rows(), y_br.cols());
        let mut d_vm = Coo::with_size(y_br.rows(), y_br.cols());
        for (l, k, y) in entries(y_br) {
            d_va.push(l, k, y * Complex64::i() * v[k]);
            d_vm.push(l, k, y * v[k] / v[k].norm());
        }
        (d_va.to_csr(), d_vm.to_csr())
    };
    let (df_dva, df_dvm) = d(y_f);
    let (dt_dva, dt_dvm) = d(y_t);

    Ok(BranchDerivatives {
        df_dva,
        df_dvm,
        dt_dva,
        dt_dvm,
        f: y_f * v,
        t: y_t * v,
    })
}

/// Partial derivatives of squared branch flow magnitudes w.r.t. voltage.
///
/// Returns `(dAf/dVa, dAf/dVm, dAt/dVa, dAt/dVm)` where `A = |F|^2`. With
/// `real_only` the imaginary parts are ignored, so that `A = Re(F)^2`
/// (active power limits).
pub fn d_abr_d_v(
    d: &BranchDerivatives,
    real_only: bool,
) -> (
    CSR<usize, f64>,
    CSR<usize, f64>,
    CSR<usize, f64>,
    CSR<usize, f64>,
) {
    (
        d_abs2(&d.df_dva, &d.f, real_only),
        d_abs2(&d.df_dvm, &d.f, real_only),
        d_abs2(&d.dt_dva, &d.t, real_only),
        d_abs2(&d.dt_dvm, &d.t, real_only),
    )
}

// dA/dx = 2 * (Re(F) * Re(dF/dx) + Im(F) * Im(dF/dx))
fn d_abs2(df: &CSR<usize, Complex64>, flow: &[Complex64], real_only: bool) -> CSR<usize, f64> {
    let mut da = Coo::with_size(df.rows(), df.cols());
    for (l, k, d) in entries(df) {
        let v = if real_only {
            2.0 * flow[l].re * d.re
        } else {
            2.0 * (flow[l].re * d.re + flow[l].im * d.im)
        };
        da.push(l, k, v);
    }
    da.to_csr()
}

/// Squared branch flow magnitudes at one end, or squared active power
/// with `real_only`.
pub(crate) fn abs2(flow: &[Complex64], real_only: bool) -> Vec<f64> {
    flow.iter()
        .map(|s| if real_only { s.re * s.re } else { s.norm_sqr() })
        .collect()
}
