//! Second derivatives of bus injections and branch flows w.r.t. voltage
//! angle and magnitude, each multiplied by a vector of multipliers.
use crate::sbus::check_voltage;
use crate::sparse::{entries, row};
use anyhow::Result;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use sparsetools::Scalar;

/// The four blocks of a second derivative w.r.t. `[Va; Vm]`.
///
/// `av` holds `d/dVm (dF/dVa)`, so the assembled Hessian reads
/// `[aa av; va vv]`.
pub struct D2<T> {
    pub aa: CSR<usize, T>,
    pub av: CSR<usize, T>,
    pub va: CSR<usize, T>,
    pub vv: CSR<usize, T>,
}

impl D2<Complex64> {
    pub fn re(&self) -> D2<f64> {
        self.map(|c| c.re)
    }

    pub fn im(&self) -> D2<f64> {
        self.map(|c| c.im)
    }

    fn map(&self, f: impl Fn(Complex64) -> f64) -> D2<f64> {
        let m = |a: &CSR<usize, Complex64>| {
            let mut coo = Coo::with_size(a.rows(), a.cols());
            for (i, j, v) in entries(a) {
                coo.push(i, j, f(v));
            }
            coo.to_csr()
        };
        D2 {
            aa: m(&self.aa),
            av: m(&self.av),
            va: m(&self.va),
            vv: m(&self.vv),
        }
    }
}

impl<T: Scalar> D2<T> {
    /// Adds the blocks to `coo` with the angle block starting at row/column
    /// `a0` and the magnitude block at `v0`.
    pub(crate) fn push_into(&self, coo: &mut Coo<usize, T>, a0: usize, v0: usize) {
        crate::sparse::push_block(coo, &self.aa, a0, a0);
        crate::sparse::push_block(coo, &self.av, a0, v0);
        crate::sparse::push_block(coo, &self.va, v0, a0);
        crate::sparse::push_block(coo, &self.vv, v0, v0);
    }
}

/// Computes second derivatives of power injection w.r.t. voltage.
///
/// Returns the blocks of `d/dV (dSbus/dV' * lam)` for the bus admittance
/// matrix `y_bus`.
pub fn d2_sbus_d_v2(
    y_bus: &CSR<usize, Complex64>,
    v: &[Complex64],
    lam: &[f64],
) -> Result<D2<Complex64>> {
    check_voltage(v)?;

    let n = v.len();
    let j = Complex64::i();
    let i_bus: Vec<Complex64> = y_bus * v;

    // C = diag(lam.*V) * conj(Ybus * diag(V))
    // E = conj(diag(V)) * (Ybus' * diag(V) * diag(lam) - diag(Ybus' * diag(V) * lam))
    // F = C - diag(lam.*V) * diag(conj(Ibus))
    let mut c = Vec::new();
    let mut e = Vec::new();
    let mut w = vec![Complex64::default(); n];
    for (r, k, y) in entries(y_bus) {
        c.push((r, k, lam[r] * v[r] * (y * v[k]).conj()));
        let t = y.conj() * v[r] * lam[r];
        e.push((k, r, v[k].conj() * t));
        w[k] += t;
    }
    for a in 0..n {
        e.push((a, a, -v[a].conj() * w[a]));
    }
    let f_diag: Vec<Complex64> = (0..n).map(|a| -lam[a] * v[a] * i_bus[a].conj()).collect();

    let mut aa = Coo::with_size(n, n);
    let mut va = Coo::with_size(n, n);
    let mut av = Coo::with_size(n, n);
    let mut vv = Coo::with_size(n, n);

    // Gaa = E + F
    // Gva = 1j * diag(1./|V|) * (E - F)
    for &(r, k, x) in &e {
        aa.push(r, k, x);
        va.push(r, k, j * x / v[r].norm());
        av.push(k, r, j * x / v[r].norm());
    }
    for &(r, k, x) in &c {
        aa.push(r, k, x);
        va.push(r, k, -j * x / v[r].norm());
        av.push(k, r, -j * x / v[r].norm());

        // Gvv = diag(1./|V|) * (C + C.') * diag(1./|V|)
        let g = v[r].norm() * v[k].norm();
        vv.push(r, k, x / g);
        vv.push(k, r, x / g);
    }
    for (a, &x) in f_diag.iter().enumerate() {
        aa.push(a, a, x);
        va.push(a, a, -j * x / v[a].norm());
        av.push(a, a, -j * x / v[a].norm());
    }

    Ok(D2 {
        aa: aa.to_csr(),
        av: av.to_csr(),
        va: va.to_csr(),
        vv: vv.to_csr(),
    })
}

/// Computes second derivatives of complex branch power flow w.r.t. voltage.
///
/// Returns the blocks of `d/dV (dSbr/dV' * lam)` where `y_br` is `Yf` or
/// `Yt` and `bus` holds the corresponding "from" or "to" bus of each
/// branch.
pub fn d2_sbr_d_v2(
    y_br: &CSR<usize, Complex64>,
    bus: &[usize],
    v: &[Complex64],
    lam: &[Complex64],
) -> Result<D2<Complex64>> {
    check_voltage(v)?;

    let n = v.len();
    let j = Complex64::i();

    // A = Ybr' * diag(lam) * Cbr
    let mut a = Coo::with_size(n, n);
    for (l, i, y) in entries(y_br) {
        a.push(i, bus[l], y.conj() * lam[l]);
    }
    let a = a.to_csr();

    let mut b = Vec::new();
    let mut d = vec![Complex64::default(); n];
    let mut e = vec![Complex64::default(); n];
    for (i, k, x) in entries(&a) {
        b.push((i, k, v[i].conj() * x * v[k]));
        d[i] += x * v[k] * v[i].conj();
        e[k] += x * v[i].conj() * v[k];
    }

    let mut aa = Coo::with_size(n, n);
    let mut va = Coo::with_size(n, n);
    let mut av = Coo::with_size(n, n);
    let mut vv = Coo::with_size(n, n);

    // Haa = B + B.' - D - E
    // Hva = 1j * G * (B - B.' - D + E)
    // Hvv = G * (B + B.') * G
    for &(i, k, x) in &b {
        aa.push(i, k, x);
        aa.push(k, i, x);

        let (gi, gk) = (1.0 / v[i].norm(), 1.0 / v[k].norm());
        va.push(i, k, j * gi * x);
        va.push(k, i, -j * gk * x);
        av.push(k, i, j * gi * x);
        av.push(i, k, -j * gk * x);

        vv.push(i, k, gi * x * gk);
        vv.push(k, i, gk * x * gi);
    }
    for i in 0..n {
        let g = 1.0 / v[i].norm();
        aa.push(i, i, -d[i] - e[i]);
        va.push(i, i, j * g * (e[i] - d[i]));
        av.push(i, i, j * g * (e[i] - d[i]));
    }

    Ok(D2 {
        aa: aa.to_csr(),
        av: av.to_csr(),
        va: va.to_csr(),
        vv: vv.to_csr(),
    })
}

/// Computes second derivatives of complex branch current w.r.t. voltage.
pub fn d2_ibr_d_v2(
    y_br: &CSR<usize, Complex64>,
    v: &[Complex64],
    lam: &[Complex64],
) -> Result<D2<Complex64>> {
    check_voltage(v)?;

    let n = v.len();

    // Haa = diag(-(Ybr.' * lam) .* V)
    let mut s = vec![Complex64::default(); n];
    for (l, i, y) in entries(y_br) {
        s[i] += y * lam[l];
    }

    let mut aa = Coo::with_size(n, n);
    let mut va = Coo::with_size(n, n);
    for i in 0..n {
        let h = -s[i] * v[i];
        aa.push(i, i, h);
        va.push(i, i, -Complex64::i() * h / v[i].norm());
    }
    let va = va.to_csr();

    Ok(D2 {
        aa: aa.to_csr(),
        av: va.clone(),
        va,
        vv: CSR::with_size(n, n),
    })
}

/// Second derivatives of squared branch power flow magnitudes.
///
/// Returns the blocks of `d/dV (dAbr/dV' * mu)` where `A = |Sbr|^2`, or
/// `A = Re(Sbr)^2` with `real_only`. `d_va` and `d_vm` are the first
/// derivatives of the flows `s_br` at the same end of each branch.
pub fn d2_asbr_d_v2(
    d_va: &CSR<usize, Complex64>,
    d_vm: &CSR<usize, Complex64>,
    s_br: &[Complex64],
    y_br: &CSR<usize, Complex64>,
    bus: &[usize],
    v: &[Complex64],
    mu: &[f64],
    real_only: bool,
) -> Result<D2<f64>> {
    let s_br: Vec<Complex64> = if real_only {
        s_br.iter().map(|s| Complex64::new(s.re, 0.0)).collect()
    } else {
        s_br.to_vec()
    };
    let lam: Vec<Complex64> = s_br.iter().zip(mu).map(|(s, m)| s.conj() * m).collect();
    let s2 = d2_sbr_d_v2(y_br, bus, v, &lam)?;

    Ok(d2_abs2(&s2, d_va, d_vm, mu, real_only, v.len()))
}

/// Second derivatives of squared branch current magnitudes.
pub fn d2_aibr_d_v2(
    d_va: &CSR<usize, Complex64>,
    d_vm: &CSR<usize, Complex64>,
    i_br: &[Complex64],
    y_br: &CSR<usize, Complex64>,
    v: &[Complex64],
    mu: &[f64],
) -> Result<D2<f64>> {
    let lam: Vec<Complex64> = i_br.iter().zip(mu).map(|(i, m)| i.conj() * m).collect();
    let i2 = d2_ibr_d_v2(y_br, v, &lam)?;

    Ok(d2_abs2(&i2, d_va, d_vm, mu, false, v.len()))
}

// H = 2 * real(F2 + dF_dX.' * diag(mu) * conj(dF_dY))
fn d2_abs2(
    f2: &D2<Complex64>,
    d_va: &CSR<usize, Complex64>,
    d_vm: &CSR<usize, Complex64>,
    mu: &[f64],
    real_only: bool,
    n: usize,
) -> D2<f64> {
    let block = |f2: &CSR<usize, Complex64>, dx: &CSR<usize, Complex64>, dy: &CSR<usize, Complex64>| {
        let mut h = Coo::with_size(n, n);
        for (i, k, x) in entries(f2) {
            h.push(i, k, 2.0 * x.re);
        }
        for (l, &m) in mu.iter().enumerate() {
            if m == 0.0 {
                continue;
            }
            for (i, a) in row(dx, l) {
                for (k, b) in row(dy, l) {
                    let p = if real_only {
                        a.re * b.re
                    } else {
                        (a * b.conj()).re
                    };
                    h.push(i, k, 2.0 * m * p);
                }
            }
        }
        h.to_csr()
    };

    D2 {
        aa: block(&f2.aa, d_va, d_va),
        av: block(&f2.av, d_va, d_vm),
        va: block(&f2.va, d_vm, d_va),
        vv: block(&f2.vv, d_vm, d_vm),
    }
}
