use crate::case::Case;
use crate::error::CaseError;
use anyhow::Result;
use num_complex::Complex64;
use sparsetools::csr::{CCSR, CSR};

/// Builds the vector of complex bus power injections.
///
/// Returns the vector of complex bus power injections, that is, generation
/// minus load. Power is expressed in per unit. Bus indexes must be
/// consecutive (internal ordering).
pub fn make_sbus(case: &Case) -> Vec<Complex64> {
    let base_mva = Complex64::new(case.base_mva, 0.0);

    let mut s_bus = vec![Complex64::default(); case.buses.len()];

    case.generators
        .iter()
        .filter(|g| g.is_on())
        .for_each(|g| {
            s_bus[g.bus] += Complex64::new(g.p, g.q) / base_mva;
        });

    case.buses
        .iter()
        .enumerate()
        .filter(|(_, b)| b.p_demand != 0.0 || b.q_demand != 0.0)
        .for_each(|(i, b)| {
            s_bus[i] -= Complex64::new(b.p_demand, b.q_demand) / base_mva;
        });

    s_bus
}

/// Fails if any voltage has zero magnitude.
pub(crate) fn check_voltage(v: &[Complex64]) -> Result<(), CaseError> {
    match v.iter().position(|v| v.norm() == 0.0) {
        Some(i) => Err(CaseError::ZeroVoltage(i)),
        None => Ok(()),
    }
}

/// Computes partial derivatives of power injection w.r.t. voltage.
///
/// Returns `(dSbus/dVa, dSbus/dVm)`, the derivatives with respect to the
/// voltage angles and magnitudes (polar coordinates).
pub fn d_sbus_d_v(
    y_bus: &CSR<usize, Complex64>,
    v: &[Complex64],
) -> Result<(CSR<usize, Complex64>, CSR<usize, Complex64>)> {
    check_voltage(v)?;

    let i_bus = y_bus * v;

    let diag_v = CSR::<usize, Complex64>::with_diagonal(v.to_vec());
    let diag_i_bus = CSR::<usize, Complex64>::with_diagonal(i_bus);

    let v_norm = v
        .iter()
        .map(|v| v / Complex64::new(v.norm(), 0.0))
        .collect();
    let diag_v_norm = CSR::<usize, Complex64>::with_diagonal(v_norm);

    // dSbus/dVa = 1j * diagV * conj(diagIbus - Ybus * diagV)
    // dSbus/dVm = diagV * conj(Ybus * diagVnorm) + conj(diagIbus) * diagVnorm

    let mut d_sbus_d_va = &diag_v * (&diag_i_bus - y_bus * &diag_v).conj() * Complex64::i();
    let mut d_sbus_d_vm = &diag_v * (y_bus * &diag_v_norm).conj() + diag_i_bus.conj() * &diag_v_norm;

    d_sbus_d_va.sort_indexes();
    d_sbus_d_vm.sort_indexes();

    Ok((d_sbus_d_va, d_sbus_d_vm))
}
