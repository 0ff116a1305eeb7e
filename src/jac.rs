use anyhow::Result;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use sparsetools::csc::CSC;
use sparsetools::csr::{CCSR, CSR};

use crate::bus_types::bus_types;
use crate::case::Case;
use crate::debug::format_polar_vec;
use crate::sbus::d_sbus_d_v;

/// Forms the power flow Jacobian.
///
/// Input is a case in internal ordering and its bus admittance matrix.
/// If `full_jac` is true, it returns the full Jacobian (sensitivities of
/// all bus injections w.r.t all voltage angles/magnitudes) as opposed to
/// the reduced version used in the Newton power flow updates. The units
/// for all quantities are in per unit with radians for voltage angles.
pub fn make_jac(case: &Case, y_bus: &CSR<usize, Complex64>, full_jac: bool) -> Result<CSC<usize, f64>> {
    let mut v: Vec<Complex64> = case
        .buses
        .iter()
        .map(|b| Complex64::from_polar(b.v_magnitude_guess, b.v_angle_guess.to_radians()))
        .collect();

    // make sure we use generator setpoint voltage for PV and slack buses
    for g in case.generators.iter().filter(|g| g.is_on()) {
        let b = &case.buses[g.bus];
        if b.is_pv() || b.is_ref() {
            v[g.bus] = v[g.bus] / v[g.bus].norm() * g.v_magnitude;
        }
    }
    log::debug!("V0: {}", format_polar_vec(&v));

    let (d_sbus_d_va, d_sbus_d_vm) = d_sbus_d_v(y_bus, &v)?;

    if full_jac {
        let jac = Coo::compose([
            [&d_sbus_d_va.real().to_coo(), &d_sbus_d_vm.real().to_coo()],
            [&d_sbus_d_va.imag().to_coo(), &d_sbus_d_vm.imag().to_coo()],
        ])?
        .to_csc();
        Ok(jac)
    } else {
        let (_, pv, pq) = bus_types(case);
        let pv_pq = [pv, pq.clone()].concat();
        reduced_jac(&d_sbus_d_va, &d_sbus_d_vm, &pv_pq, &pq)
    }
}

/// Slices the four quadrants of `dSbus/dV` to the angle rows/columns of
/// PV and PQ buses and the magnitude rows/columns of PQ buses.
pub(crate) fn reduced_jac(
    d_sbus_d_va: &CSR<usize, Complex64>,
    d_sbus_d_vm: &CSR<usize, Complex64>,
    pv_pq: &[usize],
    pq: &[usize],
) -> Result<CSC<usize, f64>> {
    let j11 = d_sbus_d_va.select(Some(pv_pq), Some(pv_pq))?.real();
    let j12 = d_sbus_d_vm.select(Some(pv_pq), Some(pq))?.real();
    let j21 = d_sbus_d_va.select(Some(pq), Some(pv_pq))?.imag();
    let j22 = d_sbus_d_vm.select(Some(pq), Some(pq))?.imag();

    let jac = Coo::compose([
        [&j11.to_coo(), &j12.to_coo()],
        [&j21.to_coo(), &j22.to_coo()],
    ])?
    .to_csc();
    log::trace!("J:\n{}", jac.to_csr().to_table());

    Ok(jac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::four_bus;
    use crate::ybus::{make_ybus, YbusOpt};

    #[test]
    fn dimensions() -> Result<()> {
        let case = four_bus();
        let (y_bus, _, _) = make_ybus(&case, &YbusOpt::default());

        // 1 PV and 2 PQ buses
        let jac = make_jac(&case, &y_bus, false)?;
        assert_eq!(jac.cols(), 5);
        assert_eq!(jac.colptr().len(), 6);

        let full = make_jac(&case, &y_bus, true)?;
        assert_eq!(full.cols(), 8);
        Ok(())
    }
}
