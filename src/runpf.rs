use crate::bus_types::bus_types;
use crate::case::Case;
use crate::dc::{dc_pf, make_b_dc};
use crate::debug::format_polar_vec;
use crate::ext_to_int::ext_to_int;
use crate::int_to_ext::int_to_ext;
use crate::newton::{newtonpf, PfStatus};
use crate::opt::PfOpt;
use crate::sbus::make_sbus;
use crate::ybus::{make_ybus, YbusOpt};

use anyhow::Result;
use num_complex::Complex64;
use sparsetools::csr::CSR;
use spsolve::Solver;
use std::collections::HashMap;
use std::f64::consts::PI;

/// Runs an AC power flow (full Newton's method).
///
/// The solved bus voltages, branch flows, reference bus active
/// generation and generator reactive outputs are written back onto
/// `case`. Returns the outcome and the number of iterations.
pub fn runpf(case: &mut Case, opt: &PfOpt, solver: &dyn Solver<usize, f64>) -> Result<(PfStatus, usize)> {
    case.validate()?;
    case.reset();

    // convert to internal indexing
    let (mut internal, order) = ext_to_int(case);
    if internal.buses.is_empty() {
        return Ok((PfStatus::Converged, 0));
    }

    // get bus index lists of each type of bus
    let (ref_, pv, pq) = bus_types(&internal);

    // initial state
    let mut v0: Vec<Complex64> = internal
        .buses
        .iter()
        .map(|b| Complex64::from_polar(b.v_magnitude_guess, b.v_angle_guess * PI / 180.0))
        .collect();
    for g in internal.generators.iter().filter(|g| g.is_on()) {
        if !pq.contains(&g.bus) {
            v0[g.bus] = v0[g.bus] / v0[g.bus].norm() * g.v_magnitude;
        }
    }
    log::debug!("V0: {}", format_polar_vec(&v0));

    // build admittance matrices
    let (y_bus, y_f, y_t) = make_ybus(&internal, &YbusOpt::default());
    log::trace!("Ybus:\n{}", y_bus.to_table());

    // compute complex bus power injections (generation - load)
    let s_bus = make_sbus(&internal);

    let (v, status, its) = newtonpf(&y_bus, &s_bus, &v0, &ref_, &pv, &pq, solver, opt, None)?;

    // update data matrices with solution
    pfsoln(&mut internal, &y_bus, &y_f, &y_t, &v, &ref_, &pq);
    int_to_ext(&internal, &order, case);

    Ok((status, its))
}

/// Updates bus, generator and branch data to match a power flow solution.
fn pfsoln(
    internal: &mut Case,
    y_bus: &CSR<usize, Complex64>,
    y_f: &CSR<usize, Complex64>,
    y_t: &CSR<usize, Complex64>,
    v: &[Complex64],
    refbus: &[usize],
    pq: &[usize],
) {
    let base_mva = internal.base_mva;

    for (i, b) in internal.buses.iter_mut().enumerate() {
        b.v_magnitude = v[i].norm();
        b.v_angle = v[i].arg() * 180.0 / PI;
    }

    // compute total injected bus power
    let i_bus: Vec<Complex64> = y_bus * v;
    let s_inj = |i: usize| v[i] * i_bus[i].conj() * base_mva;

    // Reactive power at generator buses: inj Q + local Qd, divided
    // between the units at the bus in proportion to their reactive range.
    let mut at_bus: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, g) in internal.generators.iter().enumerate() {
        if g.is_on() && !pq.contains(&g.bus) {
            at_bus.entry(g.bus).or_default().push(i);
        }
    }
    for (&b, gens) in at_bus.iter() {
        let qg_tot = s_inj(b).im + internal.buses[b].q_demand;

        if gens.len() == 1 {
            internal.generators[gens[0]].q = qg_tot;
            continue;
        }

        // replace +/- Inf limits with proxy +/- M
        let m: f64 = gens
            .iter()
            .map(|&i| {
                let g = &internal.generators[i];
                let mut m = (qg_tot / gens.len() as f64).abs();
                if g.q_max.is_finite() {
                    m += g.q_max.abs();
                }
                if g.q_min.is_finite() {
                    m += g.q_min.abs();
                }
                m
            })
            .sum();
        let proxy = |q: f64| if q.is_finite() { q } else { m.copysign(q) };

        let qmin: Vec<f64> = gens.iter().map(|&i| proxy(internal.generators[i].q_min)).collect();
        let qmax: Vec<f64> = gens.iter().map(|&i| proxy(internal.generators[i].q_max)).collect();
        let qg_min: f64 = qmin.iter().sum();
        let qg_max: f64 = qmax.iter().sum();

        for (k, &i) in gens.iter().enumerate() {
            internal.generators[i].q = if (qg_min - qg_max).abs() > 1e-13 {
                qmin[k] + (qg_tot - qg_min) / (qg_max - qg_min) * (qmax[k] - qmin[k])
            } else {
                // zero Qg range at bus, all units violate their limits
                // by the same amount
                qmin[k] + (qg_tot - qg_min) / gens.len() as f64
            };
        }
    }

    // update Pg for slack gen (1st gen at ref bus), subtracting off what
    // is generated by other gens at this bus
    for &r in refbus {
        let at_ref: Vec<usize> = (0..internal.generators.len())
            .filter(|&i| internal.generators[i].is_on() && internal.generators[i].bus == r)
            .collect();
        if let Some((&first, others)) = at_ref.split_first() {
            let others: f64 = others.iter().map(|&i| internal.generators[i].p).sum();
            internal.generators[first].p = s_inj(r).re + internal.buses[r].p_demand - others;
        }
    }

    // update/compute branch power flows
    let i_f: Vec<Complex64> = y_f * v;
    let i_t: Vec<Complex64> = y_t * v;
    for (l, br) in internal.branches.iter_mut().enumerate() {
        if br.is_on() {
            let s_f = v[br.from_bus] * i_f[l].conj() * base_mva;
            let s_t = v[br.to_bus] * i_t[l].conj() * base_mva;

            br.p_from = s_f.re;
            br.q_from = s_f.im;
            br.p_to = s_t.re;
            br.q_to = s_t.im;
        } else {
            br.p_from = 0.0;
            br.q_from = 0.0;
            br.p_to = 0.0;
            br.q_to = 0.0;
        }
    }
}

/// Runs a DC power flow.
///
/// Bus voltage angles (magnitudes are set to 1 p.u.), branch active power
/// flows and the output of the first generator at the reference bus are
/// written back onto `case`. Returns the success flag.
pub fn rundcpf(case: &mut Case, solver: &dyn Solver<usize, f64>) -> Result<bool> {
    case.validate()?;
    case.reset();

    let (mut internal, order) = ext_to_int(case);
    if internal.buses.is_empty() {
        return Ok(true);
    }
    let base_mva = internal.base_mva;

    let (ref_, pv, pq) = bus_types(&internal);

    // initial state
    let va0: Vec<f64> = internal.buses.iter().map(|b| b.v_angle_guess * PI / 180.0).collect();

    // build B matrices and phase shift injections
    let (b_dc, b_f, p_businj, p_finj) = make_b_dc(&internal);

    // compute complex bus power injections (generation - load)
    // adjusted for phase shifters and real shunts
    let s_bus = make_sbus(&internal);
    let p_bus: Vec<f64> = (0..internal.buses.len())
        .map(|i| s_bus[i].re - p_businj[i] - internal.buses[i].g_shunt / base_mva)
        .collect();

    let (va, success) = dc_pf(&b_dc, &p_bus, &va0, &ref_, &pv, &pq, solver)?;
    log::info!("DC power flow {}.", if success { "succeeded" } else { "failed" });

    // update data matrices with solution
    let pf: Vec<f64> = &b_f * &va;
    for (l, br) in internal.branches.iter_mut().enumerate() {
        br.q_from = 0.0;
        br.q_to = 0.0;
        br.p_from = (pf[l] + p_finj[l]) * base_mva;
        br.p_to = -br.p_from;
    }
    for (i, b) in internal.buses.iter_mut().enumerate() {
        b.v_magnitude = 1.0;
        b.v_angle = va[i] * 180.0 / PI;
    }

    // update Pg for slack generator (1st gen at ref bus)
    //      newPg = oldPg + newPinj - oldPinj
    let p_calc: Vec<f64> = &b_dc * &va;
    for &r in &ref_ {
        if let Some(g) = internal.generators.iter_mut().find(|g| g.is_on() && g.bus == r) {
            g.p += (p_calc[r] - p_bus[r]) * base_mva;
        }
    }

    int_to_ext(&internal, &order, case);

    Ok(success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{four_bus, three_bus};
    use crate::opf::{solve, Solver as OpfSolver};
    use crate::opt::OpfOpt;
    use spsolve::rlu::RLU;

    #[test]
    fn four_bus_ac() -> Result<()> {
        let mut case = four_bus();
        let (status, its) = runpf(&mut case, &PfOpt::default(), &RLU::default())?;
        assert_eq!(status, PfStatus::Converged);
        assert!(its <= 6);

        let expected = [(1.0, 0.0), (0.982, -0.976), (0.969, -1.872), (1.02, 1.523)];
        for (b, (vm, va)) in case.buses.iter().zip(expected) {
            assert!((b.v_magnitude - vm).abs() < 1e-3);
            assert!((b.v_angle - va).abs() < 1e-3);
        }

        // reference generator and PV bus reactive output
        assert!((case.generators[1].p - 186.81).abs() < 0.01);
        assert!((case.generators[1].q - 114.50).abs() < 0.01);
        assert!((case.generators[0].q - 181.43).abs() < 0.01);

        // power balance across every branch
        let losses: f64 = case.branches.iter().map(|br| br.p_losses()).sum();
        let generated: f64 = case.generators.iter().map(|g| g.p).sum();
        let load: f64 = case.buses.iter().map(|b| b.p_demand).sum();
        assert!((generated - load - losses).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn three_bus_dc() -> Result<()> {
        let mut case = three_bus();
        assert!(rundcpf(&mut case, &RLU::default())?);

        // G2 fixed at 80 MW, the reference unit picks up the rest
        assert!((case.generators[0].p - 170.0).abs() < 1e-6);
        assert_eq!(case.buses[0].v_angle, 0.0);
        for br in &case.branches {
            assert_eq!(br.p_from, -br.p_to);
        }
        // flows into bus 3 equal its load
        let into_3 = case.branches[1].p_from + case.branches[2].p_from;
        assert!((into_3 - 150.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn shunt_conductance_is_load() -> Result<()> {
        let mut case = three_bus();
        case.buses[2].g_shunt = 10.0;
        assert!(rundcpf(&mut case, &RLU::default())?);
        assert!((case.generators[0].p - 180.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn clears_opf_multipliers() -> Result<()> {
        let mut case = three_bus();
        solve(&mut case, OpfSolver::Dc, &OpfOpt::default(), &RLU::default())?;
        assert!((case.buses[2].p_lambda - 14.0).abs() < 1e-3);

        let mut ac = case.clone();
        let (status, _) = runpf(&mut ac, &PfOpt::default(), &RLU::default())?;
        assert!(status.converged());
        assert!(rundcpf(&mut case, &RLU::default())?);

        for case in [&ac, &case] {
            assert!(case.buses.iter().all(|b| b.p_lambda == 0.0 && b.mu_vmax == 0.0));
            assert!(case.generators.iter().all(|g| g.mu_pmin == 0.0 && g.mu_pmax == 0.0));
            assert!(case.branches.iter().all(|br| br.mu_s_from == 0.0 && br.mu_s_to == 0.0));
        }
        Ok(())
    }
}
