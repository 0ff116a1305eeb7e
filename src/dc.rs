use crate::case::Case;
use anyhow::Result;
use full::slice::norm_inf;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use spsolve::Solver;
use std::iter::zip;

/// Builds the B matrices and phase shift injections for DC power flow.
///
/// Returns the B matrices and phase shift injection vectors needed for
/// a DC power flow. The bus real power injections are related to bus
/// voltage angles by
///     P = BBUS * Va + PBUSINJ
/// The real power flows at the from end the lines are related to the bus
/// voltage angles by
///     Pf = BF * Va + PFINJ
/// Bus indexes must be consecutive (internal ordering).
pub fn make_b_dc(case: &Case) -> (CSR<usize, f64>, CSR<usize, f64>, Vec<f64>, Vec<f64>) {
    let (nl, nb) = (case.branches.len(), case.buses.len());

    // Build Bf such that Bf * Va is the vector of real branch powers injected
    // at each branch's "from" bus.
    let mut b_f = Coo::with_size(nl, nb);
    let mut b_bus = Coo::with_size(nb, nb);

    let mut p_finj = vec![0.0; nl];
    let mut p_businj = vec![0.0; nb];

    for (i, br) in case.branches.iter().enumerate().filter(|(_, br)| br.is_on()) {
        let b = series_susceptance(br.x) / br.tap();
        let (f, t) = (br.from_bus, br.to_bus);

        b_f.push(i, f, b);
        b_f.push(i, t, -b);

        // Bbus = Cft' * Bf
        b_bus.push(f, f, b);
        b_bus.push(f, t, -b);
        b_bus.push(t, f, -b);
        b_bus.push(t, t, b);

        // injected at the from bus and extracted at the to bus
        p_finj[i] = b * -br.phase_shift.to_radians();
        p_businj[f] += p_finj[i];
        p_businj[t] -= p_finj[i];
    }

    (b_bus.to_csr(), b_f.to_csr(), p_businj, p_finj)
}

/// `1/x`, with zero reactance mapped to a large finite susceptance.
fn series_susceptance(x: f64) -> f64 {
    if x == 0.0 {
        1e10
    } else {
        1.0 / x
    }
}

/// Solves a DC power flow.
///
/// Solves for the bus voltage angles at all but the reference bus,
/// given the full system B matrix and the vector of bus real power injections,
/// the initial vector of bus voltage angles (in radians), and the lists of
/// bus indices for the swing bus, PV buses, and PQ buses, respectively.
/// Returns a vector of bus voltage angles in radians and a success flag.
pub fn dc_pf(
    b_mat: &CSR<usize, f64>,
    p_bus: &[f64],
    va0: &[f64],
    ref_: &[usize],
    pv: &[usize],
    pq: &[usize],
    solver: &dyn Solver<usize, f64>,
) -> Result<(Vec<f64>, bool)> {
    let va_threshold = 1e5; // arbitrary threshold on |Va| for declaring failure

    let mut va = va0.to_vec();

    // update angles for non-reference buses
    let pvpq = [pv, pq].concat();
    if pvpq.is_empty() {
        return Ok((va, true));
    }

    // Va([pv; pq]) = B([pv; pq], [pv; pq]) \ ...
    //                     (Pbus([pv; pq]) - B([pv; pq], ref) * Va0(ref));

    let b_pvpq = b_mat.select(Some(&pvpq), Some(&pvpq))?;
    let p_bus_pvpq: Vec<f64> = pvpq.iter().map(|&i| p_bus[i]).collect();

    let mut rhs = if ref_.is_empty() {
        p_bus_pvpq
    } else {
        let b_ref = b_mat.select(Some(&pvpq), Some(ref_))?;
        let va_ref: Vec<f64> = ref_.iter().map(|&i| va0[i]).collect();
        let p_ref: Vec<f64> = &b_ref * &va_ref;
        zip(p_bus_pvpq, p_ref)
            .map(|(p_bus, p_ref)| p_bus - p_ref)
            .collect()
    };

    // CSR of B is CSC of B', so solve the transposed system.
    solver.solve(
        b_pvpq.cols(),
        b_pvpq.colidx(),
        b_pvpq.rowptr(),
        b_pvpq.values(),
        &mut rhs,
        true,
    )?;

    for (i, &j) in pvpq.iter().enumerate() {
        va[j] = rhs[i];
    }

    let success = va.iter().all(|va| va.is_finite()) && norm_inf(&va) <= va_threshold;

    Ok((va, success))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{congested_two_bus, three_bus};
    use spsolve::rlu::RLU;

    #[test]
    fn b_matrices() {
        let case = congested_two_bus();
        let (b_bus, b_f, p_businj, p_finj) = make_b_dc(&case);

        let va = vec![0.0, -0.05];
        let p: Vec<f64> = &b_bus * &va;
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!((p[1] + 0.5).abs() < 1e-12);

        let pf: Vec<f64> = &b_f * &va;
        assert!((pf[0] - 0.5).abs() < 1e-12);

        assert_eq!(p_businj, vec![0.0, 0.0]);
        assert_eq!(p_finj, vec![0.0]);
    }

    #[test]
    fn phase_shift_injection() {
        let mut case = congested_two_bus();
        case.branches[0].phase_shift = 5.0;
        let (_, _, p_businj, p_finj) = make_b_dc(&case);

        let expected = 10.0 * -5f64.to_radians();
        assert!((p_finj[0] - expected).abs() < 1e-12);
        assert!((p_businj[0] - expected).abs() < 1e-12);
        assert!((p_businj[1] + expected).abs() < 1e-12);
    }

    #[test]
    fn zero_reactance_is_finite() {
        let mut case = congested_two_bus();
        case.branches[0].x = 0.0;
        let (b_bus, _, _, _) = make_b_dc(&case);
        let p: Vec<f64> = &b_bus * &vec![0.0, -1e-9];
        assert!(p.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn dc_power_flow() -> anyhow::Result<()> {
        let case = three_bus();
        let (b_bus, _, _, _) = make_b_dc(&case);

        // 1.5 p.u. drawn at bus 3, 0.2 p.u. net injection at bus 2
        let p_bus = vec![1.3, 0.2, -1.5];
        let (va, success) = dc_pf(&b_bus, &p_bus, &[0.0; 3], &[0], &[1], &[2], &RLU::default())?;
        assert!(success);
        assert_eq!(va[0], 0.0);

        let p: Vec<f64> = &b_bus * &va;
        for (p, p_bus) in p.iter().zip(&p_bus) {
            assert!((p - p_bus).abs() < 1e-9);
        }
        Ok(())
    }
}
