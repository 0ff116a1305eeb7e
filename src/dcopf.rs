use crate::case::Case;
use crate::dc::make_b_dc;
use crate::error::CaseError;
use crate::gen::CostModel;
use crate::ipm::{interior_point, qp};
use crate::opf::{ang_constraint, pwl_constraint, pwl_gens, set_ang_mu, y0, OpfResult};
use crate::opf_model::{from_triplets, hstack, Constraint, OpfModel};
use crate::opt::OpfOpt;
use crate::sparse::{mul_t, select_rows};

use anyhow::Result;
use sparsetools::csr::CSR;
use spsolve::Solver;

/// Coefficients `[c2, c1, c0]` of a polynomial cost of degree two or less.
pub(crate) fn quadratic_coeffs(c: &[f64], gen: usize) -> Result<[f64; 3], CaseError> {
    let first = c.iter().position(|&ci| ci != 0.0).unwrap_or(c.len());
    let c = &c[first.min(c.len().saturating_sub(1))..];
    if c.len() > 3 {
        return Err(CaseError::PolynomialDegree {
            gen,
            degree: c.len() - 1,
        });
    }
    let mut q = [0.0; 3];
    q[3 - c.len()..].copy_from_slice(c);
    Ok(q)
}

/// Checks that every polynomial cost is at most quadratic.
pub(crate) fn check_costs(case: &Case) -> Result<(), CaseError> {
    for (i, g) in case.generators.iter().enumerate() {
        if let CostModel::Polynomial(c) = &g.cost {
            quadratic_coeffs(c, i)?;
        }
    }
    Ok(())
}

/// Quadratic cost `1/2 w'*Hw*w + Cw'*w + c0` in auxiliary variables
/// `w = N*x`.
struct GeneralizedCost {
    n: CSR<usize, f64>,
    h_w: CSR<usize, f64>,
    c_w: Vec<f64>,
    c0: f64,
}

impl GeneralizedCost {
    /// Re-expresses the cost in terms of `x`: `1/2 x'*H*x + C'*x + c0`.
    fn to_quadratic(&self) -> (CSR<usize, f64>, Vec<f64>, f64) {
        let n_t = self.n.t().to_csr();
        let h = &(&n_t * &self.h_w) * &self.n;
        let c = mul_t(&self.n, &self.c_w);
        (h, c, self.c0)
    }
}

/// Builds the generator cost for the DC model. Piecewise linear costs
/// contribute their `y` variable and polynomial costs a quadratic term
/// in `Pg` (per unit).
fn dc_cost(case: &Case, om: &OpfModel, ipwl: &[usize]) -> Result<GeneralizedCost> {
    let base_mva = case.base_mva;
    let pg = om.var("Pg")?.offset();
    let ipol: Vec<usize> = (0..case.generators.len())
        .filter(|i| !ipwl.contains(i))
        .collect();

    let ny = ipwl.len();
    let nw = ny + ipol.len();
    let mut n_rows = Vec::with_capacity(nw);
    let mut h_w = Vec::with_capacity(ipol.len());
    let mut c_w = vec![1.0; ny];
    let mut c0 = 0.0;

    if ny > 0 {
        let y = om.var("y")?.offset();
        n_rows.extend((0..ny).map(|k| (k, y + k, 1.0)));
    }
    for (k, &i) in ipol.iter().enumerate() {
        let [c2, c1, c] = match &case.generators[i].cost {
            CostModel::Polynomial(c) => quadratic_coeffs(c, i)?,
            CostModel::PiecewiseLinear(_) => [0.0; 3],
        };
        n_rows.push((ny + k, pg + i, 1.0));
        if c2 != 0.0 {
            h_w.push((ny + k, ny + k, 2.0 * c2 * base_mva * base_mva));
        }
        c_w.push(c1 * base_mva);
        c0 += c;
    }

    Ok(GeneralizedCost {
        n: from_triplets(nw, om.nx(), n_rows),
        h_w: from_triplets(nw, nw, h_w),
        c_w,
        c0,
    })
}

/// Solves a DC optimal power flow on a case in internal ordering and
/// writes the results onto it.
pub(crate) fn dcopf(case: &mut Case, opt: &OpfOpt, solver: &dyn Solver<usize, f64>) -> Result<OpfResult> {
    let base_mva = case.base_mva;
    let (nb, ng) = (case.buses.len(), case.generators.len());
    let ref_bus = case.single_ref()?;
    let va_ref = case.buses[ref_bus].v_angle_guess.to_radians();

    let (b_bus, b_f, p_businj, p_finj) = make_b_dc(case);
    let ipwl = pwl_gens(case);
    let ny = ipwl.len();

    let mut om = OpfModel::new();

    let mut va_min = vec![f64::NEG_INFINITY; nb];
    let mut va_max = vec![f64::INFINITY; nb];
    va_min[ref_bus] = va_ref;
    va_max[ref_bus] = va_ref;
    om.add_var("Va", vec![va_ref; nb], va_min, va_max)?;

    let pmin: Vec<f64> = case.generators.iter().map(|g| g.p_min / base_mva).collect();
    let pmax: Vec<f64> = case.generators.iter().map(|g| g.p_max / base_mva).collect();
    om.add_var("Pg", interior_point(&pmin, &pmax), pmin, pmax)?;

    if ny > 0 {
        om.add_var(
            "y",
            vec![y0(case, &ipwl); ny],
            vec![f64::NEG_INFINITY; ny],
            vec![f64::INFINITY; ny],
        )?;
    }

    // power balance: Bbus * Va + Pbusinj = Cg * Pg - (Pd + Gs)
    let neg_cg = from_triplets(nb, ng, case.generators.iter().enumerate().map(|(k, g)| (g.bus, k, -1.0)));
    let p_mis: Vec<f64> = (0..nb)
        .map(|i| {
            let bus = &case.buses[i];
            -(bus.p_demand + bus.g_shunt) / base_mva - p_businj[i]
        })
        .collect();
    om.add_constraint(
        "Pmis",
        Constraint::Linear {
            a: hstack(&[&b_bus, &neg_cg]),
            l: p_mis.clone(),
            u: p_mis,
            vars: vec!["Va".into(), "Pg".into()],
        },
    )?;

    // branch flow limits in both directions
    let il: Vec<usize> = (0..case.branches.len())
        .filter(|&l| case.branches[l].is_rated())
        .collect();
    let b_f_il = select_rows(&b_f, &il);
    let rate = |l: usize| case.branches[l].rate_a / base_mva;
    om.add_constraint(
        "Pf",
        Constraint::Linear {
            a: b_f_il.clone(),
            l: vec![f64::NEG_INFINITY; il.len()],
            u: il.iter().map(|&l| rate(l) - p_finj[l]).collect(),
            vars: vec!["Va".into()],
        },
    )?;
    om.add_constraint(
        "Pt",
        Constraint::Linear {
            a: &b_f_il * -1.0,
            l: vec![f64::NEG_INFINITY; il.len()],
            u: il.iter().map(|&l| rate(l) + p_finj[l]).collect(),
            vars: vec!["Va".into()],
        },
    )?;

    let (ang, iang) = ang_constraint(case, opt.ignore_ang_lim);
    om.add_constraint("ang", ang)?;
    if ny > 0 {
        om.add_constraint("ycon", pwl_constraint(case, &ipwl))?;
    }

    let (h, c, c0) = dc_cost(case, &om, &ipwl)?.to_quadratic();
    let (x0, xmin, xmax) = om.params_var();
    let (a, l, u) = om.linear_constraints()?;
    log::debug!(
        "DC OPF: {} variables, {} linear constraints",
        om.nx(),
        om.n_lin()
    );

    let s = qp(Some(&h), &c, Some(&a), &l, &u, &xmin, &xmax, Some(&x0), &opt.ipm, solver)?;
    let f = s.f + c0;

    let lam = &s.lambda;
    let va = om.values("Va", &s.x)?;
    let pg = om.values("Pg", &s.x)?;
    let pg_range = om.var("Pg")?.range();

    let p_f: Vec<f64> = &b_f * va;
    for (l, br) in case.branches.iter_mut().enumerate() {
        br.p_from = (p_f[l] + p_finj[l]) * base_mva;
        br.p_to = -br.p_from;
        br.q_from = 0.0;
        br.q_to = 0.0;
    }
    let (mu_sf, mu_st) = (om.rows("Pf", &lam.mu_u), om.rows("Pt", &lam.mu_u));
    for (k, &l) in il.iter().enumerate() {
        case.branches[l].mu_s_from = mu_sf[k] / base_mva;
        case.branches[l].mu_s_to = mu_st[k] / base_mva;
    }
    set_ang_mu(case, &iang, om.rows("ang", &lam.mu_l), om.rows("ang", &lam.mu_u));

    let (mis_l, mis_u) = (om.rows("Pmis", &lam.mu_l), om.rows("Pmis", &lam.mu_u));
    for (i, bus) in case.buses.iter_mut().enumerate() {
        bus.v_magnitude = 1.0;
        bus.v_angle = va[i].to_degrees();
        bus.p_lambda = (mis_u[i] - mis_l[i]) / base_mva;
        bus.q_lambda = 0.0;
    }
    for (k, g) in case.generators.iter_mut().enumerate() {
        g.p = pg[k] * base_mva;
        g.q = 0.0;
        g.mu_pmin = lam.lower[pg_range.start + k] / base_mva;
        g.mu_pmax = lam.upper[pg_range.start + k] / base_mva;
    }

    Ok(OpfResult::new(s, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{one_bus_two_gens, three_bus};
    use spsolve::rlu::RLU;

    #[test]
    fn quadratic_coefficients() -> Result<()> {
        assert_eq!(quadratic_coeffs(&[10.0, 0.0], 0)?, [0.0, 10.0, 0.0]);
        assert_eq!(quadratic_coeffs(&[0.0, 0.0, 0.01, 10.0, 5.0], 0)?, [0.01, 10.0, 5.0]);
        assert_eq!(quadratic_coeffs(&[], 0)?, [0.0; 3]);
        assert_eq!(
            quadratic_coeffs(&[1.0, 0.0, 0.0, 0.0], 3),
            Err(CaseError::PolynomialDegree { gen: 3, degree: 3 })
        );
        Ok(())
    }

    #[test]
    fn generalized_cost() -> Result<()> {
        let case = three_bus();
        let mut om = OpfModel::new();
        om.add_var("Va", vec![0.0; 3], vec![0.0; 3], vec![0.0; 3])?;
        om.add_var("Pg", vec![0.0; 2], vec![0.0; 2], vec![3.0; 2])?;

        let (h, c, c0) = dc_cost(&case, &om, &[])?.to_quadratic();
        assert_eq!((h.rows(), h.cols()), (5, 5));
        // 0.01 $/MW^2h at 100 MVA base
        assert!((h.get(3, 3) - 200.0).abs() < 1e-9);
        assert!((h.get(4, 4) - 400.0).abs() < 1e-9);
        assert_eq!(c, vec![0.0, 0.0, 0.0, 1000.0, 1200.0]);
        assert_eq!(c0, 0.0);
        Ok(())
    }

    #[test]
    fn three_bus_economic_dispatch() -> Result<()> {
        let mut case = three_bus();
        let r = dcopf(&mut case, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);
        // equal marginal cost of 14 $/MWh
        assert!((case.generators[0].p - 200.0).abs() < 1e-4);
        assert!((case.generators[1].p - 50.0).abs() < 1e-4);
        for bus in &case.buses {
            assert!((bus.p_lambda - 14.0).abs() < 1e-4);
        }
        assert!((r.f - 3050.0).abs() < 1e-3);

        let injected: f64 = case.branches[0].p_from + case.branches[1].p_from;
        assert!((injected - 200.0).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn pwl_epigraph() -> Result<()> {
        let mut case = three_bus();
        for g in case.generators.iter_mut() {
            g.poly_to_pwl(5);
        }
        let r = dcopf(&mut case, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);
        assert!((r.f - 3062.5).abs() < 1e-3);
        // cost variables follow the generator costs
        let y = &r.x[r.x.len() - 2..];
        for (k, g) in case.generators.iter().enumerate() {
            assert!((y[k] - g.total_cost(g.p)).abs() < 1e-2);
        }
        Ok(())
    }

    #[test]
    fn shunt_conductance_is_load() -> Result<()> {
        let mut case = one_bus_two_gens();
        case.buses[0].g_shunt = 10.0;
        let r = dcopf(&mut case, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);

        let total: f64 = case.generators.iter().map(|g| g.p).sum();
        assert!((total - 90.0).abs() < 1e-4);
        assert!((case.generators[1].p - 30.0).abs() < 1e-4);
        assert!((case.buses[0].p_lambda - 20.0).abs() < 1e-4);
        assert!((r.f - 1200.0).abs() < 1e-3);
        Ok(())
    }
}
