use crate::acopf::acopf;
use crate::case::Case;
use crate::dcopf::{check_costs, dcopf};
use crate::ext_to_int::ext_to_int;
use crate::gen::{slopes, CostModel};
use crate::int_to_ext::int_to_ext;
use crate::ipm::{IpmStatus, Lambda, Solution};
use crate::opf_model::{from_triplets, Constraint};
use crate::opt::OpfOpt;

use anyhow::Result;
use spsolve::Solver as LinearSolver;
use std::f64::consts::PI;

/// Formulation used to solve the optimal power flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Solver {
    /// Linearized network with fixed voltage magnitudes, solved as a QP.
    Dc,
    /// Full nonlinear network model.
    Ac,
}

/// Outcome of an optimal power flow.
///
/// `x` and `lambda` refer to the internal ordering of the case, which
/// excludes isolated buses and out-of-service branches and generators.
#[derive(Debug, Clone)]
pub struct OpfResult {
    pub converged: bool,
    pub status: IpmStatus,
    /// Total generation cost ($/h).
    pub f: f64,
    pub iterations: usize,
    pub feascond: f64,
    pub gradcond: f64,
    pub compcond: f64,
    pub costcond: f64,
    pub x: Vec<f64>,
    pub lambda: Lambda,
}

impl OpfResult {
    pub(crate) fn new(s: Solution, f: f64) -> Self {
        Self {
            converged: s.converged(),
            status: s.status,
            f,
            iterations: s.iterations,
            feascond: s.feascond,
            gradcond: s.gradcond,
            compcond: s.compcond,
            costcond: s.costcond,
            x: s.x,
            lambda: s.lambda,
        }
    }
}

/// Solves an optimal power flow, writing the dispatch, voltages, flows
/// and Lagrange multipliers back onto the case.
///
/// Invalid case data is reported as an error before the case is touched.
/// Failure to converge is not an error: check `OpfResult::converged`.
pub fn solve(
    case: &mut Case,
    solver: Solver,
    opt: &OpfOpt,
    lin_solver: &dyn LinearSolver<usize, f64>,
) -> Result<OpfResult> {
    if let Err(err) = case.validate().and_then(|_| case.single_ref().map(|_| ())) {
        log::error!("{}", err);
        return Err(err.into());
    }

    let (mut internal, order) = ext_to_int(case);
    for (g, &e) in internal.generators.iter_mut().zip(&order.gen.i2e) {
        g.pwl1_to_poly();
        if let Some(n_points) = opt.use_pwl {
            g.poly_to_pwl(n_points);
        }
        if let Err(err) = g.validate_cost(e) {
            log::error!("{}", err);
            return Err(err.into());
        }
    }
    if solver == Solver::Dc {
        if let Err(err) = check_costs(&internal) {
            log::error!("{}", err);
            return Err(err.into());
        }
    }

    case.reset();
    case.deactivate_isolated();

    let result = match solver {
        Solver::Dc => dcopf(&mut internal, opt, lin_solver)?,
        Solver::Ac => acopf(&mut internal, opt, lin_solver)?,
    };

    int_to_ext(&internal, &order, case);

    if result.converged {
        log::info!(
            "{:?} OPF converged in {} iterations, objective {:.4} $/h",
            solver,
            result.iterations,
            result.f
        );
    } else {
        log::info!("{:?} OPF did not converge ({:?})", solver, result.status);
    }
    Ok(result)
}

/// Indexes of generators with piecewise linear costs.
pub(crate) fn pwl_gens(case: &Case) -> Vec<usize> {
    (0..case.generators.len())
        .filter(|&i| case.generators[i].is_pwl())
        .collect()
}

/// Epigraph rows for piecewise linear costs on `[Pg; y]`.
///
/// For each segment `j` of the cost of generator `i`, with slope `m_j`
/// through `(p_j, c_j)`, the cost variable must satisfy
/// `y >= m_j * (Pg*base - p_j) + c_j`.
pub(crate) fn pwl_constraint(case: &Case, ipwl: &[usize]) -> Constraint {
    let ng = case.generators.len();
    let base_mva = case.base_mva;

    let mut triplets = Vec::new();
    let mut u = Vec::new();
    for (k, &i) in ipwl.iter().enumerate() {
        if let CostModel::PiecewiseLinear(points) = &case.generators[i].cost {
            for (m, &(p, c)) in slopes(points).into_iter().zip(points.iter()) {
                let r = u.len();
                triplets.push((r, i, m * base_mva));
                triplets.push((r, ng + k, -1.0));
                u.push(m * p - c);
            }
        }
    }
    let n = u.len();
    Constraint::Linear {
        a: from_triplets(n, ng + ipwl.len(), triplets),
        l: vec![f64::NEG_INFINITY; n],
        u,
        vars: vec!["Pg".to_string(), "y".to_string()],
    }
}

/// Branch voltage angle difference limits on `Va`. Returns the
/// constraint and the indexes of the limited branches.
pub(crate) fn ang_constraint(case: &Case, ignore_ang_lim: bool) -> (Constraint, Vec<usize>) {
    let nb = case.buses.len();
    let iang: Vec<usize> = if ignore_ang_lim {
        Vec::new()
    } else {
        (0..case.branches.len())
            .filter(|&l| {
                let br = &case.branches[l];
                (br.ang_min != 0.0 && br.ang_min > -360.0) || (br.ang_max != 0.0 && br.ang_max < 360.0)
            })
            .collect()
    };

    let mut triplets = Vec::with_capacity(2 * iang.len());
    let mut l = Vec::with_capacity(iang.len());
    let mut u = Vec::with_capacity(iang.len());
    for (r, &k) in iang.iter().enumerate() {
        let br = &case.branches[k];
        triplets.push((r, br.from_bus, 1.0));
        triplets.push((r, br.to_bus, -1.0));
        l.push(if br.ang_min != 0.0 {
            br.ang_min.to_radians()
        } else {
            f64::NEG_INFINITY
        });
        u.push(if br.ang_max != 0.0 {
            br.ang_max.to_radians()
        } else {
            f64::INFINITY
        });
    }

    let a = from_triplets(iang.len(), nb, triplets);
    let constraint = Constraint::Linear {
        a,
        l,
        u,
        vars: vec!["Va".to_string()],
    };
    (constraint, iang)
}

/// Starting value for the piecewise linear cost variables: just above
/// the largest cost at the current dispatch.
pub(crate) fn y0(case: &Case, ipwl: &[usize]) -> f64 {
    let c = ipwl
        .iter()
        .map(|&i| {
            let g = &case.generators[i];
            g.total_cost(g.p)
        })
        .fold(f64::NEG_INFINITY, f64::max);
    c + 0.1 * c.abs()
}

/// Writes angle difference multipliers ($/MWh per degree).
pub(crate) fn set_ang_mu(case: &mut Case, iang: &[usize], mu_l: &[f64], mu_u: &[f64]) {
    for (k, &l) in iang.iter().enumerate() {
        case.branches[l].mu_angmin = mu_l[k] * PI / 180.0;
        case.branches[l].mu_angmax = mu_u[k] * PI / 180.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusType;
    use crate::cases::{congested_two_bus, four_bus, one_bus_two_gens, three_bus};
    use crate::error::CaseError;
    use crate::opt::{FlowLim, OpfOptBuilder};
    use spsolve::rlu::RLU;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn one_bus_merit_order() -> Result<()> {
        let mut case = one_bus_two_gens();
        let r = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);
        assert!(close(case.generators[0].p, 60.0, 1e-4));
        assert!(close(case.generators[1].p, 20.0, 1e-4));
        assert!(close(case.buses[0].p_lambda, 20.0, 1e-4));
        assert!(close(r.f, 1000.0, 1e-3));
        assert!(case.generators[0].mu_pmax > 9.99);
        Ok(())
    }

    #[test]
    fn congested_branch() -> Result<()> {
        let mut case = congested_two_bus();
        let r = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);
        assert!(close(case.generators[0].p, 50.0, 1e-4));
        assert!(close(case.generators[1].p, 50.0, 1e-4));
        assert!(close(case.branches[0].p_from, 50.0, 1e-4));
        assert!(case.branches[0].mu_s_from > 0.0);
        assert!(close(case.branches[0].mu_s_from, 10.0, 1e-4));
        assert!(close(case.buses[0].p_lambda, 10.0, 1e-4));
        assert!(close(case.buses[1].p_lambda, 20.0, 1e-4));
        Ok(())
    }

    #[test]
    fn dispatch_within_limits() -> Result<()> {
        for solver in [Solver::Dc, Solver::Ac] {
            let mut case = four_bus();
            let opt = OpfOpt::default();
            let r = solve(&mut case, solver, &opt, &RLU::default())?;
            assert!(r.converged);
            assert!(r.compcond < opt.ipm.comptol);
            for g in &case.generators {
                assert!(g.p >= g.p_min - 1e-4 && g.p <= g.p_max + 1e-4);
                assert!(g.mu_pmin >= 0.0 && g.mu_pmax >= 0.0);
                // complementarity
                assert!(g.mu_pmax * (g.p_max - g.p) < 1e-2);
                assert!(g.mu_pmin * (g.p - g.p_min) < 1e-2);
            }
        }
        Ok(())
    }

    #[test]
    fn dc_objective_invariant_under_permutation() -> Result<()> {
        let mut case = three_bus();
        let r = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default())?;
        assert!(close(r.f, 3050.0, 1e-3));

        // reverse the bus order
        let mut permuted = three_bus();
        let nb = permuted.buses.len();
        permuted.buses.reverse();
        for br in permuted.branches.iter_mut() {
            br.from_bus = nb - 1 - br.from_bus;
            br.to_bus = nb - 1 - br.to_bus;
        }
        for g in permuted.generators.iter_mut() {
            g.bus = nb - 1 - g.bus;
        }
        permuted.generators.reverse();
        let rp = solve(&mut permuted, Solver::Dc, &OpfOpt::default(), &RLU::default())?;
        assert!(close(r.f, rp.f, 1e-4));
        assert!(close(case.generators[0].p, permuted.generators[1].p, 1e-4));
        Ok(())
    }

    #[test]
    fn pwl_approximation_improves() -> Result<()> {
        let mut case = three_bus();
        let exact = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default())?.f;

        let mut errors = Vec::new();
        for n in [5, 20] {
            let mut case = three_bus();
            let opt = OpfOptBuilder::default().use_pwl(Some(n)).build()?;
            let r = solve(&mut case, Solver::Dc, &opt, &RLU::default())?;
            assert!(r.converged);
            // chords lie above a convex curve
            assert!(r.f > exact - 1e-4);
            errors.push(r.f - exact);
        }
        assert!(errors[1] < errors[0]);
        assert!(errors[1] < 1.0);
        Ok(())
    }

    #[test]
    fn concave_cost_as_pwl() -> Result<()> {
        let mut case = three_bus();
        case.generators[1].cost = CostModel::Polynomial(vec![-0.02, 20.0, 0.0]);
        case.buses[2].p_lambda = 7.0;

        let opt = OpfOptBuilder::default().use_pwl(Some(5)).build()?;
        let err = solve(&mut case, Solver::Dc, &opt, &RLU::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaseError>(),
            Some(CaseError::NonConvexCost { gen: 1, .. })
        ));
        assert_eq!(case.buses[2].p_lambda, 7.0);
        Ok(())
    }

    #[test]
    fn fixed_unit_as_pwl() -> Result<()> {
        let mut case = three_bus();
        case.generators[1].p_min = 80.0;
        case.generators[1].p_max = 80.0;

        let opt = OpfOptBuilder::default().use_pwl(Some(10)).build()?;
        let r = solve(&mut case, Solver::Dc, &opt, &RLU::default())?;
        assert!(r.converged);
        assert!(r.f.is_finite());
        assert!(close(case.generators[1].p, 80.0, 1e-4));
        assert!(close(case.generators[0].p, 170.0, 1e-3));
        // 1990 on the chord through 166.7 and 200 MW, plus 1088 for the fixed unit
        assert!(close(r.f, 3078.0, 1e-2), "{}", r.f);
        Ok(())
    }

    #[test]
    fn angle_limits() -> Result<()> {
        let mut case = congested_two_bus();
        case.branches[0].rate_a = 0.0;
        case.branches[0].ang_min = -360.0;
        case.branches[0].ang_max = 2.0;
        // 2 degrees across x = 0.1 limits the transfer to ~34.9 MW
        let limit = 100.0 * 2f64.to_radians() / 0.1;

        let opt = OpfOptBuilder::default().ignore_ang_lim(false).build()?;
        let r = solve(&mut case, Solver::Dc, &opt, &RLU::default())?;
        assert!(r.converged);
        assert!(close(case.generators[0].p, limit, 1e-3));
        assert!(case.branches[0].mu_angmax > 0.0);
        Ok(())
    }

    #[test]
    fn configuration_errors() {
        let mut case = three_bus();
        case.buses[2].bus_type = BusType::Ref;
        let err = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CaseError>(),
            Some(&CaseError::MultipleReferenceBuses(2))
        );

        let mut case = three_bus();
        case.generators[0].cost = CostModel::PiecewiseLinear(vec![(0.0, 0.0), (100.0, 2000.0), (200.0, 3000.0)]);
        case.buses[0].v_magnitude = 0.5;
        let err = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CaseError>(),
            Some(CaseError::NonConvexCost { gen: 0, .. })
        ));
        // untouched
        assert_eq!(case.buses[0].v_magnitude, 0.5);

        let mut case = three_bus();
        case.generators[1].cost = CostModel::Polynomial(vec![0.001, 0.01, 10.0, 0.0]);
        let err = solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<CaseError>(),
            Some(&CaseError::PolynomialDegree { gen: 1, degree: 3 })
        );
    }

    #[test]
    fn ac_three_bus() -> Result<()> {
        for flow_lim in [FlowLim::S, FlowLim::P, FlowLim::I] {
            let mut case = three_bus();
            let opt = OpfOptBuilder::default().flow_lim(flow_lim).build()?;
            let r = solve(&mut case, Solver::Ac, &opt, &RLU::default())?;
            assert!(r.converged, "{:?}", flow_lim);
            assert!(close(r.f, 3077.347, 0.05), "{}", r.f);
            assert!(close(case.generators[0].p, 198.044, 0.01));
            assert!(close(case.generators[1].p, 53.885, 0.01));
            assert!(close(case.buses[0].v_magnitude, 1.1, 1e-4));
            assert!(case.buses[0].mu_vmax > 0.0);
            assert!(close(case.buses[2].p_lambda, 14.246, 0.01));
        }
        Ok(())
    }

    #[test]
    fn ac_four_bus() -> Result<()> {
        let mut case = four_bus();
        let r = solve(&mut case, Solver::Ac, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);
        assert!(close(r.f, 12717.763, 0.05), "{}", r.f);
        assert!(close(case.generators[0].p, 318.0, 1e-3));
        assert!(close(case.generators[1].p, 186.142, 0.01));

        // power balance, losses included
        let gen: f64 = case.generators.iter().map(|g| g.p).sum();
        let load: f64 = case.buses.iter().map(|b| b.p_demand).sum();
        let losses: f64 = case.branches.iter().map(|br| br.p_losses()).sum();
        assert!(close(gen, load + losses, 1e-3));
        Ok(())
    }

    #[test]
    fn ac_congested() -> Result<()> {
        let mut case = congested_two_bus();
        let r = solve(&mut case, Solver::Ac, &OpfOpt::default(), &RLU::default())?;
        assert!(r.converged);
        assert!(case.generators[0].p < 50.0 + 1e-3);
        assert!(case.branches[0].mu_s_from > 0.0);
        assert!(close(case.buses[1].p_lambda, 20.0, 0.01));
        Ok(())
    }
}
