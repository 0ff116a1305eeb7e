use crate::case::Case;
use crate::d2::{d2_aibr_d_v2, d2_asbr_d_v2, d2_sbus_d_v2};
use crate::dsbr::{abs2, d_abr_d_v, d_ibr_d_v, d_sbr_d_v, BranchDerivatives};
use crate::gen::CostModel;
use crate::ipm::{interior_point, nlp, Hessian, NonlinearConstraint, ObjectiveFunction};
use crate::opf::{ang_constraint, pwl_constraint, pwl_gens, set_ang_mu, y0, OpfResult};
use crate::opf_model::{Constraint, NonlinearKind, OpfModel};
use crate::opt::{FlowLim, IpmOpt, OpfOpt};
use crate::sbus::d_sbus_d_v;
use crate::sparse::{push_block, select_rows};
use crate::ybus::{make_ybus, YbusOpt};

use anyhow::Result;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use sparsetools::csr::{CCSR, CSR};
use spsolve::Solver;
use std::ops::Range;

/// Objective, constraint and Hessian callbacks of the AC optimal power
/// flow, with variables ordered `[Va; Vm; Pg; Qg; y]`.
struct AcOpf<'a> {
    case: &'a Case,
    y_bus: CSR<usize, Complex64>,
    /// Branch admittances of the rated branches only.
    y_f: CSR<usize, Complex64>,
    y_t: CSR<usize, Complex64>,
    f: Vec<usize>,
    t: Vec<usize>,
    /// Squared flow limits (p.u.).
    flow_max: Vec<f64>,
    flow_lim: FlowLim,
    va: Range<usize>,
    vm: Range<usize>,
    pg: Range<usize>,
    qg: Range<usize>,
    y: Range<usize>,
    nx: usize,
}

impl<'a> AcOpf<'a> {
    fn voltage(&self, x: &[f64]) -> Vec<Complex64> {
        x[self.vm.clone()]
            .iter()
            .zip(&x[self.va.clone()])
            .map(|(&vm, &va)| Complex64::from_polar(vm, va))
            .collect()
    }

    fn branch_derivatives(&self, v: &[Complex64]) -> Result<BranchDerivatives> {
        match self.flow_lim {
            FlowLim::I => d_ibr_d_v(&self.y_f, &self.y_t, v),
            FlowLim::S | FlowLim::P => d_sbr_d_v(&self.y_f, &self.y_t, &self.f, &self.t, v),
        }
    }

    fn is_poly(&self, k: usize) -> bool {
        matches!(self.case.generators[k].cost, CostModel::Polynomial(_))
    }
}

impl<'a> ObjectiveFunction for AcOpf<'a> {
    fn f(&self, x: &[f64]) -> Result<(f64, Vec<f64>)> {
        let base_mva = self.case.base_mva;
        let mut f = 0.0;
        let mut df = vec![0.0; self.nx];

        for (k, g) in self.case.generators.iter().enumerate() {
            if self.is_poly(k) {
                let p = x[self.pg.start + k] * base_mva;
                f += g.total_cost(p);
                df[self.pg.start + k] = g.marginal_cost(p) * base_mva;
            }
        }
        for j in self.y.clone() {
            f += x[j];
            df[j] = 1.0;
        }
        Ok((f, df))
    }
}

impl<'a> NonlinearConstraint for AcOpf<'a> {
    fn gh(&self, x: &[f64]) -> Result<(Vec<f64>, Vec<f64>, CSR<usize, f64>, CSR<usize, f64>)> {
        let case = self.case;
        let base_mva = case.base_mva;
        let nb = case.buses.len();
        let v = self.voltage(x);

        // power balance: V .* conj(Ybus * V) - (Cg * Sg - Sd) = 0
        let i_bus: Vec<Complex64> = &self.y_bus * &v;
        let mut mis: Vec<Complex64> = (0..nb)
            .map(|i| {
                let bus = &case.buses[i];
                v[i] * i_bus[i].conj() + Complex64::new(bus.p_demand, bus.q_demand) / base_mva
            })
            .collect();
        for (k, g) in case.generators.iter().enumerate() {
            mis[g.bus] -= Complex64::new(x[self.pg.start + k], x[self.qg.start + k]);
        }
        let h: Vec<f64> = mis.iter().map(|s| s.re).chain(mis.iter().map(|s| s.im)).collect();

        let (ds_dva, ds_dvm) = d_sbus_d_v(&self.y_bus, &v)?;
        let mut dh: Coo<usize, f64> = Coo::with_size(2 * nb, self.nx);
        push_block(&mut dh, &ds_dva.real(), 0, self.va.start);
        push_block(&mut dh, &ds_dvm.real(), 0, self.vm.start);
        push_block(&mut dh, &ds_dva.imag(), nb, self.va.start);
        push_block(&mut dh, &ds_dvm.imag(), nb, self.vm.start);
        for (k, g) in case.generators.iter().enumerate() {
            dh.push(g.bus, self.pg.start + k, -1.0);
            dh.push(nb + g.bus, self.qg.start + k, -1.0);
        }

        // branch flow limits: |F|^2 - Fmax^2 <= 0 at both ends
        let nl2 = self.flow_max.len();
        let real_only = self.flow_lim == FlowLim::P;
        let d = self.branch_derivatives(&v)?;
        let g: Vec<f64> = abs2(&d.f, real_only)
            .into_iter()
            .chain(abs2(&d.t, real_only))
            .zip(self.flow_max.iter().chain(&self.flow_max))
            .map(|(a, max)| a - max)
            .collect();

        let (daf_dva, daf_dvm, dat_dva, dat_dvm) = d_abr_d_v(&d, real_only);
        let mut dg: Coo<usize, f64> = Coo::with_size(2 * nl2, self.nx);
        push_block(&mut dg, &daf_dva, 0, self.va.start);
        push_block(&mut dg, &daf_dvm, 0, self.vm.start);
        push_block(&mut dg, &dat_dva, nl2, self.va.start);
        push_block(&mut dg, &dat_dvm, nl2, self.vm.start);

        Ok((h, g, dh.to_csr(), dg.to_csr()))
    }
}

impl<'a> Hessian for AcOpf<'a> {
    fn hess(&self, x: &[f64], lam: &[f64], mu: &[f64], cost_mult: f64) -> Result<CSR<usize, f64>> {
        let base_mva = self.case.base_mva;
        let nb = self.case.buses.len();
        let nl2 = self.flow_max.len();
        let v = self.voltage(x);

        let mut lxx: Coo<usize, f64> = Coo::with_size(self.nx, self.nx);

        // objective
        for (k, g) in self.case.generators.iter().enumerate() {
            if self.is_poly(k) {
                let p = x[self.pg.start + k] * base_mva;
                let d2f = g.cost_curvature(p) * base_mva * base_mva * cost_mult;
                if d2f != 0.0 {
                    lxx.push(self.pg.start + k, self.pg.start + k, d2f);
                }
            }
        }

        // power balance
        let (a0, v0) = (self.va.start, self.vm.start);
        d2_sbus_d_v2(&self.y_bus, &v, &lam[..nb])?.re().push_into(&mut lxx, a0, v0);
        d2_sbus_d_v2(&self.y_bus, &v, &lam[nb..2 * nb])?.im().push_into(&mut lxx, a0, v0);

        // branch flow limits
        if nl2 > 0 {
            let (mu_f, mu_t) = (&mu[..nl2], &mu[nl2..2 * nl2]);
            let d = self.branch_derivatives(&v)?;
            let (hf, ht) = match self.flow_lim {
                FlowLim::I => (
                    d2_aibr_d_v2(&d.df_dva, &d.df_dvm, &d.f, &self.y_f, &v, mu_f)?,
                    d2_aibr_d_v2(&d.dt_dva, &d.dt_dvm, &d.t, &self.y_t, &v, mu_t)?,
                ),
                FlowLim::S | FlowLim::P => {
                    let real_only = self.flow_lim == FlowLim::P;
                    (
                        d2_asbr_d_v2(&d.df_dva, &d.df_dvm, &d.f, &self.y_f, &self.f, &v, mu_f, real_only)?,
                        d2_asbr_d_v2(&d.dt_dva, &d.dt_dvm, &d.t, &self.y_t, &self.t, &v, mu_t, real_only)?,
                    )
                }
            };
            hf.push_into(&mut lxx, a0, v0);
            ht.push_into(&mut lxx, a0, v0);
        }

        Ok(lxx.to_csr())
    }
}

/// Solves an AC optimal power flow on a case in internal ordering and
/// writes the results onto it.
pub(crate) fn acopf(case: &mut Case, opt: &OpfOpt, solver: &dyn Solver<usize, f64>) -> Result<OpfResult> {
    let base_mva = case.base_mva;
    let nb = case.buses.len();
    let ref_bus = case.single_ref()?;
    let va_ref = case.buses[ref_bus].v_angle_guess.to_radians();

    let (y_bus, y_f_all, y_t_all) = make_ybus(case, &YbusOpt::default());
    let il: Vec<usize> = (0..case.branches.len())
        .filter(|&l| case.branches[l].is_rated())
        .collect();
    let nl2 = il.len();
    let ipwl = pwl_gens(case);
    let ny = ipwl.len();

    let mut om = OpfModel::new();

    let mut va_min = vec![f64::NEG_INFINITY; nb];
    let mut va_max = vec![f64::INFINITY; nb];
    va_min[ref_bus] = va_ref;
    va_max[ref_bus] = va_ref;
    om.add_var("Va", vec![va_ref; nb], va_min, va_max)?;

    let mut vm0: Vec<f64> = case.buses.iter().map(|b| b.v_magnitude_guess).collect();
    for g in &case.generators {
        vm0[g.bus] = g.v_magnitude;
    }
    om.add_var(
        "Vm",
        vm0,
        case.buses.iter().map(|b| b.v_min).collect(),
        case.buses.iter().map(|b| b.v_max).collect(),
    )?;

    let per_unit = |v: f64| v / base_mva;
    let pmin: Vec<f64> = case.generators.iter().map(|g| per_unit(g.p_min)).collect();
    let pmax: Vec<f64> = case.generators.iter().map(|g| per_unit(g.p_max)).collect();
    om.add_var("Pg", interior_point(&pmin, &pmax), pmin, pmax)?;
    let qmin: Vec<f64> = case.generators.iter().map(|g| per_unit(g.q_min)).collect();
    let qmax: Vec<f64> = case.generators.iter().map(|g| per_unit(g.q_max)).collect();
    om.add_var("Qg", interior_point(&qmin, &qmax), qmin, qmax)?;

    if ny > 0 {
        om.add_var(
            "y",
            vec![y0(case, &ipwl); ny],
            vec![f64::NEG_INFINITY; ny],
            vec![f64::INFINITY; ny],
        )?;
    }

    let equality = |n| Constraint::Nonlinear {
        n,
        kind: NonlinearKind::Equality,
    };
    let inequality = |n| Constraint::Nonlinear {
        n,
        kind: NonlinearKind::Inequality,
    };
    om.add_constraint("Pmis", equality(nb))?;
    om.add_constraint("Qmis", equality(nb))?;
    om.add_constraint("Sf", inequality(nl2))?;
    om.add_constraint("St", inequality(nl2))?;

    let (ang, iang) = ang_constraint(case, opt.ignore_ang_lim);
    om.add_constraint("ang", ang)?;
    if ny > 0 {
        om.add_constraint("ycon", pwl_constraint(case, &ipwl))?;
    }
    log::debug!(
        "AC OPF: {} variables, {} equality, {} inequality and {} linear constraints",
        om.nx(),
        om.n_eq(),
        om.n_ineq(),
        om.n_lin()
    );

    let range = |name: &str| -> Result<Range<usize>> {
        if om.has_var(name) {
            Ok(om.var(name)?.range())
        } else {
            Ok(0..0)
        }
    };
    let network: &Case = case;
    let callbacks = AcOpf {
        case: network,
        y_bus,
        y_f: select_rows(&y_f_all, &il),
        y_t: select_rows(&y_t_all, &il),
        f: il.iter().map(|&l| network.branches[l].from_bus).collect(),
        t: il.iter().map(|&l| network.branches[l].to_bus).collect(),
        flow_max: il
            .iter()
            .map(|&l| per_unit(network.branches[l].rate_a).powi(2))
            .collect(),
        flow_lim: opt.flow_lim,
        va: range("Va")?,
        vm: range("Vm")?,
        pg: range("Pg")?,
        qg: range("Qg")?,
        y: range("y")?,
        nx: om.nx(),
    };

    let (x0, xmin, xmax) = om.params_var();
    let (a, l, u) = om.linear_constraints()?;
    let ipm_opt = IpmOpt {
        cost_mult: opt.ac_cost_mult,
        ..opt.ipm.clone()
    };
    let s = nlp(
        &callbacks,
        &x0,
        Some(&a),
        &l,
        &u,
        &xmin,
        &xmax,
        Some(&callbacks),
        &callbacks,
        &ipm_opt,
        solver,
    )?;
    let (vm_range, pg_range, qg_range) = (callbacks.vm.clone(), callbacks.pg.clone(), callbacks.qg.clone());
    let v = callbacks.voltage(&s.x);
    drop(callbacks);

    let lam = &s.lambda;

    // branch flows
    let i_f: Vec<Complex64> = &y_f_all * &v;
    let i_t: Vec<Complex64> = &y_t_all * &v;
    for (l, br) in case.branches.iter_mut().enumerate() {
        let sf = v[br.from_bus] * i_f[l].conj() * base_mva;
        let st = v[br.to_bus] * i_t[l].conj() * base_mva;
        br.p_from = sf.re;
        br.q_from = sf.im;
        br.p_to = st.re;
        br.q_to = st.im;
    }
    let (mu_sf, mu_st) = (om.rows("Sf", &lam.ineq_nonlin), om.rows("St", &lam.ineq_nonlin));
    for (k, &l) in il.iter().enumerate() {
        // convert from squared flow limit multipliers to $/MVA
        let rate = case.branches[l].rate_a;
        case.branches[l].mu_s_from = 2.0 * mu_sf[k] * rate / base_mva / base_mva;
        case.branches[l].mu_s_to = 2.0 * mu_st[k] * rate / base_mva / base_mva;
    }
    set_ang_mu(case, &iang, om.rows("ang", &lam.mu_l), om.rows("ang", &lam.mu_u));

    let (lam_p, lam_q) = (om.rows("Pmis", &lam.eq_nonlin), om.rows("Qmis", &lam.eq_nonlin));
    for (i, bus) in case.buses.iter_mut().enumerate() {
        bus.v_magnitude = v[i].norm();
        bus.v_angle = v[i].arg().to_degrees();
        bus.p_lambda = lam_p[i] / base_mva;
        bus.q_lambda = lam_q[i] / base_mva;
        bus.mu_vmin = lam.lower[vm_range.start + i];
        bus.mu_vmax = lam.upper[vm_range.start + i];
    }
    for (k, g) in case.generators.iter_mut().enumerate() {
        g.p = s.x[pg_range.start + k] * base_mva;
        g.q = s.x[qg_range.start + k] * base_mva;
        g.mu_pmin = lam.lower[pg_range.start + k] / base_mva;
        g.mu_pmax = lam.upper[pg_range.start + k] / base_mva;
        g.mu_qmin = lam.lower[qg_range.start + k] / base_mva;
        g.mu_qmax = lam.upper[qg_range.start + k] / base_mva;
    }
    let f = s.f;
    Ok(OpfResult::new(s, f))
}
