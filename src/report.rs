//! System summary of a solved case.
use crate::case::Case;
use num_complex::Complex64;
use std::fmt;

/// Totals and extremes over a case, in MW, MVAr, p.u. and $/MWh.
#[derive(Debug, Clone, Default)]
pub struct CaseReport {
    pub n_bus: usize,
    pub n_bus_online: usize,
    pub n_gen: usize,
    pub n_gen_online: usize,
    pub n_branch: usize,
    pub n_branch_online: usize,

    /// Total active and reactive capacity of online generators.
    pub capacity: Complex64,
    /// Total output of online generators, excluding dispatchable loads.
    pub generation: Complex64,
    /// Fixed bus demand.
    pub load: Complex64,
    /// Demand served by dispatchable loads.
    pub dispatchable_load: Complex64,
    pub losses: Complex64,

    /// `(value, bus index)`
    pub min_vm: (f64, usize),
    pub max_vm: (f64, usize),
    pub min_lambda: (f64, usize),
    pub max_lambda: (f64, usize),
}

impl CaseReport {
    pub fn new(case: &Case) -> Self {
        let mut r = Self {
            n_bus: case.buses.len(),
            n_bus_online: case.connected_buses().len(),
            n_gen: case.generators.len(),
            n_gen_online: case.online_generators().len(),
            n_branch: case.branches.len(),
            n_branch_online: case.online_branches().len(),
            ..Default::default()
        };

        for g in case.generators.iter().filter(|g| g.is_on()) {
            if g.is_load() {
                r.dispatchable_load -= Complex64::new(g.p, g.q);
            } else {
                r.capacity += Complex64::new(g.p_max, g.q_max);
                r.generation += Complex64::new(g.p, g.q);
            }
        }
        for br in case.branches.iter().filter(|br| br.is_on()) {
            r.losses += Complex64::new(br.p_losses(), br.q_losses());
        }

        let connected = case.connected_buses();
        for &i in &connected {
            let bus = &case.buses[i];
            r.load += Complex64::new(bus.p_demand, bus.q_demand);
        }

        let extreme = |f: &dyn Fn(usize) -> f64, max: bool| -> (f64, usize) {
            connected
                .iter()
                .map(|&i| (f(i), i))
                .reduce(|a, b| if (max && b.0 > a.0) || (!max && b.0 < a.0) { b } else { a })
                .unwrap_or_default()
        };
        let vm = |i: usize| case.buses[i].v_magnitude;
        let lambda = |i: usize| case.buses[i].p_lambda;
        r.min_vm = extreme(&vm, false);
        r.max_vm = extreme(&vm, true);
        r.min_lambda = extreme(&lambda, false);
        r.max_lambda = extreme(&lambda, true);

        r
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "System Summary")?;
        writeln!(f, "{:-<64}", "")?;
        writeln!(
            f,
            "{:<20}{:>8} ({} online)",
            "Buses", self.n_bus, self.n_bus_online
        )?;
        writeln!(
            f,
            "{:<20}{:>8} ({} online)",
            "Generators", self.n_gen, self.n_gen_online
        )?;
        writeln!(
            f,
            "{:<20}{:>8} ({} online)",
            "Branches", self.n_branch, self.n_branch_online
        )?;
        writeln!(f)?;

        write_pq(f, "Total capacity", self.capacity)?;
        write_pq(f, "Generation", self.generation)?;
        write_pq(f, "Load", self.load)?;
        if self.dispatchable_load != Complex64::default() {
            write_pq(f, "Dispatchable load", self.dispatchable_load)?;
        }
        write_pq(f, "Losses", self.losses)?;
        writeln!(f)?;

        writeln!(f, "{:<20}{:>12}{:>12}", "", "Minimum", "Maximum")?;
        writeln!(
            f,
            "{:<20}{:>6.3} p.u. @{:<3}{:>6.3} p.u. @{}",
            "Voltage magnitude", self.min_vm.0, self.min_vm.1, self.max_vm.0, self.max_vm.1
        )?;
        write!(
            f,
            "{:<20}{:>6.2} $/MWh @{:<3}{:>6.2} $/MWh @{}",
            "Lambda P", self.min_lambda.0, self.min_lambda.1, self.max_lambda.0, self.max_lambda.1
        )
    }
}

fn write_pq(f: &mut fmt::Formatter<'_>, name: &str, s: Complex64) -> fmt::Result {
    writeln!(f, "{:<20}{:>12.1} MW {:>12.1} MVAr", name, s.re, s.im)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{congested_two_bus, four_bus, one_bus_two_gens};
    use crate::opf::{solve, Solver};
    use crate::opt::OpfOpt;
    use anyhow::Result;
    use spsolve::rlu::RLU;

    #[test]
    fn counts() {
        let mut case = four_bus();
        case.branches[0].online = false;
        case.generators[1].online = false;

        let r = CaseReport::new(&case);
        assert_eq!(r.n_bus, 4);
        assert_eq!(r.n_bus_online, 4);
        assert_eq!(r.n_branch, case.branches.len());
        assert_eq!(r.n_branch_online, case.branches.len() - 1);
        assert_eq!(r.n_gen_online, case.generators.len() - 1);
    }

    #[test]
    fn dispatch_summary() -> Result<()> {
        let mut case = one_bus_two_gens();
        solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default())?;

        let r = CaseReport::new(&case);
        assert!((r.generation.re - 80.0).abs() < 1e-3);
        assert!((r.load.re - 80.0).abs() < 1e-9);
        assert!(r.losses.re.abs() < 1e-9);
        assert!((r.max_lambda.0 - 20.0).abs() < 1e-3);

        let text = r.to_string();
        assert!(text.contains("Generation"));
        assert!(text.contains("Lambda P"));
        Ok(())
    }

    #[test]
    fn price_extremes() -> Result<()> {
        let mut case = congested_two_bus();
        solve(&mut case, Solver::Dc, &OpfOpt::default(), &RLU::default())?;

        let r = CaseReport::new(&case);
        assert_eq!(r.min_lambda.1, 0);
        assert_eq!(r.max_lambda.1, 1);
        assert!((r.min_lambda.0 - 10.0).abs() < 1e-3);
        assert!((r.max_lambda.0 - 20.0).abs() < 1e-3);
        Ok(())
    }
}
