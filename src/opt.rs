use clap::ValueEnum;
use derive_builder::Builder;

/// Newton power flow options.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct PfOpt {
    /// Termination tolerance on per unit P & Q mismatch.
    pub tolerance: f64,
    /// Maximum number of Newton iterations.
    pub max_it: usize,
}

impl Default for PfOpt {
    fn default() -> Self {
        Self {
            tolerance: 1e-8,
            max_it: 10,
        }
    }
}

/// Primal-dual interior point solver options.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct IpmOpt {
    /// Termination tolerance for feasibility condition.
    pub feastol: f64,
    /// Termination tolerance for gradient condition.
    pub gradtol: f64,
    /// Termination tolerance for complementarity condition.
    pub comptol: f64,
    /// Termination tolerance for cost condition.
    pub costtol: f64,
    pub max_it: usize,
    /// Maximum number of step-size reductions if step control is on.
    pub max_red: usize,
    /// Use step-size control (merit function backtracking).
    pub step_control: bool,
    /// Objective scale factor.
    pub cost_mult: f64,
}

impl Default for IpmOpt {
    fn default() -> Self {
        Self {
            feastol: 1e-6,
            gradtol: 1e-6,
            comptol: 1e-6,
            costtol: 1e-6,
            max_it: 150,
            max_red: 20,
            step_control: false,
            cost_mult: 1.0,
        }
    }
}

/// Quantity limited by branch flow constraints.
#[derive(Debug, Default, PartialEq, Copy, Clone, ValueEnum)]
pub enum FlowLim {
    /// Apparent power (MVA).
    #[default]
    S,
    /// Active power (MW).
    P,
    /// Current magnitude (MVA at 1 p.u. voltage).
    I,
}

/// Optimal power flow options.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct OpfOpt {
    pub ipm: IpmOpt,
    pub flow_lim: FlowLim,
    /// Omit the branch angle difference constraints.
    pub ignore_ang_lim: bool,
    /// Convert polynomial costs to piecewise linear with this many points.
    pub use_pwl: Option<usize>,
    /// Objective scale factor for AC problems.
    pub ac_cost_mult: f64,
}

impl Default for OpfOpt {
    fn default() -> Self {
        Self {
            ipm: IpmOpt::default(),
            flow_lim: FlowLim::default(),
            ignore_ang_lim: true,
            use_pwl: None,
            ac_cost_mult: 1e-4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders() -> anyhow::Result<()> {
        let opt = IpmOptBuilder::default().max_it(20).step_control(true).build()?;
        assert_eq!(opt.max_it, 20);
        assert!(opt.step_control);
        assert_eq!(opt.feastol, 1e-6);

        let opt = OpfOptBuilder::default().flow_lim(FlowLim::P).build()?;
        assert_eq!(opt.flow_lim, FlowLim::P);
        assert!(opt.ignore_ang_lim);
        assert_eq!(opt.ac_cost_mult, 1e-4);
        Ok(())
    }
}
