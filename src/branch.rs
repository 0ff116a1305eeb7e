/// Transmission line, transformer or phase shifter linking two buses.
///
/// Bus references are indexes into `Case::buses`.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub name: String,
    pub from_bus: usize,
    pub to_bus: usize,
    pub online: bool,

    /// Series resistance (p.u.).
    pub r: f64,
    /// Series reactance (p.u.).
    pub x: f64,
    /// Total line charging susceptance (p.u.).
    pub b: f64,

    /// Long term MVA rating (0 means unlimited).
    pub rate_a: f64,

    /// Transformer off nominal turns ratio (0 means a line, ratio 1).
    pub ratio: f64,
    /// Phase shift angle (degrees).
    pub phase_shift: f64,

    /// Minimum angle difference, angle(Vf) - angle(Vt) (degrees).
    pub ang_min: f64,
    /// Maximum angle difference, angle(Vf) - angle(Vt) (degrees).
    pub ang_max: f64,

    // Solution fields.
    pub p_from: f64,
    pub q_from: f64,
    pub p_to: f64,
    pub q_to: f64,
    pub mu_s_from: f64,
    pub mu_s_to: f64,
    pub mu_angmin: f64,
    pub mu_angmax: f64,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            name: String::new(),
            from_bus: 0,
            to_bus: 0,
            online: true,
            r: 0.0,
            x: 0.0,
            b: 0.0,
            rate_a: 0.0,
            ratio: 0.0,
            phase_shift: 0.0,
            ang_min: -360.0,
            ang_max: 360.0,
            p_from: 0.0,
            q_from: 0.0,
            p_to: 0.0,
            q_to: 0.0,
            mu_s_from: 0.0,
            mu_s_to: 0.0,
            mu_angmin: 0.0,
            mu_angmax: 0.0,
        }
    }
}

impl Branch {
    pub fn new(from_bus: usize, to_bus: usize, r: f64, x: f64, b: f64) -> Self {
        Self {
            from_bus,
            to_bus,
            r,
            x,
            b,
            ..Default::default()
        }
    }

    pub fn is_on(&self) -> bool {
        self.online
    }

    /// Effective turns ratio, treating zero as nominal.
    pub fn tap(&self) -> f64 {
        if self.ratio == 0.0 {
            1.0
        } else {
            self.ratio
        }
    }

    /// Is the long term rating a real limit?
    pub fn is_rated(&self) -> bool {
        self.rate_a > 0.0 && self.rate_a < 1e10
    }

    /// Active power losses (MW).
    pub fn p_losses(&self) -> f64 {
        self.p_from + self.p_to
    }

    /// Reactive power losses (MVAr).
    pub fn q_losses(&self) -> f64 {
        self.q_from + self.q_to
    }

    pub fn reset(&mut self) {
        self.p_from = 0.0;
        self.q_from = 0.0;
        self.p_to = 0.0;
        self.q_to = 0.0;
        self.mu_s_from = 0.0;
        self.mu_s_to = 0.0;
        self.mu_angmin = 0.0;
        self.mu_angmax = 0.0;
    }
}
