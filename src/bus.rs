/// Bus type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusType {
    /// Fixed active and reactive injection.
    #[default]
    PQ,
    /// Fixed active injection and voltage magnitude.
    PV,
    /// Angle reference (swing) bus.
    Ref,
    /// Not connected to the rest of the network.
    Isolated,
}

/// Power system bus node.
#[derive(Debug, Clone, PartialEq)]
pub struct Bus {
    pub name: String,
    pub bus_type: BusType,

    /// Base voltage (kV).
    pub base_kv: f64,

    /// Voltage magnitude initial guess (p.u.).
    pub v_magnitude_guess: f64,
    /// Voltage angle initial guess (degrees).
    pub v_angle_guess: f64,

    /// Maximum voltage magnitude (p.u.).
    pub v_max: f64,
    /// Minimum voltage magnitude (p.u.).
    pub v_min: f64,

    /// Fixed active power demand (MW).
    pub p_demand: f64,
    /// Fixed reactive power demand (MVAr).
    pub q_demand: f64,

    /// Shunt conductance (MW demanded at V = 1.0 p.u.).
    pub g_shunt: f64,
    /// Shunt susceptance (MVAr injected at V = 1.0 p.u.).
    pub b_shunt: f64,

    // Solution fields.
    pub v_magnitude: f64,
    pub v_angle: f64,
    pub p_lambda: f64,
    pub q_lambda: f64,
    pub mu_vmin: f64,
    pub mu_vmax: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus_type: BusType::PQ,
            base_kv: 100.0,
            v_magnitude_guess: 1.0,
            v_angle_guess: 0.0,
            v_max: 1.1,
            v_min: 0.9,
            p_demand: 0.0,
            q_demand: 0.0,
            g_shunt: 0.0,
            b_shunt: 0.0,
            v_magnitude: 0.0,
            v_angle: 0.0,
            p_lambda: 0.0,
            q_lambda: 0.0,
            mu_vmin: 0.0,
            mu_vmax: 0.0,
        }
    }
}

impl Bus {
    pub fn new(name: impl Into<String>, bus_type: BusType) -> Self {
        Self {
            name: name.into(),
            bus_type,
            ..Default::default()
        }
    }

    pub fn is_pq(&self) -> bool {
        self.bus_type == BusType::PQ
    }

    pub fn is_pv(&self) -> bool {
        self.bus_type == BusType::PV
    }

    pub fn is_ref(&self) -> bool {
        self.bus_type == BusType::Ref
    }

    pub fn is_isolated(&self) -> bool {
        self.bus_type == BusType::Isolated
    }

    /// Resets the result fields.
    pub fn reset(&mut self) {
        self.v_magnitude = 0.0;
        self.v_angle = 0.0;
        self.p_lambda = 0.0;
        self.q_lambda = 0.0;
        self.mu_vmin = 0.0;
        self.mu_vmax = 0.0;
    }
}
