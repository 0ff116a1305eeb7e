use crate::error::CaseError;

/// Generator cost curve.
#[derive(Debug, Clone, PartialEq)]
pub enum CostModel {
    /// Polynomial coefficients in descending order of power, i.e.
    /// `[c2, c1, c0]` for `c2*p^2 + c1*p + c0` ($/h, p in MW).
    Polynomial(Vec<f64>),
    /// Breakpoints `(p, cost)` in MW and $/h with strictly increasing `p`.
    PiecewiseLinear(Vec<(f64, f64)>),
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel::Polynomial(vec![0.01, 0.1, 10.0])
    }
}

/// Price and quantity block offered by a generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    /// Quantity (MW).
    pub quantity: f64,
    /// Price ($/MWh).
    pub price: f64,
    pub withheld: bool,
}

impl Offer {
    pub fn new(quantity: f64, price: f64) -> Self {
        Self {
            quantity,
            price,
            withheld: false,
        }
    }
}

/// Generating unit or dispatchable load.
#[derive(Debug, Clone, PartialEq)]
pub struct Generator {
    pub name: String,
    /// Index into `Case::buses`.
    pub bus: usize,
    pub online: bool,

    /// Machine MVA base.
    pub base_mva: f64,

    /// Active power output (MW).
    pub p: f64,
    pub p_max: f64,
    pub p_min: f64,

    /// Reactive power output (MVAr).
    pub q: f64,
    pub q_max: f64,
    pub q_min: f64,

    /// Voltage magnitude set-point (p.u.).
    pub v_magnitude: f64,

    pub cost: CostModel,

    // Solution fields.
    pub mu_pmin: f64,
    pub mu_pmax: f64,
    pub mu_qmin: f64,
    pub mu_qmax: f64,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            online: true,
            base_mva: 100.0,
            p: 0.0,
            p_max: 200.0,
            p_min: 0.0,
            q: 0.0,
            q_max: 30.0,
            q_min: -30.0,
            v_magnitude: 1.0,
            cost: CostModel::default(),
            mu_pmin: 0.0,
            mu_pmax: 0.0,
            mu_qmin: 0.0,
            mu_qmax: 0.0,
        }
    }
}

impl Generator {
    pub fn new(bus: usize, p_min: f64, p_max: f64, cost: CostModel) -> Self {
        Self {
            bus,
            p_min,
            p_max,
            cost,
            ..Default::default()
        }
    }

    pub fn is_on(&self) -> bool {
        self.online
    }

    /// Dispatchable loads are modelled as generators with a negative
    /// output range.
    pub fn is_load(&self) -> bool {
        self.p_min < 0.0 && self.p_max == 0.0
    }

    /// Is the unit at a reactive power limit?
    pub fn q_limited(&self) -> bool {
        self.q >= self.q_max || self.q <= self.q_min
    }

    pub fn is_pwl(&self) -> bool {
        matches!(self.cost, CostModel::PiecewiseLinear(_))
    }

    pub fn reset(&mut self) {
        self.mu_pmin = 0.0;
        self.mu_pmax = 0.0;
        self.mu_qmin = 0.0;
        self.mu_qmax = 0.0;
    }

    /// Total cost ($/h) at the given active power output (MW).
    ///
    /// Piecewise linear curves are extrapolated beyond their end points
    /// using the first and last segments.
    pub fn total_cost(&self, p: f64) -> f64 {
        match &self.cost {
            CostModel::Polynomial(c) => poly_val(c, p),
            CostModel::PiecewiseLinear(points) => pwl_val(points, p),
        }
    }

    /// Checks the internal consistency of the cost curve.
    pub fn validate_cost(&self, index: usize) -> Result<(), CaseError> {
        if let CostModel::PiecewiseLinear(points) = &self.cost {
            if points.len() < 2 {
                return Err(CaseError::BadBreakpoints { gen: index });
            }
            if points.windows(2).any(|w| w[1].0 <= w[0].0) {
                return Err(CaseError::BadBreakpoints { gen: index });
            }
            let m = slopes(points);
            for (k, w) in m.windows(2).enumerate() {
                if w[1] < w[0] - 1e-10 * w[0].abs().max(1.0) {
                    return Err(CaseError::NonConvexCost {
                        gen: index,
                        segment: k + 1,
                    });
                }
            }
        }
        Ok(())
    }

    /// Replaces a polynomial cost with a piecewise linear one, evaluated at
    /// `n_points` evenly spaced points between `p_min` and `p_max`. When
    /// `p_min` is positive the first segment runs from the origin.
    ///
    /// A unit with no operating range keeps a single segment from the
    /// origin to `p_min`, or its polynomial cost if `p_min` is not positive.
    pub fn poly_to_pwl(&mut self, n_points: usize) {
        let coeffs = match &self.cost {
            CostModel::Polynomial(c) => c.clone(),
            CostModel::PiecewiseLinear(_) => return,
        };
        if self.p_max <= self.p_min {
            if self.p_min > 0.0 {
                self.cost = CostModel::PiecewiseLinear(vec![
                    (0.0, poly_val(&coeffs, 0.0)),
                    (self.p_min, poly_val(&coeffs, self.p_min)),
                ]);
            }
            return;
        }
        let mut points = Vec::with_capacity(n_points);

        let (mut x, n, step) = if self.p_min > 0.0 {
            let n_points = n_points.max(3);
            points.push((0.0, poly_val(&coeffs, 0.0)));
            let step = (self.p_max - self.p_min) / (n_points - 2) as f64;
            (self.p_min, n_points - 1, step)
        } else {
            let n_points = n_points.max(2);
            let step = (self.p_max - self.p_min) / (n_points - 1) as f64;
            (self.p_min, n_points, step)
        };
        for i in 0..n {
            if i == n - 1 {
                x = self.p_max; // avoid accumulated rounding at the end
            }
            points.push((x, poly_val(&coeffs, x)));
            x += step;
        }

        self.cost = CostModel::PiecewiseLinear(points);
    }

    /// Converts a single segment piecewise linear cost into a linear
    /// polynomial.
    pub fn pwl1_to_poly(&mut self) {
        if let CostModel::PiecewiseLinear(points) = &self.cost {
            if points.len() == 2 {
                let (x1, y1) = points[0];
                let (x2, y2) = points[1];
                let m = (y2 - y1) / (x2 - x1);
                let c = y1 - m * x1;
                self.cost = CostModel::Polynomial(vec![m, c]);
            }
        }
    }

    /// Updates the cost curve from price/quantity offer blocks. Blocks are
    /// stacked in order of increasing price. Zero quantity and withheld
    /// blocks are ignored and a generator with no valid offers is taken
    /// offline.
    pub fn offers_to_pwl(&mut self, offers: &[Offer]) {
        let mut valid: Vec<&Offer> = offers
            .iter()
            .filter(|o| !o.withheld && (o.quantity * 1e4).round() > 0.0)
            .collect();

        if valid.is_empty() {
            if !self.is_load() {
                log::info!("No valid offers for generator {}, shutting down.", self.name);
                self.online = false;
            }
            return;
        }
        valid.sort_by(|a, b| a.price.total_cmp(&b.price));

        let mut points = vec![(0.0, 0.0)];
        for offer in valid {
            let (x1, y1) = points[points.len() - 1];
            let x2 = x1 + offer.quantity;
            points.push((x2, y1 + offer.price * offer.quantity));
        }
        log::debug!(
            "Creating pwl cost function with {} segments: {:?}",
            points.len() - 1,
            points
        );

        self.cost = CostModel::PiecewiseLinear(points);
        self.online = true;
    }

    /// Derivative of the polynomial cost at `p` ($/MWh), zero for
    /// piecewise linear costs.
    pub(crate) fn marginal_cost(&self, p: f64) -> f64 {
        match &self.cost {
            CostModel::Polynomial(c) => poly_val(&poly_der(c), p),
            CostModel::PiecewiseLinear(_) => 0.0,
        }
    }

    /// Second derivative of the polynomial cost at `p`.
    pub(crate) fn cost_curvature(&self, p: f64) -> f64 {
        match &self.cost {
            CostModel::Polynomial(c) => poly_val(&poly_der(&poly_der(c)), p),
            CostModel::PiecewiseLinear(_) => 0.0,
        }
    }
}

pub(crate) fn poly_val(c: &[f64], x: f64) -> f64 {
    c.iter().fold(0.0, |acc, &ci| acc * x + ci)
}

pub(crate) fn poly_der(c: &[f64]) -> Vec<f64> {
    let n = c.len();
    if n < 2 {
        return vec![];
    }
    c[..n - 1]
        .iter()
        .enumerate()
        .map(|(i, &ci)| ci * (n - 1 - i) as f64)
        .collect()
}

pub(crate) fn slopes(points: &[(f64, f64)]) -> Vec<f64> {
    points
        .windows(2)
        .map(|w| (w[1].1 - w[0].1) / (w[1].0 - w[0].0))
        .collect()
}

fn pwl_val(points: &[(f64, f64)], p: f64) -> f64 {
    let n_segments = points.len().saturating_sub(1);
    if n_segments == 0 {
        return points.first().map(|pt| pt.1).unwrap_or(0.0);
    }
    let k = (0..n_segments)
        .find(|&k| p <= points[k + 1].0)
        .unwrap_or(n_segments - 1);
    let (x1, y1) = points[k];
    let (x2, y2) = points[k + 1];
    let m = (y2 - y1) / (x2 - x1);
    y1 + m * (p - x1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn polynomial_cost() {
        let g = Generator::new(0, 0.0, 100.0, CostModel::Polynomial(vec![0.01, 10.0, 100.0]));
        assert!((g.total_cost(50.0) - (25.0 + 500.0 + 100.0)).abs() < 1e-12);
        assert!((g.marginal_cost(50.0) - 11.0).abs() < 1e-12);
        assert!((g.cost_curvature(50.0) - 0.02).abs() < 1e-12);
    }

    #[test]
    fn pwl_cost_lookup() {
        let g = Generator::new(
            0,
            0.0,
            100.0,
            CostModel::PiecewiseLinear(vec![(0.0, 0.0), (50.0, 500.0), (100.0, 1500.0)]),
        );
        assert_eq!(g.total_cost(25.0), 250.0);
        assert_eq!(g.total_cost(75.0), 1000.0);
        assert_eq!(g.total_cost(120.0), 1900.0);
    }

    #[test]
    fn poly_to_pwl_from_origin() {
        let mut g = Generator::new(0, 10.0, 100.0, CostModel::Polynomial(vec![0.1, 5.0, 0.0]));
        g.poly_to_pwl(4);
        match &g.cost {
            CostModel::PiecewiseLinear(points) => {
                assert_eq!(points.len(), 4);
                assert_eq!(points[0], (0.0, 0.0));
                assert_eq!(points[1].0, 10.0);
                assert!((points[2].0 - 55.0).abs() < 1e-12);
                assert_eq!(points[3].0, 100.0);
                assert!((points[3].1 - 1500.0).abs() < 1e-9);
            }
            CostModel::Polynomial(_) => panic!("expected pwl cost"),
        }
    }

    #[test]
    fn poly_to_pwl_fixed_output() -> Result<()> {
        let mut g = Generator::new(0, 80.0, 80.0, CostModel::Polynomial(vec![0.1, 5.0, 8.0]));
        g.poly_to_pwl(10);
        assert_eq!(
            g.cost,
            CostModel::PiecewiseLinear(vec![(0.0, 8.0), (80.0, 1048.0)])
        );
        g.validate_cost(0)?;

        let mut g = Generator::new(0, 0.0, 0.0, CostModel::Polynomial(vec![0.1, 5.0, 0.0]));
        g.poly_to_pwl(10);
        assert_eq!(g.cost, CostModel::Polynomial(vec![0.1, 5.0, 0.0]));
        g.validate_cost(0)?;
        Ok(())
    }

    #[test]
    fn concave_poly_to_pwl() {
        let mut g = Generator::new(0, 0.0, 300.0, CostModel::Polynomial(vec![-0.02, 20.0, 0.0]));
        g.poly_to_pwl(5);
        assert!(matches!(
            g.validate_cost(1),
            Err(CaseError::NonConvexCost { gen: 1, .. })
        ));
    }

    #[test]
    fn pwl1_to_poly() {
        let mut g = Generator::new(
            0,
            0.0,
            100.0,
            CostModel::PiecewiseLinear(vec![(0.0, 100.0), (100.0, 2100.0)]),
        );
        g.pwl1_to_poly();
        assert_eq!(g.cost, CostModel::Polynomial(vec![20.0, 100.0]));
    }

    #[test]
    fn validate_pwl() -> Result<()> {
        let mut g = Generator::new(
            0,
            0.0,
            100.0,
            CostModel::PiecewiseLinear(vec![(0.0, 0.0), (50.0, 1000.0), (100.0, 1500.0)]),
        );
        assert_eq!(
            g.validate_cost(3),
            Err(CaseError::NonConvexCost { gen: 3, segment: 1 })
        );

        g.cost = CostModel::PiecewiseLinear(vec![(0.0, 0.0), (0.0, 10.0)]);
        assert_eq!(g.validate_cost(0), Err(CaseError::BadBreakpoints { gen: 0 }));

        g.cost = CostModel::PiecewiseLinear(vec![(0.0, 0.0), (50.0, 500.0), (100.0, 1500.0)]);
        g.validate_cost(0)?;
        Ok(())
    }

    #[test]
    fn offers() {
        let mut g = Generator::new(0, 0.0, 100.0, CostModel::default());
        g.offers_to_pwl(&[
            Offer::new(30.0, 20.0),
            Offer::new(0.0, 5.0),
            Offer::new(20.0, 10.0),
        ]);
        assert!(g.online);
        assert_eq!(
            g.cost,
            CostModel::PiecewiseLinear(vec![(0.0, 0.0), (20.0, 200.0), (50.0, 800.0)])
        );

        g.offers_to_pwl(&[Offer {
            quantity: 10.0,
            price: 1.0,
            withheld: true,
        }]);
        assert!(!g.online);
    }
}
