use crate::case::Case;
use num_complex::Complex64;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;

/// Selects which elements are included in the admittance matrices.
#[derive(Clone, Copy, Debug)]
pub struct YbusOpt {
    pub bus_shunts: bool,
    pub line_shunts: bool,
    pub taps: bool,
    pub phase_shifters: bool,
}

impl Default for YbusOpt {
    fn default() -> Self {
        Self {
            bus_shunts: true,
            line_shunts: true,
            taps: true,
            phase_shifters: true,
        }
    }
}

/// Builds the bus admittance matrix and branch admittance matrices.
///
/// Returns `(Ybus, Yf, Yt)` where `Yf * V` and `Yt * V` are the complex
/// currents injected at the "from" and "to" end of each branch. Bus
/// indexes must be consecutive (internal ordering).
pub fn make_ybus(
    case: &Case,
    opt: &YbusOpt,
) -> (
    CSR<usize, Complex64>,
    CSR<usize, Complex64>,
    CSR<usize, Complex64>,
) {
    let nb = case.buses.len();
    let nl = case.branches.len();

    // For each branch, compute the elements of the branch admittance matrix where:
    //
    //      | If |   | Yff  Yft |   | Vf |
    //      |    | = |          | * |    |
    //      | It |   | Ytf  Ytt |   | Vt |
    let mut y_bus = Coo::with_size(nb, nb);
    let mut y_f = Coo::with_size(nl, nb);
    let mut y_t = Coo::with_size(nl, nb);

    for (i, br) in case.branches.iter().enumerate().filter(|(_, br)| br.is_on()) {
        let y_s = series_admittance(br.r, br.x);
        let b_c = if opt.line_shunts { br.b } else { 0.0 }; // line charging susceptance
        let t = if opt.taps { br.tap() } else { 1.0 };
        let shift = if opt.phase_shifters {
            br.phase_shift.to_radians()
        } else {
            0.0
        };
        let tap = Complex64::from_polar(t, shift);

        let y_tt = y_s + Complex64::new(0.0, b_c / 2.0);
        let y_ff = y_tt / (tap * tap.conj());
        let y_ft = -y_s / tap.conj();
        let y_tf = -y_s / tap;

        let (f, t) = (br.from_bus, br.to_bus);

        y_f.push(i, f, y_ff);
        y_f.push(i, t, y_ft);

        y_t.push(i, f, y_tf);
        y_t.push(i, t, y_tt);

        y_bus.push(f, f, y_ff);
        y_bus.push(f, t, y_ft);
        y_bus.push(t, f, y_tf);
        y_bus.push(t, t, y_tt);
    }

    if opt.bus_shunts {
        let base_mva = case.base_mva;
        for (i, b) in case.buses.iter().enumerate() {
            if b.g_shunt != 0.0 || b.b_shunt != 0.0 {
                y_bus.push(i, i, Complex64::new(b.g_shunt, b.b_shunt) / base_mva);
            }
        }
    }

    (y_bus.to_csr(), y_f.to_csr(), y_t.to_csr())
}

/// Series admittance `1/(r + jx)`. A zero impedance branch gets a large
/// finite susceptance.
pub(crate) fn series_admittance(r: f64, x: f64) -> Complex64 {
    if r == 0.0 && x == 0.0 {
        Complex64::new(0.0, -1e10)
    } else {
        Complex64::new(1.0, 0.0) / Complex64::new(r, x)
    }
}
