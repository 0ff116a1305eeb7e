use crate::case::Case;
use crate::order::Order;

/// Copies solution fields from an internal case back onto the external
/// case it was created from. Elements that were removed keep their
/// (reset) result fields, except that removed generators have their
/// output zeroed.
pub fn int_to_ext(internal: &Case, order: &Order, case: &mut Case) {
    for (b, &e) in internal.buses.iter().zip(&order.bus.i2e) {
        let bus = &mut case.buses[e];
        bus.v_magnitude = b.v_magnitude;
        bus.v_angle = b.v_angle;
        bus.p_lambda = b.p_lambda;
        bus.q_lambda = b.q_lambda;
        bus.mu_vmin = b.mu_vmin;
        bus.mu_vmax = b.mu_vmax;
    }
    for (br, &e) in internal.branches.iter().zip(&order.branch.i2e) {
        let branch = &mut case.branches[e];
        branch.p_from = br.p_from;
        branch.q_from = br.q_from;
        branch.p_to = br.p_to;
        branch.q_to = br.q_to;
        branch.mu_s_from = br.mu_s_from;
        branch.mu_s_to = br.mu_s_to;
        branch.mu_angmin = br.mu_angmin;
        branch.mu_angmax = br.mu_angmax;
    }
    for (i, g) in case.generators.iter_mut().enumerate() {
        match order.gen.e2i[i] {
            Some(k) => {
                let gi = &internal.generators[k];
                g.p = gi.p;
                g.q = gi.q;
                g.mu_pmin = gi.mu_pmin;
                g.mu_pmax = gi.mu_pmax;
                g.mu_qmin = gi.mu_qmin;
                g.mu_qmax = gi.mu_qmax;
            }
            None => {
                g.p = 0.0;
                g.q = 0.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusType;
    use crate::cases::three_bus;
    use crate::ext_to_int::ext_to_int;

    #[test]
    fn round_trip_results() {
        let mut case = three_bus();
        case.buses[1].bus_type = BusType::Isolated;

        let (mut int, order) = ext_to_int(&case);
        int.buses[1].v_magnitude = 0.97;
        int.branches[0].p_from = 42.0;
        int.generators[0].p = 150.0;

        int_to_ext(&int, &order, &mut case);

        assert_eq!(case.buses[2].v_magnitude, 0.97);
        assert_eq!(case.buses[1].v_magnitude, 0.0);
        assert_eq!(case.branches[1].p_from, 42.0);
        assert_eq!(case.generators[0].p, 150.0);
        assert_eq!(case.generators[1].p, 0.0);
    }
}
