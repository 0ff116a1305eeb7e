use crate::case::Case;
use crate::order::{IndexOrder, Order};

/// Converts a case to internal form.
///
/// Isolated buses, out-of-service branches and generators, and any
/// branch or generator attached to an isolated bus are removed. Bus
/// references of the remaining elements are renumbered consecutively.
pub fn ext_to_int(case: &Case) -> (Case, Order) {
    let bus_on = |i: usize| !case.buses[i].is_isolated();

    let bus = IndexOrder::new(case.buses.len(), bus_on);
    let gen = IndexOrder::new(case.generators.len(), |i| {
        let g = &case.generators[i];
        g.is_on() && bus_on(g.bus)
    });
    let branch = IndexOrder::new(case.branches.len(), |i| {
        let br = &case.branches[i];
        br.is_on() && bus_on(br.from_bus) && bus_on(br.to_bus)
    });

    let mut internal = Case {
        name: case.name.clone(),
        base_mva: case.base_mva,
        buses: bus.i2e.iter().map(|&i| case.buses[i].clone()).collect(),
        branches: branch.i2e.iter().map(|&i| case.branches[i].clone()).collect(),
        generators: gen.i2e.iter().map(|&i| case.generators[i].clone()).collect(),
    };

    // apply consecutive bus numbering
    for g in internal.generators.iter_mut() {
        g.bus = bus.e2i[g.bus].unwrap_or_default();
    }
    for br in internal.branches.iter_mut() {
        br.from_bus = bus.e2i[br.from_bus].unwrap_or_default();
        br.to_bus = bus.e2i[br.to_bus].unwrap_or_default();
    }

    (internal, Order { bus, gen, branch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusType;
    use crate::cases::three_bus;

    #[test]
    fn removes_isolated() {
        let mut case = three_bus();
        case.buses[1].bus_type = BusType::Isolated;

        let (int, order) = ext_to_int(&case);

        assert_eq!(int.buses.len(), 2);
        assert_eq!(order.bus.i2e, vec![0, 2]);
        assert_eq!(order.bus.e2i, vec![Some(0), None, Some(1)]);

        // only the 1-3 branch survives, renumbered 0-1
        assert_eq!(order.branch.i2e, vec![1]);
        assert_eq!((int.branches[0].from_bus, int.branches[0].to_bus), (0, 1));

        assert_eq!(order.gen.i2e, vec![0]);
    }

    #[test]
    fn drops_offline() {
        let mut case = three_bus();
        case.branches[0].online = false;
        case.generators[1].online = false;

        let (int, order) = ext_to_int(&case);
        assert_eq!(int.branches.len(), 2);
        assert_eq!(int.generators.len(), 1);
        assert_eq!(order.branch.e2i, vec![None, Some(0), Some(1)]);
    }
}
