use crate::case::Case;
use std::collections::HashSet;

/// Builds index lists for each type of bus (REF, PV, PQ).
///
/// Generators with "out-of-service" status are treated as PQ buses with
/// zero generation (regardless of their output). Isolated buses appear in
/// none of the lists. Expects the case to use internal consecutive bus
/// numbering.
pub fn bus_types(case: &Case) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    // Buses with generators that are ON.
    let bus_gen_status = case
        .generators
        .iter()
        .filter(|g| g.is_on())
        .map(|g| g.bus)
        .collect::<HashSet<usize>>();

    let buses = || case.buses.iter().enumerate().filter(|(_, b)| !b.is_isolated());

    let refbus = buses()
        .filter(|(i, b)| b.is_ref() && bus_gen_status.contains(i))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    let pv = buses()
        .filter(|(i, b)| b.is_pv() && bus_gen_status.contains(i))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();
    let pq = buses()
        .filter(|(i, b)| b.is_pq() || !bus_gen_status.contains(i))
        .map(|(i, _)| i)
        .collect::<Vec<usize>>();

    (refbus, pv, pq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cases::{four_bus, three_bus};

    #[test]
    fn partitions() {
        let (refbus, pv, pq) = bus_types(&four_bus());
        assert_eq!(refbus, vec![0]);
        assert_eq!(pv, vec![3]);
        assert_eq!(pq, vec![1, 2]);
    }

    #[test]
    fn offline_generator_makes_pq() {
        let mut case = three_bus();
        case.generators[1].online = false;
        let (refbus, pv, pq) = bus_types(&case);
        assert_eq!(refbus, vec![0]);
        assert!(pv.is_empty());
        assert_eq!(pq, vec![1, 2]);
    }
}
