//! Small built-in cases for demonstration and testing.

use crate::branch::Branch;
use crate::bus::{Bus, BusType};
use crate::case::Case;
use crate::gen::{CostModel, Generator};

pub const CASE_NAMES: [&str; 5] = ["two-bus", "three-bus", "four-bus", "one-bus", "congested"];

/// Looks up a built-in case by name.
pub fn by_name(name: &str) -> Option<Case> {
    match name {
        "two-bus" => Some(two_bus()),
        "three-bus" => Some(three_bus()),
        "four-bus" => Some(four_bus()),
        "one-bus" => Some(one_bus_two_gens()),
        "congested" => Some(congested_two_bus()),
        _ => None,
    }
}

/// Lossless single branch between a reference bus and an unloaded PQ bus.
pub fn two_bus() -> Case {
    let mut case = Case::new("two-bus", 100.0);
    case.buses = vec![Bus::new("1", BusType::Ref), Bus::new("2", BusType::PQ)];
    case.branches = vec![Branch::new(0, 1, 0.0, 0.1, 0.0)];
    case.generators = vec![Generator {
        q_max: 100.0,
        q_min: -100.0,
        ..Generator::new(0, 0.0, 100.0, CostModel::Polynomial(vec![10.0, 0.0]))
    }];
    case
}

pub fn three_bus() -> Case {
    let mut case = Case::new("three-bus", 100.0);
    case.buses = vec![
        Bus::new("1", BusType::Ref),
        Bus {
            p_demand: 100.0,
            q_demand: 20.0,
            ..Bus::new("2", BusType::PV)
        },
        Bus {
            p_demand: 150.0,
            q_demand: 50.0,
            ..Bus::new("3", BusType::PQ)
        },
    ];
    case.branches = [(0, 1), (0, 2), (1, 2)]
        .into_iter()
        .map(|(f, t)| Branch {
            rate_a: 200.0,
            ..Branch::new(f, t, 0.01, 0.1, 0.02)
        })
        .collect();
    case.generators = vec![
        Generator {
            name: "G1".into(),
            q_max: 200.0,
            q_min: -200.0,
            ..Generator::new(0, 0.0, 300.0, CostModel::Polynomial(vec![0.01, 10.0, 0.0]))
        },
        Generator {
            name: "G2".into(),
            p: 80.0,
            q_max: 150.0,
            q_min: -150.0,
            ..Generator::new(1, 0.0, 200.0, CostModel::Polynomial(vec![0.02, 12.0, 0.0]))
        },
    ];
    case
}

/// Four bus system from Grainger & Stevenson, example 9.5.
pub fn four_bus() -> Case {
    let mut case = Case::new("four-bus", 100.0);
    let bus = |name: &str, bus_type, p_demand, q_demand| Bus {
        base_kv: 230.0,
        p_demand,
        q_demand,
        ..Bus::new(name, bus_type)
    };
    case.buses = vec![
        bus("1", BusType::Ref, 50.0, 30.99),
        bus("2", BusType::PQ, 170.0, 105.35),
        bus("3", BusType::PQ, 200.0, 123.94),
        bus("4", BusType::PV, 80.0, 49.58),
    ];
    let branch = |f, t, r, x, b| Branch {
        rate_a: 250.0,
        ..Branch::new(f, t, r, x, b)
    };
    case.branches = vec![
        branch(0, 1, 0.01008, 0.0504, 0.1025),
        branch(0, 2, 0.00744, 0.0372, 0.0775),
        branch(1, 3, 0.00744, 0.0372, 0.0775),
        branch(2, 3, 0.01272, 0.0636, 0.1275),
    ];
    case.generators = vec![
        Generator {
            p: 318.0,
            q_max: 100.0,
            q_min: -100.0,
            v_magnitude: 1.02,
            ..Generator::new(3, 0.0, 318.0, CostModel::Polynomial(vec![0.01, 20.0, 0.0]))
        },
        Generator {
            q_max: 300.0,
            q_min: -300.0,
            ..Generator::new(0, 0.0, 500.0, CostModel::Polynomial(vec![0.02, 25.0, 0.0]))
        },
    ];
    case
}

/// Two generators with linear costs supplying 80 MW at a single bus.
pub fn one_bus_two_gens() -> Case {
    let mut case = Case::new("one-bus", 100.0);
    case.buses = vec![Bus {
        p_demand: 80.0,
        ..Bus::new("1", BusType::Ref)
    }];
    case.generators = vec![
        Generator {
            name: "cheap".into(),
            ..Generator::new(0, 0.0, 60.0, CostModel::Polynomial(vec![10.0, 0.0]))
        },
        Generator {
            name: "dear".into(),
            ..Generator::new(0, 0.0, 100.0, CostModel::Polynomial(vec![20.0, 0.0]))
        },
    ];
    case
}

/// Cheap remote generation behind a branch rated at 50 MW.
pub fn congested_two_bus() -> Case {
    let mut case = Case::new("congested", 100.0);
    case.buses = vec![
        Bus::new("1", BusType::Ref),
        Bus {
            p_demand: 100.0,
            ..Bus::new("2", BusType::PQ)
        },
    ];
    case.branches = vec![Branch {
        rate_a: 50.0,
        ..Branch::new(0, 1, 0.0, 0.1, 0.0)
    }];
    case.generators = vec![
        Generator {
            name: "remote".into(),
            ..Generator::new(0, 0.0, 200.0, CostModel::Polynomial(vec![10.0, 0.0]))
        },
        Generator {
            name: "local".into(),
            ..Generator::new(1, 0.0, 200.0, CostModel::Polynomial(vec![20.0, 0.0]))
        },
    ];
    case
}
