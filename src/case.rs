use crate::branch::Branch;
use crate::bus::Bus;
use crate::error::CaseError;
use crate::gen::Generator;

/// Power system case: buses connected by branches, with generators
/// attached to buses. Cross references are indexes into the flat
/// vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub name: String,
    /// System MVA base.
    pub base_mva: f64,
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub generators: Vec<Generator>,
}

impl Default for Case {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_mva: 100.0,
            buses: Vec::default(),
            branches: Vec::default(),
            generators: Vec::default(),
        }
    }
}

impl Case {
    pub fn new(name: impl Into<String>, base_mva: f64) -> Self {
        Self {
            name: name.into(),
            base_mva,
            ..Default::default()
        }
    }

    /// Indexes of buses that are not isolated.
    pub fn connected_buses(&self) -> Vec<usize> {
        (0..self.buses.len())
            .filter(|&i| !self.buses[i].is_isolated())
            .collect()
    }

    /// Indexes of in-service generators.
    pub fn online_generators(&self) -> Vec<usize> {
        (0..self.generators.len())
            .filter(|&i| self.generators[i].is_on())
            .collect()
    }

    /// Indexes of in-service branches.
    pub fn online_branches(&self) -> Vec<usize> {
        (0..self.branches.len())
            .filter(|&i| self.branches[i].is_on())
            .collect()
    }

    /// Indexes of reference buses.
    pub fn ref_buses(&self) -> Vec<usize> {
        (0..self.buses.len())
            .filter(|&i| self.buses[i].is_ref())
            .collect()
    }

    /// Zeros the result fields of every bus, branch and generator.
    pub fn reset(&mut self) {
        self.buses.iter_mut().for_each(|b| b.reset());
        self.branches.iter_mut().for_each(|br| br.reset());
        self.generators.iter_mut().for_each(|g| g.reset());
    }

    /// Takes branches and generators connected to isolated buses out
    /// of service.
    pub fn deactivate_isolated(&mut self) {
        let buses = &self.buses;
        for br in self.branches.iter_mut() {
            if buses[br.from_bus].is_isolated() || buses[br.to_bus].is_isolated() {
                br.online = false;
            }
        }
        for g in self.generators.iter_mut() {
            if buses[g.bus].is_isolated() {
                g.online = false;
            }
        }
    }

    /// Checks bus references and generator cost curves.
    pub fn validate(&self) -> Result<(), CaseError> {
        let nb = self.buses.len();
        for (i, br) in self.branches.iter().enumerate() {
            for bus in [br.from_bus, br.to_bus] {
                if bus >= nb {
                    return Err(CaseError::InvalidBusIndex {
                        kind: "branch",
                        index: i,
                        bus,
                    });
                }
            }
        }
        for (i, g) in self.generators.iter().enumerate() {
            if g.bus >= nb {
                return Err(CaseError::InvalidBusIndex {
                    kind: "generator",
                    index: i,
                    bus: g.bus,
                });
            }
            g.validate_cost(i)?;
        }
        Ok(())
    }

    /// Returns the index of the single reference bus.
    pub fn single_ref(&self) -> Result<usize, CaseError> {
        let refs = self.ref_buses();
        match refs.len() {
            1 => Ok(refs[0]),
            0 => Err(CaseError::NoReferenceBus),
            n => Err(CaseError::MultipleReferenceBuses(n)),
        }
    }
}
