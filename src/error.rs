use thiserror::Error;

/// Problems with case data or model construction that are detected
/// before any solver state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaseError {
    #[error("OPF requires a single reference bus, none found")]
    NoReferenceBus,

    #[error("OPF requires a single reference bus, {0} found")]
    MultipleReferenceBuses(usize),

    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("unknown variable set: {0}")]
    UnknownVariable(String),

    #[error("dimension mismatch in {name}: expected {expected}, got {actual}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("non-convex piecewise linear cost for generator {gen} at segment {segment}")]
    NonConvexCost { gen: usize, segment: usize },

    #[error("piecewise linear cost breakpoints must strictly increase (generator {gen})")]
    BadBreakpoints { gen: usize },

    #[error("polynomial cost of degree {degree} not supported (generator {gen})")]
    PolynomialDegree { gen: usize, degree: usize },

    #[error("{kind} {index} references bus {bus} which does not exist")]
    InvalidBusIndex {
        kind: &'static str,
        index: usize,
        bus: usize,
    },

    #[error("zero voltage magnitude at bus {0}")]
    ZeroVoltage(usize),
}
