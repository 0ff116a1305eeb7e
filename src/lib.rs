mod branch;
mod bus;
mod bus_types;
mod case;
mod dc;
mod error;
mod ext_to_int;
mod gen;
mod int_to_ext;
mod order;
mod sbus;
mod ybus;

mod d2;
mod dsbr;
mod jac;
mod newton;
mod runpf;
mod sparse;

mod acopf;
mod dcopf;
mod opf;
mod opf_model;
mod opt;
mod report;

pub mod cases;
pub mod debug;
pub mod ipm;

pub use branch::*;
pub use bus::*;
pub use bus_types::*;
pub use case::*;
pub use dc::*;
pub use error::*;
pub use ext_to_int::*;
pub use gen::*;
pub use int_to_ext::*;
pub use order::*;
pub use sbus::*;
pub use ybus::*;

pub use d2::*;
pub use dsbr::*;
pub use jac::*;
pub use newton::*;
pub use runpf::*;

pub use opf::*;
pub use opf_model::*;
pub use opt::*;
pub use report::*;
