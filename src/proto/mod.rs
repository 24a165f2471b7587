//! Hand-rolled protobuf support for the SABR wire contract.

pub mod messages;
pub mod wire;

pub use messages::*;
