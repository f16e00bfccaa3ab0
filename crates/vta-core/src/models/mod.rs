//! Shared data models for bus monitors and the datagram transport

mod bus;
mod dtc;
mod envelope;

pub use bus::*;
pub use dtc::*;
pub use envelope::*;
