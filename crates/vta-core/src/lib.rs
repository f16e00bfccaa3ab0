//! vta-core - Core traits and types for the vehicle telemetry agent
//!
//! This crate holds the pieces shared between the bus monitoring side and the
//! datagram transport side of the agent: the data models, the controller
//! callback contract consumed by bus monitors, and the scheduler capability
//! that drives their periodic work.

pub mod controller;
pub mod error;
pub mod models;
pub mod scheduler;

pub use controller::BusController;
pub use error::{CoreError, CoreResult};
pub use models::*;
pub use scheduler::{Scheduler, TimerId, TimerToken};
