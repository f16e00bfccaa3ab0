//! Bus monitor errors

use thiserror::Error;
use vta_core::BusType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The monitor task is gone (shut down or panicked)
    #[error("Bus monitor for {0} has stopped")]
    Closed(BusType),
}
