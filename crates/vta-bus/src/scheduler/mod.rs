//! Scheduler implementations for bus monitors
//!
//! - [`TokioScheduler`] runs each timer as a sleeping task and reports
//!   expiries over a channel, for use inside the monitor task.
//! - [`ManualScheduler`] keeps a virtual clock that only moves when told to,
//!   for deterministic tests and replay.

mod manual;
mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use vta_core::{TimerId, TimerToken};

/// A timer that has reached its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerExpiry {
    pub token: TimerToken,
    pub timer: TimerId,
}
