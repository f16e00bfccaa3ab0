//! Scheduler capability used by bus monitors
//!
//! A scheduler only offers "run once after a delay" and "cancel". Repeating
//! work is expressed by rescheduling from within the expiry handler. Expired
//! timers are handed back to the owning monitor as `(TimerToken, TimerId)`,
//! so a monitor can discard expiries for tokens it already gave up.

use std::fmt;
use std::time::Duration;

/// Which callback of a monitor a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Periodic bus liveness check
    LivenessCheck,
    /// End of a DTC collection window
    DtcFlush,
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerId::LivenessCheck => f.write_str("liveness_check"),
            TimerId::DtcFlush => f.write_str("dtc_flush"),
        }
    }
}

/// Handle for one scheduled expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Delayed one-shot callbacks with cancellation
pub trait Scheduler {
    /// Arrange for `timer` to expire once after `delay`
    fn schedule_after(&mut self, delay: Duration, timer: TimerId) -> TimerToken;

    /// Cancel a pending expiry; unknown or already expired tokens are ignored
    fn cancel(&mut self, token: TimerToken);
}

impl<S: Scheduler + ?Sized> Scheduler for &mut S {
    fn schedule_after(&mut self, delay: Duration, timer: TimerId) -> TimerToken {
        (**self).schedule_after(delay, timer)
    }

    fn cancel(&mut self, token: TimerToken) {
        (**self).cancel(token)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn schedule_after(&mut self, delay: Duration, timer: TimerId) -> TimerToken {
        (**self).schedule_after(delay, timer)
    }

    fn cancel(&mut self, token: TimerToken) {
        (**self).cancel(token)
    }
}
