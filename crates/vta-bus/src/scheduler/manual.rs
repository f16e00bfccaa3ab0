//! Virtual-clock scheduler

use std::collections::BTreeMap;
use std::time::Duration;

use vta_core::{Scheduler, TimerId, TimerToken};

use super::TimerExpiry;

/// Scheduler driven by an explicit virtual clock
///
/// Nothing expires until the clock is moved. Timers with equal deadlines
/// expire in the order they were scheduled.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next_token: u64,
    pending: BTreeMap<(Duration, TimerToken), TimerId>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time, measured from creation
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of timers waiting to expire
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a timer of the given kind is waiting
    pub fn is_pending(&self, timer: TimerId) -> bool {
        self.pending.values().any(|t| *t == timer)
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to
    /// its deadline
    ///
    /// Timers scheduled while handling the returned expiry are visible to the
    /// next call, which is what makes self-rescheduling timers work.
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerExpiry> {
        let (&(deadline, token), _) = self.pending.iter().next()?;
        if deadline > until {
            return None;
        }
        let timer = self.pending.remove(&(deadline, token))?;
        self.now = self.now.max(deadline);
        Some(TimerExpiry { token, timer })
    }

    /// Move the clock forward without expiring anything
    pub fn advance_to(&mut self, time: Duration) {
        self.now = self.now.max(time);
    }

    /// Move the clock forward by `by` and return every timer due by then
    pub fn advance(&mut self, by: Duration) -> Vec<TimerExpiry> {
        let until = self.now + by;
        let mut expired = Vec::new();
        while let Some(expiry) = self.pop_due(until) {
            expired.push(expiry);
        }
        self.advance_to(until);
        expired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&mut self, delay: Duration, timer: TimerId) -> TimerToken {
        self.next_token += 1;
        let token = TimerToken(self.next_token);
        self.pending.insert((self.now + delay, token), timer);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        self.pending.retain(|(_, t), _| *t != token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_expires_before_deadline() {
        let mut sched = ManualScheduler::new();
        sched.schedule_after(Duration::from_millis(1000), TimerId::LivenessCheck);

        assert!(sched.advance(Duration::from_millis(999)).is_empty());
        let expired = sched.advance(Duration::from_millis(1));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].timer, TimerId::LivenessCheck);
        assert_eq!(sched.now(), Duration::from_millis(1000));
    }

    #[test]
    fn test_expiries_come_in_deadline_order() {
        let mut sched = ManualScheduler::new();
        let late = sched.schedule_after(Duration::from_millis(500), TimerId::DtcFlush);
        let early = sched.schedule_after(Duration::from_millis(100), TimerId::LivenessCheck);

        let expired = sched.advance(Duration::from_secs(1));
        let tokens: Vec<_> = expired.iter().map(|e| e.token).collect();
        assert_eq!(tokens, vec![early, late]);
    }

    #[test]
    fn test_cancelled_timer_never_expires() {
        let mut sched = ManualScheduler::new();
        let token = sched.schedule_after(Duration::from_millis(10), TimerId::DtcFlush);
        sched.cancel(token);

        assert!(sched.advance(Duration::from_secs(1)).is_empty());
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_pop_due_moves_clock_to_deadline() {
        let mut sched = ManualScheduler::new();
        sched.schedule_after(Duration::from_millis(300), TimerId::DtcFlush);

        let expiry = sched.pop_due(Duration::from_secs(5)).unwrap();
        assert_eq!(expiry.timer, TimerId::DtcFlush);
        assert_eq!(sched.now(), Duration::from_millis(300));
    }
}
