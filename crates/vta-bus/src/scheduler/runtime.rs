//! Tokio-backed scheduler

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;
use vta_core::{Scheduler, TimerId, TimerToken};

use super::TimerExpiry;

/// Scheduler that runs each timer as a sleeping tokio task
///
/// Expiries are sent to the receiver returned by [`TokioScheduler::new`]; the
/// owner of that receiver is expected to feed them back into its monitor.
/// Must be used from within a tokio runtime.
pub struct TokioScheduler {
    next_token: u64,
    timers: HashMap<TimerToken, JoinHandle<()>>,
    expired_tx: mpsc::UnboundedSender<TimerExpiry>,
}

impl TokioScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerExpiry>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            next_token: 0,
            timers: HashMap::new(),
            expired_tx,
        };
        (scheduler, expired_rx)
    }

    /// Number of timers that have not yet fired or been cancelled
    pub fn active_count(&self) -> usize {
        self.timers.values().filter(|h| !h.is_finished()).count()
    }

    /// Cancel every outstanding timer
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&mut self, delay: Duration, timer: TimerId) -> TimerToken {
        self.timers.retain(|_, handle| !handle.is_finished());

        self.next_token += 1;
        let token = TimerToken(self.next_token);
        let expired_tx = self.expired_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the monitor shut down
            let _ = expired_tx.send(TimerExpiry { token, timer });
        });

        trace!(%token, %timer, delay_ms = delay.as_millis() as u64, "Timer scheduled");
        self.timers.insert(token, handle);
        token
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.timers.remove(&token) {
            handle.abort();
            trace!(%token, "Timer cancelled");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
