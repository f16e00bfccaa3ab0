//! DTC collection windows
//!
//! Bus nodes report their active fault codes piecemeal and repeatedly. The
//! aggregator gathers reports for a fixed window, keeping one entry per code
//! (the last reported occurrence count wins), and hands the whole set to the
//! controller in one call when the window ends.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, trace};
use vta_core::{BusController, BusType, Dtc, DtcChangeSummary, Scheduler, TimerId, TimerToken};

/// Result of flushing one collection window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DtcSnapshot {
    pub bus: BusType,
    /// Every distinct code reported during the window
    pub dtcs: Vec<Dtc>,
    /// What the controller made of it
    pub summary: DtcChangeSummary,
}

impl DtcSnapshot {
    /// Just the codes, in report order
    pub fn codes(&self) -> Vec<u64> {
        self.dtcs.iter().map(|d| d.code).collect()
    }

    /// Look up the entry for one code
    pub fn get(&self, code: u64) -> Option<&Dtc> {
        self.dtcs.iter().find(|d| d.code == code)
    }
}

/// Collects a bus's reported fault codes over one window at a time
#[derive(Debug)]
pub struct DtcAggregator {
    bus: BusType,
    window: Duration,
    /// Pending set, one entry per code. Small and bounded per bus, so a
    /// linear scan on insert is fine.
    pending: Vec<Dtc>,
    collecting: bool,
    flush_token: Option<TimerToken>,
}

impl DtcAggregator {
    pub fn new(bus: BusType, window: Duration) -> Self {
        Self {
            bus,
            window,
            pending: Vec::new(),
            collecting: false,
            flush_token: None,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn pending(&self) -> &[Dtc] {
        &self.pending
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Open a new collection window
    ///
    /// Does nothing (and returns `false`) if a window is already open.
    pub fn start_collecting(&mut self, scheduler: &mut dyn Scheduler) -> bool {
        if self.collecting {
            return false;
        }

        self.pending.clear();
        if let Some(token) = self.flush_token.take() {
            scheduler.cancel(token);
        }
        self.flush_token = Some(scheduler.schedule_after(self.window, TimerId::DtcFlush));
        self.collecting = true;

        debug!(bus = %self.bus, window_ms = self.window.as_millis() as u64, "DTC collection started");
        true
    }

    /// Close the window without delivering anything
    pub fn stop_collecting(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(token) = self.flush_token.take() {
            scheduler.cancel(token);
        }
        self.collecting = false;
    }

    /// Record one reported code
    ///
    /// A code already pending has its occurrence count overwritten; absent
    /// reports are ignored.
    pub fn add(&mut self, dtc: impl Into<Option<Dtc>>) {
        let Some(dtc) = dtc.into() else {
            return;
        };

        match self.pending.iter_mut().find(|p| p.code == dtc.code) {
            Some(existing) => {
                existing.occurrence_count = dtc.occurrence_count;
            }
            None => {
                trace!(bus = %self.bus, code = format!("0x{:08X}", dtc.code), "DTC collected");
                self.pending.push(dtc);
            }
        }
    }

    /// Deliver the pending set to the controller and close the window
    ///
    /// Cancels the scheduled flush if one is still pending, so a forced flush
    /// and the timer can never both deliver the same window.
    pub fn flush(
        &mut self,
        scheduler: &mut dyn Scheduler,
        controller: &dyn BusController,
    ) -> DtcSnapshot {
        if let Some(token) = self.flush_token.take() {
            scheduler.cancel(token);
        }

        let dtcs = std::mem::take(&mut self.pending);
        self.collecting = false;

        debug!(bus = %self.bus, count = dtcs.len(), "Active DTCs collected");

        let codes: Vec<u64> = dtcs.iter().map(|d| d.code).collect();
        let summary = controller.check_dtcs(self.bus, &codes);

        DtcSnapshot {
            bus: self.bus,
            dtcs,
            summary,
        }
    }

    /// Handle expiry of the collection window timer
    ///
    /// Returns `None` if `token` is not the flush currently scheduled.
    pub fn on_flush_timer(
        &mut self,
        token: TimerToken,
        scheduler: &mut dyn Scheduler,
        controller: &dyn BusController,
    ) -> Option<DtcSnapshot> {
        if self.flush_token != Some(token) {
            trace!(bus = %self.bus, %token, "Ignoring stale DTC flush timer");
            return None;
        }
        self.flush_token = None;

        if !self.collecting {
            error!(bus = %self.bus, "DTC flush timer fired outside a collection window");
        }
        Some(self.flush(scheduler, controller))
    }
}
