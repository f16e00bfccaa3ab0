//! BusMonitor - liveness tracking and DTC aggregation for one bus

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use vta_core::{BusController, BusStatus, BusType, Dtc, Scheduler, TimerId};

use crate::activity::ActivityMonitor;
use crate::config::BusMonitorConfig;
use crate::dtc::{DtcAggregator, DtcSnapshot};
use crate::scheduler::{ManualScheduler, TimerExpiry};

/// Protocol-independent state of one monitored bus
///
/// Owns its scheduler, so every timer of this monitor is handled through
/// [`BusMonitor::on_timer`] by whoever drives it. Methods take `&mut self`;
/// the caller is responsible for serializing driver reports with timer
/// expiries (see [`crate::runner`] for a task that does this).
pub struct BusMonitor<S> {
    config: BusMonitorConfig,
    activity: ActivityMonitor,
    dtcs: DtcAggregator,
    scheduler: S,
    controller: Arc<dyn BusController>,
}

impl<S: Scheduler> BusMonitor<S> {
    pub fn new(config: BusMonitorConfig, scheduler: S, controller: Arc<dyn BusController>) -> Self {
        let activity = ActivityMonitor::new(config.bus, config.liveness_interval());
        let dtcs = DtcAggregator::new(config.bus, config.dtc_collection_window());
        Self {
            config,
            activity,
            dtcs,
            scheduler,
            controller,
        }
    }

    pub fn bus(&self) -> BusType {
        self.config.bus
    }

    pub fn config(&self) -> &BusMonitorConfig {
        &self.config
    }

    pub fn status(&self) -> BusStatus {
        self.activity.status()
    }

    pub fn is_communicating(&self) -> bool {
        self.activity.is_communicating()
    }

    pub fn is_checking_liveness(&self) -> bool {
        self.activity.is_checking()
    }

    pub fn is_collecting(&self) -> bool {
        self.dtcs.is_collecting()
    }

    pub fn pending_dtcs(&self) -> &[Dtc] {
        self.dtcs.pending()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    // =========================================================================
    // Bus activity
    // =========================================================================

    pub fn report_status(&mut self, status: BusStatus) {
        self.activity.report_status(status, self.controller.as_ref());
    }

    pub fn record_receive_activity(&mut self) {
        self.activity
            .record_receive_activity(self.controller.as_ref());
    }

    pub fn start_liveness_check(&mut self) {
        self.activity.start_liveness_check(&mut self.scheduler);
    }

    pub fn stop_liveness_check(&mut self) {
        self.activity.stop_liveness_check(&mut self.scheduler);
    }

    // =========================================================================
    // DTC collection
    // =========================================================================

    pub fn start_collecting(&mut self) -> bool {
        self.dtcs.start_collecting(&mut self.scheduler)
    }

    pub fn stop_collecting(&mut self) {
        self.dtcs.stop_collecting(&mut self.scheduler);
    }

    pub fn add_dtc(&mut self, dtc: impl Into<Option<Dtc>>) {
        self.dtcs.add(dtc);
    }

    /// Force an early end to the collection window
    pub fn flush(&mut self) -> DtcSnapshot {
        self.dtcs
            .flush(&mut self.scheduler, self.controller.as_ref())
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Dispatch an expired timer
    ///
    /// Returns the snapshot if the expiry closed a collection window.
    pub fn on_timer(&mut self, expiry: TimerExpiry) -> Option<DtcSnapshot> {
        match expiry.timer {
            TimerId::LivenessCheck => {
                self.activity.on_liveness_timer(
                    expiry.token,
                    &mut self.scheduler,
                    self.controller.as_ref(),
                );
                None
            }
            TimerId::DtcFlush => self.dtcs.on_flush_timer(
                expiry.token,
                &mut self.scheduler,
                self.controller.as_ref(),
            ),
        }
    }

    /// Cancel every timer this monitor holds
    pub fn shutdown(&mut self) {
        self.stop_liveness_check();
        self.stop_collecting();
        info!(bus = %self.config.bus, "Bus monitor stopped");
    }
}

impl BusMonitor<ManualScheduler> {
    /// Move the virtual clock forward, handling every timer that comes due
    /// (including ones rescheduled along the way)
    pub fn advance(&mut self, by: Duration) -> Vec<DtcSnapshot> {
        let until = self.scheduler.now() + by;
        let mut snapshots = Vec::new();
        while let Some(expiry) = self.scheduler.pop_due(until) {
            if let Some(snapshot) = self.on_timer(expiry) {
                snapshots.push(snapshot);
            }
        }
        self.scheduler.advance_to(until);
        snapshots
    }
}
