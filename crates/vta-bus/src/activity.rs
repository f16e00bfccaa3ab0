//! Bus activity (liveness) monitoring
//!
//! Tracks the status of one bus and demotes it from `Up` to `UpNoComm` when a
//! whole liveness period passes without any receive activity.

use std::time::Duration;

use tracing::{debug, info, trace};
use vta_core::{BusController, BusStatus, BusType, Scheduler, TimerId, TimerToken};

/// Liveness tracking for one bus
#[derive(Debug)]
pub struct ActivityMonitor {
    bus: BusType,
    status: BusStatus,
    /// Set by receive activity, cleared at the end of every liveness tick
    recent_rx: bool,
    interval: Duration,
    check_token: Option<TimerToken>,
}

impl ActivityMonitor {
    pub fn new(bus: BusType, interval: Duration) -> Self {
        Self {
            bus,
            status: BusStatus::Idle,
            recent_rx: false,
            interval,
            check_token: None,
        }
    }

    pub fn bus(&self) -> BusType {
        self.bus
    }

    pub fn status(&self) -> BusStatus {
        self.status
    }

    /// Is this bus up and communicating?
    pub fn is_communicating(&self) -> bool {
        self.status.is_communicating()
    }

    /// Whether receive activity was seen since the last liveness tick
    pub fn has_recent_rx(&self) -> bool {
        self.recent_rx
    }

    /// Whether the periodic liveness check is scheduled
    pub fn is_checking(&self) -> bool {
        self.check_token.is_some()
    }

    /// Set the bus status and tell the controller whether the bus is communicating
    ///
    /// The controller is notified on every call, even when the status does
    /// not change.
    pub fn report_status(&mut self, status: BusStatus, controller: &dyn BusController) {
        let previous = std::mem::replace(&mut self.status, status);
        if previous != status {
            debug!(bus = %self.bus, from = %previous, to = %status, "Bus status changed");
        }

        if self.bus == BusType::None {
            return;
        }

        if status.is_communicating() {
            controller.set_bus_communicating(self.bus);
        } else {
            controller.clear_bus_communicating(self.bus);
        }
    }

    /// Remember that something was received on the bus
    pub fn record_receive_activity(&mut self, controller: &dyn BusController) {
        self.recent_rx = true;
        if self.status == BusStatus::UpNoComm {
            info!(bus = %self.bus, "Bus activity resumed");
            self.report_status(BusStatus::Up, controller);
        }
    }

    /// Start the periodic liveness check, replacing any check already scheduled
    pub fn start_liveness_check(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(token) = self.check_token.take() {
            scheduler.cancel(token);
        }
        self.check_token = Some(scheduler.schedule_after(self.interval, TimerId::LivenessCheck));
    }

    pub fn stop_liveness_check(&mut self, scheduler: &mut dyn Scheduler) {
        if let Some(token) = self.check_token.take() {
            scheduler.cancel(token);
        }
    }

    /// Handle expiry of the liveness timer
    ///
    /// Runs one tick and schedules the next. Returns `false` if `token` is not
    /// the currently scheduled check (stale expiry after a stop or restart).
    pub fn on_liveness_timer(
        &mut self,
        token: TimerToken,
        scheduler: &mut dyn Scheduler,
        controller: &dyn BusController,
    ) -> bool {
        if self.check_token != Some(token) {
            trace!(bus = %self.bus, %token, "Ignoring stale liveness timer");
            return false;
        }

        self.tick(controller);
        self.check_token = Some(scheduler.schedule_after(self.interval, TimerId::LivenessCheck));
        true
    }

    /// One liveness check: demote an `Up` bus that has been silent for the
    /// whole period, then start a new period
    pub fn tick(&mut self, controller: &dyn BusController) {
        if !self.recent_rx && self.status == BusStatus::Up {
            info!(bus = %self.bus, "No bus activity in the last period");
            self.report_status(BusStatus::UpNoComm, controller);
        }
        self.recent_rx = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::testing::RecordingController;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn monitor() -> ActivityMonitor {
        ActivityMonitor::new(BusType::J1939At250k, Duration::from_millis(1000))
    }

    #[test]
    fn test_report_status_notifies_controller() {
        let ctl = RecordingController::default();
        let mut mon = monitor();

        mon.report_status(BusStatus::Up, &ctl);
        assert!(mon.is_communicating());
        mon.report_status(BusStatus::Failed, &ctl);
        assert!(!mon.is_communicating());

        assert_eq!(
            ctl.calls(),
            vec![
                "set J1939-250".to_string(),
                "clear J1939-250".to_string()
            ]
        );
    }

    #[test]
    fn test_repeated_status_is_reported_each_time() {
        let ctl = RecordingController::default();
        let mut mon = monitor();

        mon.report_status(BusStatus::Up, &ctl);
        mon.report_status(BusStatus::Up, &ctl);
        assert_eq!(ctl.calls().len(), 2);
    }

    #[test]
    fn test_bus_type_none_never_notifies() {
        let ctl = RecordingController::default();
        let mut mon = ActivityMonitor::new(BusType::None, Duration::from_millis(1000));

        mon.report_status(BusStatus::Up, &ctl);
        assert!(mon.is_communicating());
        assert!(ctl.calls().is_empty());
    }

    #[test]
    fn test_silent_period_demotes_up_bus() {
        let ctl = RecordingController::default();
        let mut mon = monitor();
        mon.report_status(BusStatus::Up, &ctl);

        mon.tick(&ctl);
        assert_eq!(mon.status(), BusStatus::UpNoComm);
        assert!(!mon.is_communicating());
    }

    #[test]
    fn test_single_activity_prevents_demotion() {
        let ctl = RecordingController::default();
        let mut mon = monitor();
        mon.report_status(BusStatus::Up, &ctl);

        mon.record_receive_activity(&ctl);
        mon.tick(&ctl);
        assert_eq!(mon.status(), BusStatus::Up);
        assert!(!mon.has_recent_rx(), "tick always clears the activity flag");

        // Next period is silent again
        mon.tick(&ctl);
        assert_eq!(mon.status(), BusStatus::UpNoComm);
    }

    #[rstest]
    #[case::idle(BusStatus::Idle, BusStatus::Idle)]
    #[case::discovering(BusStatus::Discovering, BusStatus::Discovering)]
    #[case::claiming(BusStatus::ClaimingAddress, BusStatus::ClaimingAddress)]
    #[case::up(BusStatus::Up, BusStatus::UpNoComm)]
    #[case::up_no_comm(BusStatus::UpNoComm, BusStatus::UpNoComm)]
    #[case::failed(BusStatus::Failed, BusStatus::Failed)]
    fn test_silent_period_only_demotes_from_up(
        #[case] before: BusStatus,
        #[case] after: BusStatus,
    ) {
        let ctl = RecordingController::default();
        let mut mon = monitor();

        mon.report_status(before, &ctl);
        mon.tick(&ctl);
        assert_eq!(mon.status(), after);
    }

    #[test]
    fn test_one_activity_restores_up() {
        let ctl = RecordingController::default();
        let mut mon = monitor();
        mon.report_status(BusStatus::Up, &ctl);
        mon.tick(&ctl);
        assert_eq!(mon.status(), BusStatus::UpNoComm);

        mon.record_receive_activity(&ctl);
        assert_eq!(mon.status(), BusStatus::Up);
        assert_eq!(ctl.calls().last().unwrap(), "set J1939-250");
    }

    #[test]
    fn test_activity_does_not_bring_up_an_idle_bus() {
        let ctl = RecordingController::default();
        let mut mon = monitor();

        mon.record_receive_activity(&ctl);
        assert_eq!(mon.status(), BusStatus::Idle);
        assert!(ctl.calls().is_empty());
    }

    #[test]
    fn test_liveness_timer_reschedules_itself() {
        let ctl = RecordingController::default();
        let mut sched = ManualScheduler::new();
        let mut mon = monitor();
        mon.report_status(BusStatus::Up, &ctl);
        mon.start_liveness_check(&mut sched);

        let expired = sched.advance(Duration::from_millis(1000));
        assert_eq!(expired.len(), 1);
        assert!(mon.on_liveness_timer(expired[0].token, &mut sched, &ctl));
        assert_eq!(mon.status(), BusStatus::UpNoComm);
        assert!(sched.is_pending(TimerId::LivenessCheck));
    }

    #[test]
    fn test_stale_liveness_timer_is_ignored() {
        let ctl = RecordingController::default();
        let mut sched = ManualScheduler::new();
        let mut mon = monitor();
        mon.report_status(BusStatus::Up, &ctl);
        mon.start_liveness_check(&mut sched);

        let expired = sched.advance(Duration::from_millis(1000));
        mon.stop_liveness_check(&mut sched);

        assert!(!mon.on_liveness_timer(expired[0].token, &mut sched, &ctl));
        assert_eq!(mon.status(), BusStatus::Up);
        assert_eq!(sched.pending_count(), 0);
    }

    #[test]
    fn test_restart_replaces_pending_check() {
        let mut sched = ManualScheduler::new();
        let mut mon = monitor();

        mon.start_liveness_check(&mut sched);
        mon.start_liveness_check(&mut sched);
        assert_eq!(sched.pending_count(), 1);
    }
}
