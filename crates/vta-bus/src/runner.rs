//! Monitor task
//!
//! Runs a [`BusMonitor`] on its own tokio task so that timer expiries and
//! driver reports are applied one at a time, in arrival order. Everything
//! else talks to the monitor through a cloneable [`BusMonitorHandle`].

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use vta_core::{BusController, BusStatus, BusType, Dtc};

use crate::config::BusMonitorConfig;
use crate::dtc::DtcSnapshot;
use crate::error::MonitorError;
use crate::monitor::BusMonitor;
use crate::scheduler::TokioScheduler;

/// Point-in-time view of a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorState {
    pub bus: BusType,
    pub status: BusStatus,
    pub checking_liveness: bool,
    pub collecting: bool,
    pub pending_dtcs: usize,
}

enum MonitorCommand {
    ReportStatus(BusStatus),
    ReceiveActivity,
    AddDtc(Dtc),
    StartLivenessCheck,
    StopLivenessCheck,
    StartCollecting(oneshot::Sender<bool>),
    StopCollecting,
    Flush(oneshot::Sender<DtcSnapshot>),
    Query(oneshot::Sender<MonitorState>),
    Shutdown,
}

/// Handle to a running monitor task
///
/// Reporting methods never block; they fail only once the task is gone.
#[derive(Clone)]
pub struct BusMonitorHandle {
    bus: BusType,
    commands: mpsc::UnboundedSender<MonitorCommand>,
    snapshots: broadcast::Sender<DtcSnapshot>,
}

impl BusMonitorHandle {
    pub fn bus(&self) -> BusType {
        self.bus
    }

    fn send(&self, cmd: MonitorCommand) -> Result<(), MonitorError> {
        self.commands
            .send(cmd)
            .map_err(|_| MonitorError::Closed(self.bus))
    }

    async fn request<T>(
        &self,
        cmd: impl FnOnce(oneshot::Sender<T>) -> MonitorCommand,
    ) -> Result<T, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.send(cmd(tx))?;
        rx.await.map_err(|_| MonitorError::Closed(self.bus))
    }

    pub fn report_status(&self, status: BusStatus) -> Result<(), MonitorError> {
        self.send(MonitorCommand::ReportStatus(status))
    }

    pub fn record_receive_activity(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::ReceiveActivity)
    }

    pub fn add_dtc(&self, dtc: Dtc) -> Result<(), MonitorError> {
        self.send(MonitorCommand::AddDtc(dtc))
    }

    pub fn start_liveness_check(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::StartLivenessCheck)
    }

    pub fn stop_liveness_check(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::StopLivenessCheck)
    }

    /// Open a collection window; `false` if one was already open
    pub async fn start_collecting(&self) -> Result<bool, MonitorError> {
        self.request(MonitorCommand::StartCollecting).await
    }

    pub fn stop_collecting(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::StopCollecting)
    }

    /// Force the current window to flush now
    pub async fn flush(&self) -> Result<DtcSnapshot, MonitorError> {
        self.request(MonitorCommand::Flush).await
    }

    pub async fn state(&self) -> Result<MonitorState, MonitorError> {
        self.request(MonitorCommand::Query).await
    }

    pub async fn status(&self) -> Result<BusStatus, MonitorError> {
        Ok(self.state().await?.status)
    }

    /// Receive every snapshot flushed from now on, timer-driven or forced
    pub fn subscribe(&self) -> broadcast::Receiver<DtcSnapshot> {
        self.snapshots.subscribe()
    }

    /// Cancel all timers and end the task
    pub fn shutdown(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::Shutdown)
    }
}

/// Spawn a monitor task for one bus
///
/// The task ends on [`BusMonitorHandle::shutdown`] or when every handle has
/// been dropped. Must be called from within a tokio runtime.
pub fn spawn_monitor(
    config: BusMonitorConfig,
    controller: Arc<dyn BusController>,
) -> (BusMonitorHandle, JoinHandle<()>) {
    let bus = config.bus;
    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, _) = broadcast::channel(64);
    let (scheduler, mut expired_rx) = TokioScheduler::new();

    let mut monitor = BusMonitor::new(config, scheduler, controller);
    let snapshots = snapshot_tx.clone();

    let handle = tokio::spawn(async move {
        info!(%bus, "Bus monitor started");
        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        debug!(%bus, "All monitor handles dropped");
                        break;
                    };
                    match cmd {
                        MonitorCommand::ReportStatus(status) => monitor.report_status(status),
                        MonitorCommand::ReceiveActivity => monitor.record_receive_activity(),
                        MonitorCommand::AddDtc(dtc) => monitor.add_dtc(dtc),
                        MonitorCommand::StartLivenessCheck => monitor.start_liveness_check(),
                        MonitorCommand::StopLivenessCheck => monitor.stop_liveness_check(),
                        MonitorCommand::StartCollecting(reply) => {
                            let _ = reply.send(monitor.start_collecting());
                        }
                        MonitorCommand::StopCollecting => monitor.stop_collecting(),
                        MonitorCommand::Flush(reply) => {
                            let snapshot = monitor.flush();
                            let _ = snapshots.send(snapshot.clone());
                            let _ = reply.send(snapshot);
                        }
                        MonitorCommand::Query(reply) => {
                            let _ = reply.send(MonitorState {
                                bus,
                                status: monitor.status(),
                                checking_liveness: monitor.is_checking_liveness(),
                                collecting: monitor.is_collecting(),
                                pending_dtcs: monitor.pending_dtcs().len(),
                            });
                        }
                        MonitorCommand::Shutdown => break,
                    }
                }
                Some(expiry) = expired_rx.recv() => {
                    if let Some(snapshot) = monitor.on_timer(expiry) {
                        let _ = snapshots.send(snapshot);
                    }
                }
            }
        }
        monitor.shutdown();
    });

    let monitor_handle = BusMonitorHandle {
        bus,
        commands: command_tx,
        snapshots: snapshot_tx,
    };
    (monitor_handle, handle)
}
