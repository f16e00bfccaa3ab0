//! Agent wiring and run loop
//!
//! Ties the bus monitors, the engine controller and the server link
//! together. Engine events go out as JSON envelopes; the poll loop keeps the
//! link up and reopens DTC collection windows.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use vta_bus::{spawn_monitor, BusMonitorHandle, EngineController, EngineEvent, MockBusDriver};
use vta_udp::{DatagramTransport, Envelope, TransportStats};

use crate::config::AgentConfig;

/// Poll step while waiting on the transport during shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

struct MonitorSlot {
    handle: BusMonitorHandle,
    task: JoinHandle<()>,
    driver: Option<JoinHandle<()>>,
}

/// Running agent
pub struct Agent {
    config: AgentConfig,
    engine: Arc<EngineController>,
    transport: Arc<DatagramTransport>,
    monitors: Vec<MonitorSlot>,
    forwarder: JoinHandle<()>,
    /// Transport counters when the link was last (re)started
    stats_at_start: TransportStats,
    /// Consecutive workers that died on a send without delivering anything
    failed_attempts: u32,
}

impl Agent {
    /// Start every component. Must be called from within a tokio runtime.
    pub fn start(config: AgentConfig) -> Self {
        let engine = Arc::new(EngineController::new(config.engine.clone()));
        let transport = Arc::new(DatagramTransport::from_config(&config.server));

        let forwarder = spawn_event_forwarder(&engine, transport.clone());

        let mut monitors = Vec::with_capacity(config.bus.len());
        for entry in &config.bus {
            let (handle, task) = spawn_monitor(entry.monitor.clone(), engine.clone());
            // The task is freshly spawned, so these only fail if it panicked
            if let Err(e) = handle.start_liveness_check() {
                warn!(error = %e, "Could not start liveness check");
            }
            let driver = entry
                .mock
                .clone()
                .map(|mock| MockBusDriver::new(mock, handle.clone()).spawn());
            info!(bus = %entry.monitor.bus, mock = driver.is_some(), "Monitoring bus");
            monitors.push(MonitorSlot {
                handle,
                task,
                driver,
            });
        }

        if !transport.start_configured() {
            warn!(transport = %transport.name(), "Server link did not start, will retry");
        }

        Self {
            config,
            engine,
            transport,
            monitors,
            forwarder,
            stats_at_start: TransportStats::default(),
            failed_attempts: 0,
        }
    }

    pub fn engine(&self) -> &Arc<EngineController> {
        &self.engine
    }

    pub fn transport(&self) -> &Arc<DatagramTransport> {
        &self.transport
    }

    /// Poll until `shutdown` completes, then stop everything
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => self.poll().await,
            }
        }

        self.shutdown().await;
    }

    /// One poll cycle
    pub async fn poll(&mut self) {
        if self.transport.has_stopped() {
            self.discard_stuck_envelope();
            warn!(transport = %self.transport.name(), "Server link down, restarting");
            self.stats_at_start = self.transport.stats();
            self.transport.start_configured();
        }

        while let Some(envelope) = self.transport.receive() {
            // Decoding server messages belongs to the codec layer
            debug!(len = envelope.len(), "Inbound envelope from server");
        }

        for slot in &self.monitors {
            match slot.handle.start_collecting().await {
                Ok(true) => debug!(bus = %slot.handle.bus(), "DTC collection window opened"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Monitor unavailable"),
            }
        }
    }

    /// Drop the outbound head once it has failed `max_send_attempts` workers
    /// in a row
    ///
    /// A worker that hit a send failure without delivering anything counts as
    /// one failed attempt on the head. Any delivery resets the count.
    fn discard_stuck_envelope(&mut self) {
        let stats = self.transport.stats();
        let failed = stats.send_failures > self.stats_at_start.send_failures
            && stats.datagrams_sent == self.stats_at_start.datagrams_sent;
        if !failed {
            self.failed_attempts = 0;
            return;
        }

        self.failed_attempts += 1;
        let limit = self.config.max_send_attempts;
        if limit == 0 || self.failed_attempts < limit {
            return;
        }

        if let Some(envelope) = self.transport.discard_outbound_head() {
            error!(
                len = envelope.len(),
                attempts = self.failed_attempts,
                "Dropping outbound envelope that keeps failing to send"
            );
        }
        self.failed_attempts = 0;
    }

    /// Stop monitors, give queued envelopes a chance to leave, then close the
    /// link
    pub async fn shutdown(self) {
        let Agent {
            config,
            engine,
            transport,
            monitors,
            forwarder,
            ..
        } = self;

        for slot in &monitors {
            let _ = slot.handle.shutdown();
        }
        for slot in monitors {
            let _ = slot.task.await;
            if let Some(driver) = slot.driver {
                let _ = driver.await;
            }
        }

        // Last engine reference; the forwarder ends once its channel closes
        let drain = Duration::from_millis(config.shutdown_drain_ms);
        drop(engine);
        if tokio::time::timeout(drain, forwarder).await.is_err() {
            warn!("Event forwarder still running at shutdown");
        }

        let deadline = Instant::now() + drain;
        while transport.has_pending_outbound() && !transport.has_stopped() {
            if Instant::now() >= deadline {
                warn!(
                    pending = transport.pending_outbound(),
                    "Outbound queue not drained before shutdown"
                );
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }

        transport.stop();
        let deadline = Instant::now() + drain;
        while !transport.has_stopped() && Instant::now() < deadline {
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }

        let stats = transport.stats();
        info!(
            sent = stats.datagrams_sent,
            received = stats.datagrams_received,
            stopped = transport.has_stopped(),
            "Agent stopped"
        );
    }
}

/// Forward engine events to the server link as JSON envelopes
fn spawn_event_forwarder(
    engine: &EngineController,
    transport: Arc<DatagramTransport>,
) -> JoinHandle<()> {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => forward_event(&transport, &event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Engine events dropped before forwarding");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Event forwarder stopped");
    })
}

fn forward_event(transport: &DatagramTransport, event: &EngineEvent) {
    match serde_json::to_vec(event) {
        Ok(payload) => {
            info!(bus = %event.bus(), code = event.code(), ?event, "Forwarding engine event");
            transport.send(Envelope::from(payload));
        }
        Err(e) => warn!(error = %e, "Could not encode engine event"),
    }
}
