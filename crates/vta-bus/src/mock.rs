//! Mock bus driver for testing and demos
//!
//! Stands in for a protocol driver: brings the bus up, then periodically
//! reports receive activity and a fixed list of active fault codes.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use vta_core::{BusStatus, Dtc};

use crate::config::MockBusConfig;
use crate::error::MonitorError;
use crate::runner::BusMonitorHandle;

/// Encoded length reported for mock codes
const MOCK_DTC_ENCODED_LENGTH: u8 = 4;

/// Simulated bus driver feeding one monitor
pub struct MockBusDriver {
    config: MockBusConfig,
    monitor: BusMonitorHandle,
}

impl MockBusDriver {
    pub fn new(config: MockBusConfig, monitor: BusMonitorHandle) -> Self {
        Self { config, monitor }
    }

    /// Run the driver on its own task until the monitor goes away
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let bus = self.monitor.bus();
            if let Err(e) = self.run().await {
                debug!(%bus, error = %e, "Mock bus driver stopped");
            }
        })
    }

    async fn run(self) -> Result<(), MonitorError> {
        let bus = self.monitor.bus();
        let started = Instant::now();
        let silent_after = self.config.silent_after_ms.map(Duration::from_millis);
        let mut silent = false;

        if self.config.bring_up {
            self.monitor.report_status(BusStatus::Up)?;
            info!(%bus, "Mock bus up");
        }

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.rx_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if silent_after.is_some_and(|after| started.elapsed() >= after) {
                if !silent {
                    info!(%bus, "Mock bus going silent");
                    silent = true;
                }
                // Still probe so the task ends once the monitor is gone
                self.monitor.state().await?;
                continue;
            }

            self.monitor.record_receive_activity()?;
            for &code in &self.config.dtcs {
                self.monitor
                    .add_dtc(Dtc::new(code, 1, MOCK_DTC_ENCODED_LENGTH))?;
            }
        }
    }
}
