//! Engine controller
//!
//! Consumes bus liveness and DTC snapshots from every bus monitor, keeps the
//! vehicle-wide view (which buses are communicating, which codes are
//! current) and turns changes in the current code set into fault events.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};
use vta_core::{BusController, BusType, DtcChangeSummary};

use crate::config::EngineConfig;

/// Fault code transition raised by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// Code became current on a bus
    FaultCodeOn { bus: BusType, code: u64 },
    /// Code has been absent from enough consecutive snapshots to be dropped
    FaultCodeOff { bus: BusType, code: u64 },
}

impl EngineEvent {
    pub fn bus(&self) -> BusType {
        match self {
            EngineEvent::FaultCodeOn { bus, .. } | EngineEvent::FaultCodeOff { bus, .. } => *bus,
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            EngineEvent::FaultCodeOn { code, .. } | EngineEvent::FaultCodeOff { code, .. } => *code,
        }
    }

    /// Five byte event data: bus identifier, then the low 32 bits of the code
    /// little-endian
    pub fn data(&self) -> [u8; 5] {
        let code = (self.code() as u32).to_le_bytes();
        [self.bus().raw(), code[0], code[1], code[2], code[3]]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CurrentDtc {
    bus: BusType,
    code: u64,
    /// Consecutive snapshots this code was missing from
    removal_count: u32,
}

#[derive(Debug, Default)]
struct EngineState {
    buses_communicating: u8,
    current_dtcs: Vec<CurrentDtc>,
}

/// Vehicle-wide bus and fault code tracker
pub struct EngineController {
    config: EngineConfig,
    state: Mutex<EngineState>,
    events_tx: broadcast::Sender<EngineEvent>,
}

impl EngineController {
    pub fn new(config: EngineConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            state: Mutex::new(EngineState::default()),
            events_tx,
        }
    }

    /// Receive fault events raised from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    /// Bit mask of communicating buses (see [`BusType::mask`])
    pub fn buses_communicating(&self) -> u8 {
        self.state.lock().buses_communicating
    }

    pub fn is_bus_communicating(&self, bus: BusType) -> bool {
        bus != BusType::None && self.buses_communicating() & bus.mask() != 0
    }

    /// Current codes as `(bus, code)` pairs, oldest first
    pub fn current_dtcs(&self) -> Vec<(BusType, u64)> {
        self.state
            .lock()
            .current_dtcs
            .iter()
            .map(|d| (d.bus, d.code))
            .collect()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }
}

impl BusController for EngineController {
    fn set_bus_communicating(&self, bus: BusType) {
        let mut state = self.state.lock();
        if state.buses_communicating & bus.mask() == 0 {
            info!(%bus, "Bus communicating");
        }
        state.buses_communicating |= bus.mask();
    }

    fn clear_bus_communicating(&self, bus: BusType) {
        let mut state = self.state.lock();
        if state.buses_communicating & bus.mask() != 0 {
            info!(%bus, "Bus no longer communicating");
        }
        state.buses_communicating &= !bus.mask();
    }

    fn check_dtcs(&self, bus: BusType, codes: &[u64]) -> DtcChangeSummary {
        let mut events = Vec::new();
        let mut summary = DtcChangeSummary::default();

        {
            let mut state = self.state.lock();
            let removal_count = self.config.dtc_removal_count;

            // Deletions: codes for this bus missing from the snapshot
            state.current_dtcs.retain_mut(|current| {
                if current.bus != bus || codes.contains(&current.code) {
                    return true;
                }
                current.removal_count += 1;
                if current.removal_count < removal_count {
                    return true;
                }
                debug!(%bus, code = format!("0x{:08X}", current.code), "Removing DTC from current set");
                events.push(EngineEvent::FaultCodeOff {
                    bus,
                    code: current.code,
                });
                summary.removed += 1;
                false
            });

            // Additions: codes in the snapshot not yet current
            for &code in codes {
                match state
                    .current_dtcs
                    .iter_mut()
                    .find(|c| c.bus == bus && c.code == code)
                {
                    Some(current) => current.removal_count = 0,
                    None => {
                        debug!(%bus, code = format!("0x{:08X}", code), "Adding DTC to current set");
                        state.current_dtcs.push(CurrentDtc {
                            bus,
                            code,
                            removal_count: 0,
                        });
                        events.push(EngineEvent::FaultCodeOn { bus, code });
                        summary.added += 1;
                    }
                }
            }
        }

        if summary.is_change() {
            info!(%bus, added = summary.added, removed = summary.removed, "Current DTCs changed");
        }
        for event in events {
            self.emit(event);
        }
        summary
    }
}
