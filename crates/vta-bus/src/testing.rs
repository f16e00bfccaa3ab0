//! Test utilities for vta-bus
//!
//! Provides a [`BusController`] that records every call it receives, for
//! asserting on what a monitor reported.

use parking_lot::Mutex;
use vta_core::{BusController, BusType, DtcChangeSummary};

/// Controller that records calls as short strings
///
/// `check_dtcs` reports every code as added and returns that count.
#[derive(Debug, Default)]
pub struct RecordingController {
    calls: Mutex<Vec<String>>,
    snapshots: Mutex<Vec<(BusType, Vec<u64>)>>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls in the form `set <bus>`, `clear <bus>`, `dtcs <bus> <count>`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Every snapshot handed to `check_dtcs`, in order
    pub fn snapshots(&self) -> Vec<(BusType, Vec<u64>)> {
        self.snapshots.lock().clone()
    }
}

impl BusController for RecordingController {
    fn set_bus_communicating(&self, bus: BusType) {
        self.calls.lock().push(format!("set {}", bus));
    }

    fn clear_bus_communicating(&self, bus: BusType) {
        self.calls.lock().push(format!("clear {}", bus));
    }

    fn check_dtcs(&self, bus: BusType, codes: &[u64]) -> DtcChangeSummary {
        self.calls.lock().push(format!("dtcs {} {}", bus, codes.len()));
        self.snapshots.lock().push((bus, codes.to_vec()));
        DtcChangeSummary::new(codes.len() as u32, 0)
    }
}
