//! Bus monitor configuration
//!
//! Configuration for per-bus monitors, the engine controller and the mock
//! bus driver. All durations are carried as milliseconds so they read
//! naturally from TOML.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use vta_core::BusType;

// =============================================================================
// Bus Monitor Configuration
// =============================================================================

/// Configuration for one bus monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMonitorConfig {
    /// Which bus this monitor watches
    pub bus: BusType,
    /// Liveness check period in milliseconds
    #[serde(default = "default_liveness_interval")]
    pub liveness_interval_ms: u64,
    /// DTC collection window in milliseconds
    #[serde(default = "default_dtc_collection")]
    pub dtc_collection_ms: u64,
}

impl BusMonitorConfig {
    pub fn new(bus: BusType) -> Self {
        Self {
            bus,
            liveness_interval_ms: default_liveness_interval(),
            dtc_collection_ms: default_dtc_collection(),
        }
    }

    /// Liveness check period, never shorter than 1 ms
    pub fn liveness_interval(&self) -> Duration {
        Duration::from_millis(self.liveness_interval_ms.max(1))
    }

    /// DTC collection window, never shorter than 1 ms
    pub fn dtc_collection_window(&self) -> Duration {
        Duration::from_millis(self.dtc_collection_ms.max(1))
    }
}

impl Default for BusMonitorConfig {
    fn default() -> Self {
        Self::new(BusType::None)
    }
}

fn default_liveness_interval() -> u64 {
    1000
}

fn default_dtc_collection() -> u64 {
    20000
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Engine controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Consecutive snapshots a code must be missing from before it is dropped
    #[serde(default = "default_dtc_removal_count")]
    pub dtc_removal_count: u32,
    /// Capacity of the engine event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dtc_removal_count: default_dtc_removal_count(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_dtc_removal_count() -> u32 {
    3
}

fn default_event_capacity() -> usize {
    256
}

// =============================================================================
// Mock Bus Configuration
// =============================================================================

/// Mock bus driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockBusConfig {
    /// Interval between simulated receive events in milliseconds
    #[serde(default = "default_rx_interval")]
    pub rx_interval_ms: u64,
    /// Codes reported on every receive event
    #[serde(default)]
    pub dtcs: Vec<u64>,
    /// Report the bus as up when the driver starts
    #[serde(default = "default_true")]
    pub bring_up: bool,
    /// Stop producing receive activity after this many milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silent_after_ms: Option<u64>,
}

impl Default for MockBusConfig {
    fn default() -> Self {
        Self {
            rx_interval_ms: default_rx_interval(),
            dtcs: Vec::new(),
            bring_up: default_true(),
            silent_after_ms: None,
        }
    }
}

fn default_rx_interval() -> u64 {
    200
}

fn default_true() -> bool {
    true
}
