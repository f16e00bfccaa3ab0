//! vta-bus - Bus liveness monitoring and DTC aggregation
//!
//! This crate contains the protocol-independent half of a vehicle bus driver:
//! deciding whether the bus is alive, and collecting the fault codes its
//! nodes report into one deduplicated snapshot per collection window.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 BusMonitorHandle (any task)                │
//! └──────────────────────────┬─────────────────────────────────┘
//!                            │ commands (mpsc)
//! ┌──────────────────────────┴─────────────────────────────────┐
//! │                  monitor task (runner)                     │
//! │  ┌──────────────────────────────────────────────────────┐  │
//! │  │                    BusMonitor<S>                     │  │
//! │  │  ┌─────────────────┐        ┌─────────────────────┐  │  │
//! │  │  │ActivityMonitor  │        │DtcAggregator        │  │  │
//! │  │  │(liveness, 1 s)  │        │(window, 20 s)       │  │  │
//! │  │  └────────┬────────┘        └──────────┬──────────┘  │  │
//! │  └───────────┼────────────────────────────┼─────────────┘  │
//! │              │    Scheduler (timers)      │                │
//! └──────────────┼────────────────────────────┼────────────────┘
//!                └──────────┬─────────────────┘
//!                   ┌───────┴────────┐
//!                   │ BusController  │
//!                   │ (engine)       │
//!                   └────────────────┘
//! ```

pub mod activity;
pub mod config;
pub mod dtc;
pub mod engine;
pub mod error;
pub mod mock;
pub mod monitor;
pub mod runner;
pub mod scheduler;
pub mod testing;

pub use activity::ActivityMonitor;
pub use config::{BusMonitorConfig, EngineConfig, MockBusConfig};
pub use dtc::{DtcAggregator, DtcSnapshot};
pub use engine::{EngineController, EngineEvent};
pub use error::MonitorError;
pub use mock::MockBusDriver;
pub use monitor::BusMonitor;
pub use runner::{spawn_monitor, BusMonitorHandle, MonitorState};
pub use scheduler::{ManualScheduler, TimerExpiry, TokioScheduler};

// Re-export for convenience
pub use vta_core::{
    BusController, BusStatus, BusType, Dtc, DtcChangeSummary, Scheduler, TimerId, TimerToken,
};
