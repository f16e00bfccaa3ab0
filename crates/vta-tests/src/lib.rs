//! Integration tests for the vehicle telemetry agent
//!
//! End-to-end tests across crate boundaries:
//! - Datagram transport against loopback peers
//! - Bus monitors feeding the engine controller
//!
//! # Running Tests
//!
//! Transport tests bind real UDP sockets on loopback and are serialized:
//!
//! ```bash
//! cargo test -p vta-tests
//! ```
//!
//! # Test Structure
//!
//! - `transport_e2e.rs` - Queue ordering, start/stop lifecycle, failures
//! - `monitor_e2e.rs` - Liveness and DTC windows driving engine events
//! - `relay_e2e.rs` - Engine events sent as JSON envelopes to a loopback peer

// This crate only contains tests, no library code
