//! vta-udp - Datagram transport for the vehicle telemetry agent
//!
//! Moves already-encoded messages over an unreliable two-way UDP channel.
//! Callers on any thread enqueue outbound envelopes and dequeue inbound ones
//! without blocking; a dedicated worker thread per transport does the socket
//! I/O.
//!
//! # Example
//!
//! ```ignore
//! use vta_udp::{DatagramTransport, Envelope};
//!
//! let transport = DatagramTransport::new("server");
//! if transport.start(5000, "10.0.0.5", 6000) {
//!     transport.send(Envelope::copy_from_slice(b"hello"));
//! }
//! while let Some(reply) = transport.receive() {
//!     // hand to the codec
//! }
//! transport.stop();
//! ```

pub mod config;
pub mod error;
pub mod transport;
mod worker;

pub use config::UdpConfig;
pub use error::TransportError;
pub use transport::{DatagramTransport, TransportStats};

// Re-export for convenience
pub use vta_core::Envelope;
