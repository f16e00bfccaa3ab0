//! Datagram transport configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Datagram transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdpConfig {
    /// Label used in logs and as the worker thread name
    #[serde(default = "default_name")]
    pub name: String,
    /// Local port to bind on all interfaces
    pub local_port: u16,
    /// Remote host name or IP address
    pub remote_address: String,
    /// Remote port
    pub remote_port: u16,
    /// Socket receive timeout in milliseconds (one worker poll cycle)
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_ms: u64,
    /// Largest datagram accepted; longer ones are truncated
    #[serde(default = "default_max_datagram_len")]
    pub max_datagram_len: usize,
    /// Outbound envelopes sent per worker cycle (0 = drain the whole queue)
    #[serde(default)]
    pub max_sends_per_cycle: usize,
}

impl UdpConfig {
    pub fn new(local_port: u16, remote_address: impl Into<String>, remote_port: u16) -> Self {
        Self {
            name: default_name(),
            local_port,
            remote_address: remote_address.into(),
            remote_port,
            receive_timeout_ms: default_receive_timeout(),
            max_datagram_len: default_max_datagram_len(),
            max_sends_per_cycle: 0,
        }
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms.max(1))
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self::new(0, "127.0.0.1", 0)
    }
}

fn default_name() -> String {
    "udp".to_string()
}

fn default_receive_timeout() -> u64 {
    50
}

fn default_max_datagram_len() -> usize {
    512
}
