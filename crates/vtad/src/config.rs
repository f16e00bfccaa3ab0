//! Agent configuration
//!
//! One TOML file describes the upstream server link, the engine controller
//! and every monitored bus. Buses with a `mock` table get a simulated driver.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use vta_bus::{BusMonitorConfig, BusType, EngineConfig, MockBusConfig};
use vta_udp::UdpConfig;

/// Complete agent configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Datagram link to the remote server
    #[serde(default = "default_server")]
    pub server: UdpConfig,

    /// Engine controller settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Agent poll period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long shutdown waits for queued outbound envelopes, in milliseconds
    #[serde(default = "default_shutdown_drain")]
    pub shutdown_drain_ms: u64,

    /// Link restarts in a row that may fail on the same outbound envelope
    /// before it is dropped (0 keeps it forever)
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,

    /// Monitored buses
    #[serde(default)]
    pub bus: Vec<BusEntry>,
}

/// One monitored bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEntry {
    #[serde(flatten)]
    pub monitor: BusMonitorConfig,

    /// Simulated driver for this bus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mock: Option<MockBusConfig>,
}

fn default_server() -> UdpConfig {
    UdpConfig {
        name: "server".to_string(),
        ..UdpConfig::new(5000, "127.0.0.1", 6000)
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_shutdown_drain() -> u64 {
    2000
}

fn default_max_send_attempts() -> u32 {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            engine: EngineConfig::default(),
            poll_interval_ms: default_poll_interval(),
            shutdown_drain_ms: default_shutdown_drain(),
            max_send_attempts: default_max_send_attempts(),
            bus: Vec::new(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AgentConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Demo setup used when no config file is given: two mock buses, one of
    /// which goes quiet after a minute
    pub fn demo() -> Self {
        Self {
            bus: vec![
                BusEntry {
                    monitor: BusMonitorConfig::new(BusType::J1939At250k),
                    mock: Some(MockBusConfig {
                        dtcs: vec![0x0006_6E04, 0x0000_6403],
                        ..MockBusConfig::default()
                    }),
                },
                BusEntry {
                    monitor: BusMonitorConfig::new(BusType::J1587),
                    mock: Some(MockBusConfig {
                        dtcs: vec![0x0000_BE03],
                        silent_after_ms: Some(60_000),
                        ..MockBusConfig::default()
                    }),
                },
            ],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = Vec::new();
        for entry in &self.bus {
            let bus = entry.monitor.bus;
            if bus == BusType::None {
                anyhow::bail!("Bus entry with type NONE cannot be monitored");
            }
            if entry.monitor.liveness_interval_ms == 0 {
                anyhow::bail!("Bus {}: liveness_interval_ms must be greater than zero", bus);
            }
            if entry.monitor.dtc_collection_ms == 0 {
                anyhow::bail!("Bus {}: dtc_collection_ms must be greater than zero", bus);
            }
            if seen.contains(&bus) {
                anyhow::bail!("Bus {} configured more than once", bus);
            }
            seen.push(bus);
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_load_full_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            poll_interval_ms = 500

            [server]
            name = "uplink"
            local_port = 5001
            remote_address = "10.0.0.5"
            remote_port = 6000

            [engine]
            dtc_removal_count = 5

            [[bus]]
            bus = "j1939_500"
            dtc_collection_ms = 10000

            [[bus]]
            bus = "j1587"
            [bus.mock]
            dtcs = [48643]
            silent_after_ms = 30000
            "#
        )
        .unwrap();

        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.shutdown_drain_ms, 2000);
        assert_eq!(config.max_send_attempts, 3);
        assert_eq!(config.server.name, "uplink");
        assert_eq!(config.server.remote_port, 6000);
        assert_eq!(config.engine.dtc_removal_count, 5);
        assert_eq!(config.bus.len(), 2);

        let j1939 = &config.bus[0];
        assert_eq!(j1939.monitor.bus, BusType::J1939At500k);
        assert_eq!(j1939.monitor.dtc_collection_ms, 10000);
        assert_eq!(j1939.monitor.liveness_interval_ms, 1000);
        assert!(j1939.mock.is_none());

        let mock = config.bus[1].mock.as_ref().unwrap();
        assert_eq!(mock.dtcs, vec![48643]);
        assert_eq!(mock.silent_after_ms, Some(30000));
        assert_eq!(mock.rx_interval_ms, 200);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = AgentConfig::load(file.path()).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.server.local_port, 5000);
    }

    #[test]
    fn test_duplicate_bus_rejected() {
        let mut config = AgentConfig::demo();
        config.bus.push(config.bus[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_bus_intervals_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [[bus]]
            bus = "j1587"
            liveness_interval_ms = 0
            "#
        )
        .unwrap();
        let err = AgentConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("liveness_interval_ms"));

        let mut config = AgentConfig::demo();
        config.bus[1].monitor.dtc_collection_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dtc_collection_ms"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_demo_is_valid() {
        let config = AgentConfig::demo();
        config.validate().unwrap();
        assert!(config.bus.iter().all(|b| b.mock.is_some()));
    }
}
