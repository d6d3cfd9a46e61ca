use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

use crate::models::EndpointProbe;
use crate::protocol::DEFAULT_PORT;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Port used for `--target` arguments that do not name one.
    pub default_port: u16,
    /// How long the worker waits for a datagram before re-checking its
    /// deadline and stop flag.
    pub poll_interval_ms: u64,
    /// Timeout budget granted per probe in a batch.
    pub timeout_per_probe_secs: u64,
    /// Local address the probe socket binds to.
    pub bind_addr: SocketAddr,
    pub worker_thread_name: String,
    pub log_level: String,
    pub targets: Vec<EndpointProbe>,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            poll_interval_ms: 100,
            timeout_per_probe_secs: 1,
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)),
            worker_thread_name: "qos-probe-worker".to_string(),
            log_level: "info".to_string(),
            targets: Vec::new(),
        }
    }
}

impl QosConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than zero".to_string());
        }
        if self.timeout_per_probe_secs == 0 {
            return Err("timeout_per_probe_secs must be greater than zero".to_string());
        }
        if let Some(t) = self.targets.iter().find(|t| t.host.trim().is_empty()) {
            return Err(format!("target '{}' has an empty host", t.label));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = QosConfig::default();
        assert_eq!(config.default_port, 3075);
        assert_eq!(config.poll_interval_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_intervals() {
        let config = QosConfig {
            poll_interval_ms: 0,
            ..QosConfig::default()
        };
        assert!(config.validate().is_err());

        let config = QosConfig {
            timeout_per_probe_secs: 0,
            ..QosConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_blank_host() {
        let config = QosConfig {
            targets: vec![EndpointProbe::new("eu", " ")],
            ..QosConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.contains("eu"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: QosConfig = toml::from_str(
            r#"
            poll_interval_ms = 50

            [[targets]]
            label = "local"
            host = "127.0.0.1"
            use_literal_address = true
            port = 4000
            "#,
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.timeout_per_probe_secs, 1);
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].port, 4000);
    }
}
