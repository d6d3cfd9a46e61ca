use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::DEFAULT_PORT;

/// Latency value of a probe that has not been measured (no reply yet, or the
/// batch timed out before one arrived).
pub const UNMEASURED_LATENCY_MS: i32 = -1;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_latency() -> i32 {
    UNMEASURED_LATENCY_MS
}

// ─── Endpoint ──────────────────────────────────────────────

/// One endpoint to measure within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointProbe {
    /// Logical name used to correlate results (e.g. a region).
    pub label: String,
    /// Hostname or literal address.
    pub host: String,
    /// `host` is already an address, skip DNS resolution.
    #[serde(default)]
    pub use_literal_address: bool,
    #[serde(default, skip_deserializing)]
    pub resolved_address: Option<IpAddr>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_latency", skip_deserializing)]
    pub latency_ms: i32,
}

impl EndpointProbe {
    /// Probe a hostname that needs resolving.
    pub fn new(label: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            host: host.into(),
            use_literal_address: false,
            resolved_address: None,
            port: DEFAULT_PORT,
            latency_ms: UNMEASURED_LATENCY_MS,
        }
    }

    /// Probe an address given literally.
    pub fn literal(label: impl Into<String>, addr: IpAddr) -> Self {
        Self {
            use_literal_address: true,
            ..Self::new(label, addr.to_string())
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Whether a reply was recorded for this probe.
    pub fn is_measured(&self) -> bool {
        self.latency_ms >= 0
    }
}

// ─── Batch Report ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Every probe received a reply before the deadline.
    AllReplied,
    /// The deadline passed with some probes still pending.
    TimedOut,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllReplied => write!(f, "all endpoints replied"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of one probe run, delivered once when the run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub reason: FinishReason,
    /// Probes in the order they were submitted. Unanswered ones keep
    /// [`UNMEASURED_LATENCY_MS`].
    pub probes: Vec<EndpointProbe>,
}

impl BatchReport {
    pub fn new(run_id: Uuid, reason: FinishReason, probes: Vec<EndpointProbe>) -> Self {
        Self {
            run_id,
            finished_at: Utc::now(),
            reason,
            probes,
        }
    }

    pub fn reachable(&self) -> impl Iterator<Item = &EndpointProbe> {
        self.probes.iter().filter(|p| p.is_measured())
    }

    /// The measured probe with the lowest latency, first one wins on ties.
    pub fn fastest(&self) -> Option<&EndpointProbe> {
        self.reachable()
            .fold(None, |best: Option<&EndpointProbe>, p| match best {
                Some(b) if b.latency_ms <= p.latency_ms => Some(b),
                _ => Some(p),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn measured(label: &str, latency_ms: i32) -> EndpointProbe {
        let mut probe = EndpointProbe::new(label, "example.invalid");
        probe.latency_ms = latency_ms;
        probe
    }

    #[test]
    fn new_probe_defaults() {
        let probe = EndpointProbe::new("eu-west", "eu.example.com");
        assert_eq!(probe.port, DEFAULT_PORT);
        assert_eq!(probe.latency_ms, UNMEASURED_LATENCY_MS);
        assert!(!probe.use_literal_address);
        assert!(probe.resolved_address.is_none());
        assert!(!probe.is_measured());
    }

    #[test]
    fn literal_probe_keeps_address_text() {
        let probe = EndpointProbe::literal("local", IpAddr::V4(Ipv4Addr::LOCALHOST)).with_port(9000);
        assert!(probe.use_literal_address);
        assert_eq!(probe.host, "127.0.0.1");
        assert_eq!(probe.port, 9000);
    }

    #[test]
    fn fastest_skips_unmeasured() {
        let report = BatchReport::new(
            Uuid::new_v4(),
            FinishReason::TimedOut,
            vec![
                measured("a", -1),
                measured("b", 40),
                measured("c", 12),
                measured("d", 12),
            ],
        );
        assert_eq!(report.fastest().map(|p| p.label.as_str()), Some("c"));
        assert_eq!(report.reachable().count(), 3);
    }

    #[test]
    fn fastest_none_when_nothing_replied() {
        let report = BatchReport::new(Uuid::new_v4(), FinishReason::TimedOut, vec![measured("a", -1)]);
        assert!(report.fastest().is_none());
    }

    #[test]
    fn deserialized_probe_starts_unmeasured() {
        let probe: EndpointProbe =
            toml::from_str("label = \"us\"\nhost = \"us.example.com\"\nlatency_ms = 5\n").unwrap();
        assert_eq!(probe.port, DEFAULT_PORT);
        assert_eq!(probe.latency_ms, UNMEASURED_LATENCY_MS);
    }
}
