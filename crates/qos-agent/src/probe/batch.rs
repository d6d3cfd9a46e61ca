use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

use qos_common::models::EndpointProbe;

/// Working state of one probe run.
///
/// Probes start out pending and move to completed either when a reply from
/// their resolved address arrives, or at finalization when whatever is still
/// pending is reported unmeasured. A slot can only complete once.
#[derive(Debug)]
pub struct ProbeBatch {
    probes: Vec<EndpointProbe>,
    /// Resolved address → pending slots, in send order.
    pending: HashMap<IpAddr, VecDeque<usize>>,
    completed: Vec<bool>,
    remaining: usize,
    timeout: Duration,
}

impl ProbeBatch {
    pub fn new(probes: Vec<EndpointProbe>, timeout: Duration) -> Self {
        let completed = vec![false; probes.len()];
        let remaining = probes.len();
        Self {
            probes,
            pending: HashMap::new(),
            completed,
            remaining,
            timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn probes_mut(&mut self) -> impl Iterator<Item = &mut EndpointProbe> {
        self.probes.iter_mut()
    }

    pub fn probes(&self) -> &[EndpointProbe] {
        &self.probes
    }

    /// Rebuild the address index from the probes' resolved addresses.
    ///
    /// Unresolved probes stay pending but can never be matched.
    pub fn index_pending(&mut self) {
        self.pending.clear();
        for (slot, probe) in self.probes.iter().enumerate() {
            if self.completed[slot] {
                continue;
            }
            if let Some(ip) = probe.resolved_address {
                self.pending.entry(canonical(ip)).or_default().push_back(slot);
            }
        }
    }

    /// Record a valid reply from `from`, measured against `sent_at`.
    ///
    /// Returns the completed probe, or `None` when no pending probe has that
    /// address (unknown sender or duplicate reply).
    pub fn record_reply(&mut self, from: IpAddr, sent_at: Instant, now: Instant) -> Option<&EndpointProbe> {
        let from = canonical(from);
        let slots = self.pending.get_mut(&from)?;
        let slot = slots.pop_front()?;
        if slots.is_empty() {
            self.pending.remove(&from);
        }

        self.completed[slot] = true;
        self.remaining -= 1;

        let probe = &mut self.probes[slot];
        probe.latency_ms = round_trip_ms(now.saturating_duration_since(sent_at));
        Some(probe)
    }

    /// Every probe has a reply.
    pub fn is_satisfied(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Deadline check in whole seconds since the shared send timestamp.
    pub fn is_expired(&self, sent_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(sent_at).as_secs() >= self.timeout.as_secs()
    }

    /// Close the batch. Probes still pending keep their unmeasured latency.
    pub fn into_probes(self) -> Vec<EndpointProbe> {
        self.probes
    }
}

/// IPv4-mapped IPv6 peers (seen on dual-stack sockets) compare as IPv4.
fn canonical(ip: IpAddr) -> IpAddr {
    ip.to_canonical()
}

fn round_trip_ms(rtt: Duration) -> i32 {
    let ms = (rtt.as_secs_f64() * 1000.0).round();
    ms.min(i32::MAX as f64) as i32
}
