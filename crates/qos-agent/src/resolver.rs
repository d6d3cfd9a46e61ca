use std::net::IpAddr;

use qos_common::models::EndpointProbe;

/// Fill in `resolved_address` for a probe.
///
/// Literal probes are parsed, everything else goes through the system
/// resolver and takes the first address returned. Failure is logged and
/// leaves the probe unresolved.
pub fn resolve_probe(probe: &mut EndpointProbe) {
    probe.resolved_address = if probe.use_literal_address {
        match probe.host.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(_) => {
                tracing::warn!(label = %probe.label, host = %probe.host, "Literal address is not a valid IP");
                None
            }
        }
    } else {
        resolve_host(&probe.host)
    };

    tracing::debug!(
        label = %probe.label,
        host = %probe.host,
        resolved = ?probe.resolved_address,
        port = probe.port,
        "Resolved endpoint"
    );
}

/// Blocking forward lookup of a hostname.
pub fn resolve_host(host: &str) -> Option<IpAddr> {
    // Try parsing as IP first
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some(ip);
    }

    match dns_lookup::lookup_host(host) {
        Ok(addrs) => addrs.into_iter().next(),
        Err(e) => {
            tracing::warn!(host = %host, error = ?e, "DNS resolution failed");
            None
        }
    }
}
