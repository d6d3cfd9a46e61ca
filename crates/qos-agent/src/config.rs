use std::path::Path;

use anyhow::{Context, Result};
use qos_common::config::QosConfig;

use crate::error::ProbeError;

pub fn load(path: &str) -> Result<QosConfig> {
    let mut config = if Path::new(path).exists() {
        let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path))?
    } else {
        eprintln!("WARNING: Config file not found at '{}'. Using defaults.", path);
        QosConfig::default()
    };

    apply_env(&mut config)?;
    config.validate().map_err(ProbeError::Config)?;
    Ok(config)
}

/// Override from environment
fn apply_env(config: &mut QosConfig) -> Result<()> {
    if let Ok(v) = std::env::var("QOS_BIND_ADDR") {
        config.bind_addr = v.parse().with_context(|| format!("invalid QOS_BIND_ADDR '{}'", v))?;
    }
    if let Ok(v) = std::env::var("QOS_LOG_LEVEL") {
        config.log_level = v;
    }
    if let Ok(v) = std::env::var("QOS_POLL_INTERVAL_MS") {
        config.poll_interval_ms = v.parse().with_context(|| format!("invalid QOS_POLL_INTERVAL_MS '{}'", v))?;
    }
    if let Ok(v) = std::env::var("QOS_TIMEOUT_PER_PROBE_SECS") {
        config.timeout_per_probe_secs = v
            .parse()
            .with_context(|| format!("invalid QOS_TIMEOUT_PER_PROBE_SECS '{}'", v))?;
    }
    Ok(())
}
