use std::net::{IpAddr, SocketAddr};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qos_agent::{config, ProbeOrchestrator};
use qos_common::models::{BatchReport, EndpointProbe};
use qos_common::quality::{latency_grade, latency_score};

const CONFIG_FILENAME: &str = "qos-agent.toml";

#[derive(Parser)]
#[command(name = "qos-agent", about = "UDP echo latency prober")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to config file
    #[arg(long, global = true, default_value = CONFIG_FILENAME)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Probe all targets once and print their latency
    Run {
        /// Extra target as LABEL=HOST[:PORT], may be repeated
        #[arg(long = "target", value_name = "LABEL=HOST[:PORT]")]
        targets: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the config file and show the effective settings
    CheckConfig,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run { targets, json } => run(&args.config, &targets, json),
        Command::CheckConfig => check_config(&args.config),
    }
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(config_path: &str, extra_targets: &[String], json: bool) -> Result<()> {
    let mut config = config::load(config_path)?;
    init_tracing(&config.log_level);

    for arg in extra_targets {
        config.targets.push(parse_target(arg, config.default_port)?);
    }
    if config.targets.is_empty() {
        bail!("no targets configured, add [[targets]] to {} or pass --target", config_path);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let mut orchestrator = ProbeOrchestrator::new(&config);
        orchestrator.subscribe(move |report| print_report(report, json));

        orchestrator.start(config.targets.clone());
        if !orchestrator.is_running() {
            bail!("probe run could not be started");
        }

        let interrupted = tokio::select! {
            _ = orchestrator.wait_for_completion() => false,
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            tracing::info!("Received Ctrl+C, shutting down...");
            orchestrator.shutdown();
        }
        Ok(())
    })
}

fn check_config(config_path: &str) -> Result<()> {
    let config = config::load(config_path)?;
    println!("Config OK: {}", config_path);
    println!("  Bind Address:      {}", config.bind_addr);
    println!("  Poll Interval:     {}ms", config.poll_interval_ms);
    println!("  Timeout Per Probe: {}s", config.timeout_per_probe_secs);
    println!("  Default Port:      {}", config.default_port);
    println!("  Targets:           {}", config.targets.len());
    for target in &config.targets {
        println!("    {:<16} {}:{}", target.label, target.host, target.port);
    }
    Ok(())
}

/// Parse `LABEL=HOST[:PORT]`. Literal addresses skip DNS.
fn parse_target(arg: &str, default_port: u16) -> Result<EndpointProbe> {
    let (label, dest) = arg
        .split_once('=')
        .with_context(|| format!("invalid target '{}', expected LABEL=HOST[:PORT]", arg))?;
    let (label, dest) = (label.trim(), dest.trim());
    if label.is_empty() || dest.is_empty() {
        bail!("invalid target '{}', expected LABEL=HOST[:PORT]", arg);
    }

    if let Ok(addr) = dest.parse::<SocketAddr>() {
        return Ok(EndpointProbe::literal(label, addr.ip()).with_port(addr.port()));
    }
    if let Ok(ip) = dest.parse::<IpAddr>() {
        return Ok(EndpointProbe::literal(label, ip).with_port(default_port));
    }

    match dest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("invalid port in target '{}'", arg))?;
            Ok(EndpointProbe::new(label, host).with_port(port))
        }
        None => Ok(EndpointProbe::new(label, dest).with_port(default_port)),
    }
}

fn print_report(report: &BatchReport, json: bool) {
    if json {
        match serde_json::to_string_pretty(report) {
            Ok(s) => println!("{}", s),
            Err(e) => tracing::error!("Failed to serialize report: {e}"),
        }
        return;
    }

    println!("{:<16} {:<40} {:>10} {:>6} {}", "Label", "Address", "Latency", "Score", "Grade");
    println!("{}", "-".repeat(88));
    for probe in &report.probes {
        let address = match probe.resolved_address {
            Some(ip) => format!("{} ({}:{})", probe.host, ip, probe.port),
            None => format!("{}:{}", probe.host, probe.port),
        };
        let latency = if probe.is_measured() {
            format!("{}ms", probe.latency_ms)
        } else {
            "-".to_string()
        };
        println!(
            "{:<16} {:<40} {:>10} {:>6.1} {}",
            probe.label,
            address,
            latency,
            latency_score(probe.latency_ms),
            latency_grade(probe.latency_ms)
        );
    }

    println!();
    match report.fastest() {
        Some(best) => println!("Fastest: {} ({}ms), {}", best.label, best.latency_ms, report.reason),
        None => println!("No endpoint replied, {}", report.reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn literal_with_port() {
        let probe = parse_target("local=127.0.0.1:4000", 3075).unwrap();
        assert_eq!(probe.label, "local");
        assert!(probe.use_literal_address);
        assert_eq!(probe.host, "127.0.0.1");
        assert_eq!(probe.port, 4000);
    }

    #[test]
    fn literal_without_port_uses_default() {
        let probe = parse_target("lo=127.0.0.1", 3075).unwrap();
        assert_eq!(probe.port, 3075);
        assert_eq!(probe.host, IpAddr::V4(Ipv4Addr::LOCALHOST).to_string());
    }

    #[test]
    fn bracketed_ipv6() {
        let probe = parse_target("v6=[::1]:5000", 3075).unwrap();
        assert!(probe.use_literal_address);
        assert_eq!(probe.host, "::1");
        assert_eq!(probe.port, 5000);
    }

    #[test]
    fn hostname_with_and_without_port() {
        let probe = parse_target("eu=eu.example.com:3100", 3075).unwrap();
        assert!(!probe.use_literal_address);
        assert_eq!(probe.host, "eu.example.com");
        assert_eq!(probe.port, 3100);

        let probe = parse_target("us=us.example.com", 3075).unwrap();
        assert_eq!(probe.port, 3075);
    }

    #[test]
    fn malformed_targets() {
        assert!(parse_target("no-equals-sign", 3075).is_err());
        assert!(parse_target("=host", 3075).is_err());
        assert!(parse_target("eu=eu.example.com:notaport", 3075).is_err());
    }
}
