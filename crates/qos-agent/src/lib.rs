//! UDP echo latency probing.
//!
//! A [`ProbeOrchestrator`] runs one batch of [`EndpointProbe`]s at a time on a
//! dedicated [`ProbeWorker`] thread and hands the finished [`BatchReport`] back
//! on the caller's own context.
//!
//! ```rust,no_run
//! use qos_agent::ProbeOrchestrator;
//! use qos_common::config::QosConfig;
//! use qos_common::models::EndpointProbe;
//!
//! # async fn run() {
//! let mut orchestrator = ProbeOrchestrator::new(&QosConfig::default());
//! orchestrator.subscribe(|report| {
//!     if let Some(best) = report.fastest() {
//!         println!("fastest: {} ({}ms)", best.label, best.latency_ms);
//!     }
//! });
//! orchestrator.start(vec![
//!     EndpointProbe::new("eu-west", "eu.example.com"),
//!     EndpointProbe::new("us-east", "us.example.com"),
//! ]);
//! orchestrator.wait_for_completion().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod resolver;

pub use error::ProbeError;
pub use orchestrator::ProbeOrchestrator;
pub use probe::{ProbeWorker, StopHandle, WorkerSettings};
pub use qos_common::models::{BatchReport, EndpointProbe, FinishReason};
