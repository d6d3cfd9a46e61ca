//! Host-facing entry point for probe runs.
//!
//! The orchestrator owns at most one [`ProbeWorker`] at a time. Workers post
//! their report into a queue; the host drains it from its own main loop with
//! [`ProbeOrchestrator::dispatch_pending`] or awaits it with
//! [`ProbeOrchestrator::wait_for_completion`], and subscribers are only ever
//! called from there, never from a worker thread.

use std::time::Duration;

use qos_common::config::QosConfig;
use qos_common::models::{BatchReport, EndpointProbe};
use tokio::sync::mpsc;

use crate::probe::{ProbeWorker, ReportSender, WorkerSettings};

type CompletionCallback = Box<dyn FnMut(&BatchReport)>;

pub struct ProbeOrchestrator {
    settings: WorkerSettings,
    timeout_per_probe: Duration,
    batch: Vec<EndpointProbe>,
    timeout: Duration,
    worker: Option<ProbeWorker>,
    reports_tx: ReportSender,
    reports_rx: mpsc::UnboundedReceiver<BatchReport>,
    listeners: Vec<CompletionCallback>,
}

impl ProbeOrchestrator {
    pub fn new(config: &QosConfig) -> Self {
        Self::with_settings(
            WorkerSettings::from_config(config),
            Duration::from_secs(config.timeout_per_probe_secs),
        )
    }

    /// `timeout_per_probe` is truncated to whole seconds, with a floor of one
    /// second, since the worker checks its deadline at that granularity.
    pub fn with_settings(settings: WorkerSettings, timeout_per_probe: Duration) -> Self {
        let timeout_per_probe = Duration::from_secs(timeout_per_probe.as_secs().max(1));
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        tracing::debug!(poll_interval = ?settings.poll_interval, "Probe orchestrator initialized");
        Self {
            settings,
            timeout_per_probe,
            batch: Vec::new(),
            timeout: timeout_per_probe,
            worker: None,
            reports_tx,
            reports_rx,
            listeners: Vec::new(),
        }
    }

    /// Register a completion observer. Called once per finished run, on the
    /// thread that drains the report queue.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&BatchReport) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Record `batch` and try to run it.
    ///
    /// An empty batch is ignored. While a run is active the batch is recorded
    /// but not started; call [`update`](Self::update) once idle to run it.
    pub fn start(&mut self, batch: Vec<EndpointProbe>) {
        if batch.is_empty() {
            tracing::warn!("Probe batch is empty, nothing to start");
            return;
        }

        // One timeout unit per endpoint.
        let units = u32::try_from(batch.len()).unwrap_or(u32::MAX).max(1);
        self.timeout = self.timeout_per_probe.saturating_mul(units);
        self.batch = batch;

        if !self.update() {
            tracing::warn!("Probe run already in progress, batch not started");
        }
    }

    /// Start a worker for the recorded batch.
    ///
    /// Returns `false` if a run is still active, no batch was recorded, or the
    /// worker could not be created.
    pub fn update(&mut self) -> bool {
        self.dispatch_pending();
        if self.worker.is_some() {
            return false;
        }
        if self.batch.is_empty() {
            tracing::debug!("No probe batch recorded");
            return false;
        }

        let mut worker = match ProbeWorker::new(self.batch.clone(), self.timeout, &self.settings) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "Failed to create probe worker");
                return false;
            }
        };
        if let Err(e) = worker.start(self.reports_tx.clone()) {
            tracing::error!(error = %e, "Failed to start probe worker");
            return false;
        }

        tracing::info!(
            run_id = %worker.run_id(),
            probes = self.batch.len(),
            timeout = ?self.timeout,
            "Probe run started"
        );
        self.worker = Some(worker);
        true
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Deliver any finished run to subscribers without blocking. Returns the
    /// number of reports delivered.
    pub fn dispatch_pending(&mut self) -> usize {
        // Sampled before draining: a worker posts its report before it exits.
        let exited = self.worker.as_ref().is_some_and(ProbeWorker::is_finished);

        let mut delivered = 0;
        while let Ok(report) = self.reports_rx.try_recv() {
            if self.complete(&report) {
                delivered += 1;
            }
        }

        if exited && self.worker.is_some() {
            tracing::error!("Probe worker exited without reporting");
            self.reap_worker();
        }
        delivered
    }

    /// Wait for the active run to finish and deliver it to subscribers.
    ///
    /// Returns `None` straight away when nothing is running.
    pub async fn wait_for_completion(&mut self) -> Option<BatchReport> {
        let poll = self.settings.poll_interval;
        loop {
            let exited = match &self.worker {
                Some(worker) => worker.is_finished(),
                None => return None,
            };

            match self.reports_rx.try_recv() {
                Ok(report) => {
                    if self.complete(&report) {
                        return Some(report);
                    }
                    continue;
                }
                Err(_) if exited => {
                    tracing::error!("Probe worker exited without reporting");
                    self.reap_worker();
                    return None;
                }
                Err(_) => {}
            }

            if let Ok(Some(report)) = tokio::time::timeout(poll, self.reports_rx.recv()).await {
                if self.complete(&report) {
                    return Some(report);
                }
            }
        }
    }

    /// Stop and join the active worker, if any. Its run is not reported.
    pub fn shutdown(&mut self) {
        if let Some(worker) = &self.worker {
            tracing::info!(run_id = %worker.run_id(), "Stopping active probe run");
        }
        self.reap_worker();
    }

    fn complete(&mut self, report: &BatchReport) -> bool {
        let active = self.worker.as_ref().map(ProbeWorker::run_id);
        if active != Some(report.run_id) {
            tracing::debug!(run_id = %report.run_id, "Ignoring report from a retired run");
            return false;
        }

        for probe in &report.probes {
            tracing::info!(label = %probe.label, latency_ms = probe.latency_ms, "Probe result");
        }
        tracing::info!(run_id = %report.run_id, reason = %report.reason, "Probe run complete");

        self.reap_worker();
        for listener in &mut self.listeners {
            listener(report);
        }
        true
    }

    fn reap_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            worker.join();
        }
    }
}

impl Drop for ProbeOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ProbeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeOrchestrator")
            .field("batch_len", &self.batch.len())
            .field("timeout", &self.timeout)
            .field("worker", &self.worker)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
