use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use qos_common::config::QosConfig;
use qos_common::models::{BatchReport, EndpointProbe, FinishReason};
use qos_common::protocol::EchoMessage;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::batch::ProbeBatch;
use super::socket;
use crate::error::ProbeError;
use crate::resolver;

/// Channel the worker posts its single report into. The receiving end lives
/// on the host's main context.
pub type ReportSender = mpsc::UnboundedSender<BatchReport>;

/// Large enough to tell a 2-byte reply from a longer datagram.
const RECV_BUF_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub bind_addr: SocketAddr,
    pub poll_interval: Duration,
    pub thread_name: String,
}

impl WorkerSettings {
    pub fn from_config(config: &QosConfig) -> Self {
        Self {
            bind_addr: config.bind_addr,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            thread_name: config.worker_thread_name.clone(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&QosConfig::default())
    }
}

/// Cross-thread handle that cancels a running worker.
#[derive(Debug, Clone)]
pub struct StopHandle {
    stopping: Arc<AtomicBool>,
    socket: Arc<UdpSocket>,
}

impl StopHandle {
    /// Idempotent and non-blocking. The worker notices within one poll
    /// interval and exits without reporting.
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            socket::shutdown(&self.socket);
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// Runs one probe batch on a dedicated thread.
pub struct ProbeWorker {
    run_id: Uuid,
    run: Option<WorkerRun>,
    stop: StopHandle,
    thread_name: String,
    thread: Option<JoinHandle<()>>,
}

impl ProbeWorker {
    /// Create a worker for `probes` with a whole-second `timeout`.
    ///
    /// Fails only if the socket cannot be opened, a worker without one is
    /// useless.
    pub fn new(
        probes: Vec<EndpointProbe>,
        timeout: Duration,
        settings: &WorkerSettings,
    ) -> Result<Self, ProbeError> {
        let socket = socket::open_probe_socket(settings.bind_addr, settings.poll_interval)
            .map_err(ProbeError::Socket)?;
        let local_addr = socket.local_addr().map_err(ProbeError::Socket)?;
        let socket = Arc::new(socket);
        let stopping = Arc::new(AtomicBool::new(false));
        let run_id = Uuid::new_v4();

        let run = WorkerRun {
            run_id,
            batch: ProbeBatch::new(probes, timeout),
            socket: Arc::clone(&socket),
            local_addr,
            poll_interval: settings.poll_interval,
            stopping: Arc::clone(&stopping),
        };

        Ok(Self {
            run_id,
            run: Some(run),
            stop: StopHandle { stopping, socket },
            thread_name: settings.thread_name.clone(),
            thread: None,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Spawn the worker thread. The report for this run is posted to
    /// `reports` exactly once, unless the worker is stopped first.
    pub fn start(&mut self, reports: ReportSender) -> Result<(), ProbeError> {
        let run = self.run.take().ok_or(ProbeError::Worker("worker already started"))?;
        let handle = std::thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || run.execute(reports))
            .map_err(ProbeError::Spawn)?;
        self.thread = Some(handle);
        Ok(())
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    /// The worker thread has exited (or was never started).
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread to exit.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!(run_id = %self.run_id, "Probe worker thread panicked");
            }
        }
    }
}

impl Drop for ProbeWorker {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

impl std::fmt::Debug for ProbeWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeWorker")
            .field("run_id", &self.run_id)
            .field("started", &self.run.is_none())
            .field("stopping", &self.stop.is_stopping())
            .finish_non_exhaustive()
    }
}

/// State moved onto the worker thread.
struct WorkerRun {
    run_id: Uuid,
    batch: ProbeBatch,
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    poll_interval: Duration,
    stopping: Arc<AtomicBool>,
}

impl WorkerRun {
    fn execute(mut self, reports: ReportSender) {
        tracing::info!(run_id = %self.run_id, probes = self.batch.len(), "Resolving endpoints");
        for probe in self.batch.probes_mut() {
            resolver::resolve_probe(probe);
        }
        self.batch.index_pending();

        if self.is_stopping() {
            return;
        }

        tracing::info!(run_id = %self.run_id, "Sending echo requests");
        let sent_at = self.send_echoes();

        if self.batch.is_satisfied() {
            return self.finish(FinishReason::AllReplied, &reports);
        }

        tracing::debug!(run_id = %self.run_id, timeout = ?self.batch.timeout(), "Waiting for replies");
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            if self.is_stopping() {
                tracing::debug!(run_id = %self.run_id, "Probe worker stopped");
                return;
            }

            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    // The read may have outlived the deadline.
                    let now = Instant::now();
                    if self.batch.is_expired(sent_at, now) {
                        return self.finish(FinishReason::TimedOut, &reports);
                    }
                    self.handle_datagram(&buf[..n], from.ip(), sent_at, now);
                    if self.batch.is_satisfied() {
                        return self.finish(FinishReason::AllReplied, &reports);
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
                // ICMP unreachable surfacing on the socket (Windows)
                Err(e) if matches!(e.kind(), io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused) => {
                    tracing::debug!(run_id = %self.run_id, error = %e, "Endpoint unreachable");
                }
                Err(e) => {
                    if self.is_stopping() {
                        return;
                    }
                    tracing::warn!(run_id = %self.run_id, error = %e, "Receive failed");
                    std::thread::sleep(self.poll_interval);
                }
            }

            if self.batch.is_expired(sent_at, Instant::now()) {
                return self.finish(FinishReason::TimedOut, &reports);
            }
        }
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Send one echo request per resolved probe, in order. Returns the time of
    /// the last send, which every latency in the batch is measured against.
    fn send_echoes(&self) -> Instant {
        for probe in self.batch.probes() {
            let Some(ip) = probe.resolved_address else {
                tracing::warn!(label = %probe.label, host = %probe.host, "No address for endpoint, skipping");
                continue;
            };

            let Some(dest) = socket::destination(self.local_addr, SocketAddr::new(ip, probe.port)) else {
                tracing::error!(label = %probe.label, "Address is invalid <{}:{}>", ip, probe.port);
                continue;
            };

            match self.socket.send_to(EchoMessage::Request.as_bytes(), dest) {
                Ok(_) => tracing::trace!(label = %probe.label, dest = %dest, "Echo request sent"),
                Err(e) => {
                    tracing::warn!(label = %probe.label, dest = %dest, error = %e, "Failed to send echo request")
                }
            }
        }
        Instant::now()
    }

    fn handle_datagram(&mut self, payload: &[u8], from: IpAddr, sent_at: Instant, now: Instant) {
        if EchoMessage::parse(payload) != Some(EchoMessage::Reply) {
            tracing::trace!(from = %from, len = payload.len(), "Discarding unexpected payload");
            return;
        }

        match self.batch.record_reply(from, sent_at, now) {
            Some(probe) => tracing::debug!(
                run_id = %self.run_id,
                label = %probe.label,
                latency_ms = probe.latency_ms,
                "Echo reply received"
            ),
            None => tracing::trace!(from = %from, "Reply from unknown or already answered endpoint"),
        }
    }

    /// Consumes the run, so a batch can only ever be reported once.
    fn finish(self, reason: FinishReason, reports: &ReportSender) {
        self.stopping.store(true, Ordering::SeqCst);
        tracing::info!(
            run_id = %self.run_id,
            reason = %reason,
            unanswered = self.batch.remaining(),
            "Probe run finished"
        );

        let report = BatchReport::new(self.run_id, reason, self.batch.into_probes());
        if reports.send(report).is_err() {
            tracing::debug!(run_id = %self.run_id, "Report receiver dropped before delivery");
        }
    }
}
