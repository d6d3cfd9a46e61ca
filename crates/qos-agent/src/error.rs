use thiserror::Error;

/// Batch-level failures. Per-probe failures never show up here, they end as
/// an unmeasured latency in the report.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The worker could not open its UDP socket.
    #[error("failed to create probe socket: {0}")]
    Socket(#[source] std::io::Error),

    /// The worker thread could not be spawned.
    #[error("failed to spawn probe worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Worker lifecycle misuse, e.g. starting it twice.
    #[error("worker error: {0}")]
    Worker(&'static str),

    #[error("config error: {0}")]
    Config(String),
}
