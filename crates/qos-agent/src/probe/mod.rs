pub mod batch;
pub mod socket;
pub mod worker;

pub use batch::ProbeBatch;
pub use worker::{ProbeWorker, ReportSender, StopHandle, WorkerSettings};
