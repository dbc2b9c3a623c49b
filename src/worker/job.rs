//! The worker-side handle to one assigned job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::GearmanError;

use super::WorkerControl;

/// Fire-and-forget wire operation a [`Job`] queues for the worker engine to
/// actually send. None of these expect a response.
pub(crate) enum JobOp {
    Data(String, Bytes),
    Warning(String, Bytes),
    Status(String, u64, u64),
    Complete(String, Bytes),
    Fail(String),
    Exception(String, Bytes),
}

/// A job assigned to this worker by `JOB_ASSIGN_UNIQ`. Attributes are fixed
/// at assignment; the handler calls one of the terminal methods exactly
/// once to report a verdict back to the server.
///
/// Every operation after a terminal verdict (`complete`/`fail`/`exception`)
/// returns [`GearmanError::InvalidJobState`] instead of queuing anything.
pub struct Job {
    function: String,
    handle: String,
    workload: Bytes,
    unique_id: String,
    control_tx: mpsc::UnboundedSender<WorkerControl>,
    done: Arc<AtomicBool>,
}

impl Job {
    pub(crate) fn new(
        function: String,
        handle: String,
        workload: Bytes,
        unique_id: String,
        control_tx: mpsc::UnboundedSender<WorkerControl>,
    ) -> Self {
        Job { function, handle, workload, unique_id, control_tx, done: Arc::new(AtomicBool::new(false)) }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn workload(&self) -> &Bytes {
        &self.workload
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn send_data(&self, data: impl Into<Bytes>) -> Result<(), GearmanError> {
        self.emit(JobOp::Data(self.handle.clone(), data.into()))
    }

    pub fn send_warning(&self, data: impl Into<Bytes>) -> Result<(), GearmanError> {
        self.emit(JobOp::Warning(self.handle.clone(), data.into()))
    }

    pub fn send_status(&self, numerator: u64, denominator: u64) -> Result<(), GearmanError> {
        self.emit(JobOp::Status(self.handle.clone(), numerator, denominator))
    }

    pub fn complete(&self, result: impl Into<Bytes>) -> Result<(), GearmanError> {
        self.finish(JobOp::Complete(self.handle.clone(), result.into()))
    }

    pub fn fail(&self) -> Result<(), GearmanError> {
        self.finish(JobOp::Fail(self.handle.clone()))
    }

    pub fn exception(&self, reason: impl Into<Bytes>) -> Result<(), GearmanError> {
        self.finish(JobOp::Exception(self.handle.clone(), reason.into()))
    }

    fn guard(&self) -> Result<(), GearmanError> {
        if self.done.load(Ordering::Acquire) {
            Err(GearmanError::InvalidJobState)
        } else {
            Ok(())
        }
    }

    fn emit(&self, op: JobOp) -> Result<(), GearmanError> {
        self.guard()?;
        self.control_tx.send(WorkerControl::JobOp(op)).map_err(|_| GearmanError::ConnectionClosed)
    }

    fn finish(&self, op: JobOp) -> Result<(), GearmanError> {
        self.guard()?;
        self.done.store(true, Ordering::Release);
        self.control_tx.send(WorkerControl::JobOp(op)).map_err(|_| GearmanError::ConnectionClosed)
    }
}
