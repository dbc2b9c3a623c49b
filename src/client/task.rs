//! The caller-facing handle to one submitted job, plus the event types
//! delivered over its lifetime.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::priority::Priority;

/// One event delivered to a [`Task`] over its lifetime. `Complete`,
/// `Failure`, and `Exception` are terminal: no further event follows
/// them and the task is removed from the client's bookkeeping the
/// moment one is dispatched.
#[derive(Clone, Debug)]
pub enum TaskEvent {
    Data(Bytes),
    Warning(Bytes),
    Status { numerator: u64, denominator: u64 },
    Complete(Bytes),
    Failure,
    Exception(Bytes),
}

impl TaskEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Complete(_) | TaskEvent::Failure | TaskEvent::Exception(_))
    }
}

/// Handle returned by [`crate::Client::submit`] and friends. Attributes are
/// fixed at submission time; events arrive over an internal channel fed by
/// the client engine as `WORK_*` commands come in for this job's handle.
///
/// A background task's event channel never receives anything (the server
/// never reports on it and this crate does not poll `GET_STATUS` for it
/// automatically), but `next_event` still returns cleanly (`None`) rather
/// than hanging, since the sending half is dropped immediately.
pub struct Task {
    function: String,
    workload: Bytes,
    handle: String,
    priority: Priority,
    unique_id: String,
    events: mpsc::UnboundedReceiver<TaskEvent>,
}

impl Task {
    pub(crate) fn new(
        function: String,
        workload: Bytes,
        handle: String,
        priority: Priority,
        unique_id: String,
        events: mpsc::UnboundedReceiver<TaskEvent>,
    ) -> Self {
        Task { function, workload, handle, priority, unique_id, events }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn workload(&self) -> &Bytes {
        &self.workload
    }

    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Awaits the next event for this job. Returns `None` once the task has
    /// been finalized: a terminal event was already delivered, the client
    /// cancelled it, or the connection closed.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.recv().await
    }
}
