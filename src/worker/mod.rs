//! The worker role: registers function names and runs the grab-job loop,
//! invoking a user handler with a [`Job`] for each assignment.
//!
//! Unlike [`crate::Client`], the worker's connection is never paused: it is
//! always either about to send `GRAB_JOB_UNIQ`, waiting on `NOOP` while
//! asleep, or running a handler and holding off the next grab until it
//! reports a verdict. There is no idle state with unsolicited server data
//! outstanding, so the backpressure gate in [`crate::participant`] simply
//! doesn't apply here.

mod job;

use std::collections::HashMap;
use std::future::Future;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::connection::Connection;
use crate::error::GearmanError;
use crate::participant::{BlockingQueue, MatchOutcome, Participant};
use crate::wire::command::{request, s, Command};

pub use job::Job;
use job::JobOp;

/// A registered function handler. Boxed so `register` can accept any
/// `Fn(Job) -> impl Future<Output = ()>` without the engine needing to know
/// its concrete type.
type Handler = std::sync::Arc<dyn Fn(Job) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone, Debug)]
pub enum WorkerEvent {
    Registered(String),
    Unregistered(String),
    /// `JOB_ASSIGN_UNIQ` named a function this worker never registered (or
    /// already unregistered), so the job is auto-failed.
    UnknownFunction(String),
    Close,
    Error(String),
}

pub(crate) enum WorkerControl {
    Register {
        function: String,
        timeout: Option<u32>,
        handler: Handler,
        respond: oneshot::Sender<Result<(), GearmanError>>,
    },
    Unregister {
        function: String,
        respond: oneshot::Sender<Result<(), GearmanError>>,
    },
    UnregisterAll(oneshot::Sender<Result<(), GearmanError>>),
    SetClientId {
        id: String,
        respond: oneshot::Sender<Result<(), GearmanError>>,
    },
    JobOp(JobOp),
    Disconnect,
}

enum WorkerAction {
    Grab,
    Sleep,
}

/// Cheap, `Clone`-able handle to a worker connection.
#[derive(Clone)]
pub struct Worker {
    control_tx: mpsc::UnboundedSender<WorkerControl>,
    events_tx: broadcast::Sender<WorkerEvent>,
}

impl Worker {
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events_tx.subscribe()
    }

    /// Sends `CAN_DO{function_name}` and stores `handler` for the grab loop
    /// to invoke on assignment. Resolves once the send is flushed; the
    /// server never replies to `CAN_DO`.
    pub async fn register<F, Fut>(&self, function: impl Into<String>, handler: F) -> Result<(), GearmanError>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_inner(function.into(), None, handler).await
    }

    /// Same as [`Worker::register`] but sends `CAN_DO_TIMEOUT`, asking the
    /// server to fail this job server-side if it runs longer than
    /// `timeout_seconds`.
    pub async fn register_with_timeout<F, Fut>(
        &self,
        function: impl Into<String>,
        timeout_seconds: u32,
        handler: F,
    ) -> Result<(), GearmanError>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register_inner(function.into(), Some(timeout_seconds), handler).await
    }

    async fn register_inner<F, Fut>(
        &self,
        function: String,
        timeout: Option<u32>,
        handler: F,
    ) -> Result<(), GearmanError>
    where
        F: Fn(Job) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler = std::sync::Arc::new(move |job| Box::pin(handler(job)) as BoxFuture<'static, ()>);
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(WorkerControl::Register { function, timeout, handler, respond: tx })
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    pub async fn unregister(&self, function: impl Into<String>) -> Result<(), GearmanError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(WorkerControl::Unregister { function: function.into(), respond: tx })
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    pub async fn unregister_all(&self) -> Result<(), GearmanError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(WorkerControl::UnregisterAll(tx))
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    /// Sends `SET_CLIENT_ID`, a fire-and-forget identification string the
    /// server surfaces in its administrative text protocol (out of scope
    /// here, but worth setting so an operator can tell workers apart).
    pub async fn set_client_id(&self, id: impl Into<String>) -> Result<(), GearmanError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(WorkerControl::SetClientId { id: id.into(), respond: tx })
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    pub fn disconnect(&self) {
        let _ = self.control_tx.send(WorkerControl::Disconnect);
    }
}

pub struct WorkerBuilder {
    host: String,
    port: u16,
    client_id: Option<String>,
}

impl WorkerBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        WorkerBuilder { host: host.into(), port, client_id: None }
    }

    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub async fn build(self) -> Result<Worker, GearmanError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(GearmanError::Dial)?;
        let participant = Participant::new(Connection::new(stream));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(128);
        let (exec_done_tx, exec_done_rx) = mpsc::unbounded_channel();

        let engine = WorkerEngine {
            participant,
            queue: BlockingQueue::new(),
            functions: HashMap::new(),
            control_tx: control_tx.clone(),
            grab_started: false,
            executing: false,
            control_rx,
            events_tx: events_tx.clone(),
            exec_done_tx,
            exec_done_rx,
        };
        tokio::spawn(engine.run());

        let worker = Worker { control_tx, events_tx };
        if let Some(id) = self.client_id {
            worker.set_client_id(id).await?;
        }
        Ok(worker)
    }
}

pub async fn create_worker(host: impl Into<String>, port: u16) -> Result<Worker, GearmanError> {
    WorkerBuilder::new(host.into(), port).build().await
}

struct WorkerEngine {
    participant: Participant<TcpStream>,
    queue: BlockingQueue<WorkerAction>,
    functions: HashMap<String, Handler>,
    control_tx: mpsc::UnboundedSender<WorkerControl>,
    grab_started: bool,
    executing: bool,
    control_rx: mpsc::UnboundedReceiver<WorkerControl>,
    events_tx: broadcast::Sender<WorkerEvent>,
    exec_done_tx: mpsc::UnboundedSender<()>,
    exec_done_rx: mpsc::UnboundedReceiver<()>,
}

impl WorkerEngine {
    async fn run(mut self) {
        loop {
            tokio::select! {
                incoming = self.participant.connection.recv_gated() => {
                    match incoming {
                        None => {
                            self.shutdown(None).await;
                            break;
                        }
                        Some(Err(e)) => {
                            self.shutdown(Some(e.into())).await;
                            break;
                        }
                        Some(Ok(cmd)) => {
                            if self.on_command(cmd).await {
                                break;
                            }
                        }
                    }
                }
                control = self.control_rx.recv() => {
                    match control {
                        None => break,
                        Some(WorkerControl::Disconnect) => {
                            let _ = self.participant.connection.shutdown().await;
                            self.shutdown(None).await;
                            break;
                        }
                        Some(control) => self.on_control(control).await,
                    }
                }
                _ = self.exec_done_rx.recv() => {
                    self.executing = false;
                    self.start_grab().await;
                }
            }
        }
    }

    async fn on_control(&mut self, control: WorkerControl) {
        match control {
            WorkerControl::Register { function, timeout, handler, respond } => {
                let cmd = match timeout {
                    Some(secs) => request(
                        "CAN_DO_TIMEOUT",
                        &[("function_name", s(function.clone())), ("timeout", s(secs.to_string()))],
                    ),
                    None => request("CAN_DO", &[("function_name", s(function.clone()))]),
                };
                let result = self.participant.connection.send(cmd).await.map_err(GearmanError::from);
                if result.is_ok() {
                    self.functions.insert(function.clone(), handler);
                    let _ = self.events_tx.send(WorkerEvent::Registered(function));
                    if !self.grab_started {
                        self.grab_started = true;
                        self.start_grab().await;
                    }
                }
                let _ = respond.send(result);
            }
            WorkerControl::Unregister { function, respond } => {
                let cmd = request("CANT_DO", &[("function_name", s(function.clone()))]);
                let result = self.participant.connection.send(cmd).await.map_err(GearmanError::from);
                if result.is_ok() {
                    self.functions.remove(&function);
                    let _ = self.events_tx.send(WorkerEvent::Unregistered(function));
                }
                let _ = respond.send(result);
            }
            WorkerControl::UnregisterAll(respond) => {
                let cmd = request("RESET_ABILITIES", &[]);
                let result = self.participant.connection.send(cmd).await.map_err(GearmanError::from);
                if result.is_ok() {
                    self.functions.clear();
                }
                let _ = respond.send(result);
            }
            WorkerControl::SetClientId { id, respond } => {
                let cmd = request("SET_CLIENT_ID", &[("client_id", s(id))]);
                let result = self.participant.connection.send(cmd).await.map_err(GearmanError::from);
                let _ = respond.send(result);
            }
            WorkerControl::JobOp(op) => self.send_job_op(op).await,
            WorkerControl::Disconnect => unreachable!("handled in run() before reaching on_control"),
        }
    }

    async fn send_job_op(&mut self, op: JobOp) {
        let cmd = match op {
            JobOp::Data(handle, data) => request("WORK_DATA", &[("handle", s(handle)), ("data", data)]),
            JobOp::Warning(handle, data) => request("WORK_WARNING", &[("handle", s(handle)), ("data", data)]),
            JobOp::Status(handle, num, den) => request(
                "WORK_STATUS",
                &[
                    ("handle", s(handle)),
                    ("numerator", s(num.to_string())),
                    ("denominator", s(den.to_string())),
                ],
            ),
            JobOp::Complete(handle, data) => request("WORK_COMPLETE", &[("handle", s(handle)), ("data", data)]),
            JobOp::Fail(handle) => request("WORK_FAIL", &[("handle", s(handle))]),
            JobOp::Exception(handle, data) => request("WORK_EXCEPTION", &[("handle", s(handle)), ("data", data)]),
        };
        if let Err(e) = self.participant.connection.send(cmd).await {
            tracing::warn!(error = %e, "failed to send job result, connection likely closing");
        }
    }

    /// Returns `true` if this command was fatal and the connection has
    /// already been shut down.
    async fn on_command(&mut self, cmd: Command) -> bool {
        if cmd.name() == "ERROR" {
            let code = cmd.field_str("code").unwrap_or_default();
            let text = cmd.field_str("text").unwrap_or_default();
            self.participant.end_blocking_action();
            if self.queue.pop_for_error().is_some() {
                let _ = self.events_tx.send(WorkerEvent::Error(format!("server error {code}: {text}")));
                self.start_grab().await;
            } else {
                let _ = self.events_tx.send(WorkerEvent::Error(format!("server error {code}: {text}")));
            }
            return false;
        }

        match self.queue.try_resolve(cmd) {
            Ok(MatchOutcome::Resolved(action, response)) => {
                self.participant.end_blocking_action();
                self.finish_action(action, response).await;
                false
            }
            Ok(MatchOutcome::NotCorrelated(cmd)) => {
                tracing::warn!(command = cmd.name(), "unexpected unsolicited command on worker connection");
                false
            }
            Err(e) => {
                self.shutdown(Some(e.into())).await;
                true
            }
        }
    }

    async fn finish_action(&mut self, action: WorkerAction, response: Command) {
        match action {
            WorkerAction::Grab => match response.name() {
                "JOB_ASSIGN_UNIQ" => self.start_job(response).await,
                "NO_JOB" => self.start_sleep().await,
                _ => unreachable!("queue only ever expects JOB_ASSIGN_UNIQ or NO_JOB for Grab"),
            },
            WorkerAction::Sleep => {
                debug_assert_eq!(response.name(), "NOOP");
                self.start_grab().await;
            }
        }
    }

    async fn start_grab(&mut self) {
        if self.executing || !self.grab_started {
            return;
        }
        let req = request("GRAB_JOB_UNIQ", &[]);
        if self.participant.begin_blocking_action(req).await.is_ok() {
            self.queue.push(&["JOB_ASSIGN_UNIQ", "NO_JOB"], WorkerAction::Grab);
        }
    }

    async fn start_sleep(&mut self) {
        let req = request("PRE_SLEEP", &[]);
        if self.participant.begin_blocking_action(req).await.is_ok() {
            self.queue.push(&["NOOP"], WorkerAction::Sleep);
        }
    }

    async fn start_job(&mut self, assignment: Command) {
        let handle = assignment.field_str("handle").unwrap_or_default();
        let function = assignment.field_str("function_name").unwrap_or_default();
        let unique_id = assignment.field_str("unique_id").unwrap_or_default();
        let workload = assignment.field("data").cloned().unwrap_or_default();

        let Some(handler) = self.functions.get(&function).cloned() else {
            let _ = self.events_tx.send(WorkerEvent::UnknownFunction(function));
            self.send_job_op(JobOp::Fail(handle)).await;
            self.start_grab().await;
            return;
        };

        let job = Job::new(function, handle, workload, unique_id, self.control_tx.clone());
        self.executing = true;
        let done_tx = self.exec_done_tx.clone();
        tokio::spawn(async move {
            handler(job).await;
            let _ = done_tx.send(());
        });
    }

    async fn shutdown(&mut self, err: Option<GearmanError>) {
        if let Some(err) = &err {
            let _ = self.events_tx.send(WorkerEvent::Error(err.to_string()));
        }
        self.queue.drain_all();
        let _ = self.events_tx.send(WorkerEvent::Close);
    }
}
