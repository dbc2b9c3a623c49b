//! The client role: a connection to a job server that submits jobs and
//! consumes their results.
//!
//! The public [`Client`] is a cheap, `Clone`-able handle; all mutable state
//! (the in-flight task table, the blocking-action FIFO, the readable-side
//! gate) lives in a [`ClientEngine`] actor spawned by [`ClientBuilder::build`]
//! and driven entirely through channels, following the mailbox/post-office
//! split `distant-net` uses to keep one task owning a socket while handing
//! out many cheap client handles.

mod task;

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::{GearmanError, ProtocolError};
use crate::participant::{BlockingQueue, MatchOutcome, Participant};
use crate::priority::Priority;
use crate::wire::command::{request, s, Command};

pub use task::{Task, TaskEvent};

/// A point-in-time snapshot of a job's progress, returned by
/// [`Client::get_status`] and also broadcast to [`ClientEvent`] subscribers.
#[derive(Clone, Debug)]
pub struct StatusEvent {
    pub handle: String,
    pub known: bool,
    pub running: bool,
    pub numerator: u64,
    pub denominator: u64,
}

/// Events a [`Client`] broadcasts for observers that want visibility beyond
/// the [`Task`] handles they're directly holding.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    TaskSubmitted { handle: String },
    /// A `WORK_*` command arrived for a handle this client no longer (or
    /// never did) recognize, stale after a cancel, or a server bug.
    TaskUnknown { handle: String, command: &'static str },
    Status(StatusEvent),
    OptionSet(String),
    Close,
    Error(String),
}

struct SubmitParams {
    function: String,
    workload: Bytes,
    priority: Priority,
    unique_id: String,
    background: bool,
}

enum ClientControl {
    Submit(SubmitParams, oneshot::Sender<Result<Task, GearmanError>>),
    SetOption(String, oneshot::Sender<Result<(), GearmanError>>),
    GetStatus(String, oneshot::Sender<Result<StatusEvent, GearmanError>>),
    Cancel(String),
    Wait(oneshot::Sender<()>),
    Ping(oneshot::Sender<Result<(), GearmanError>>),
}

/// Continuation stashed in the blocking-action queue; resolved by
/// [`ClientEngine::finish_action`] once its response (or an `ERROR`,
/// or connection loss) arrives.
enum PendingAction {
    JobCreated {
        function: String,
        workload: Bytes,
        priority: Priority,
        unique_id: String,
        background: bool,
        respond: oneshot::Sender<Result<Task, GearmanError>>,
    },
    OptionAck {
        requested: String,
        respond: oneshot::Sender<Result<(), GearmanError>>,
    },
    StatusAck {
        handle: String,
        respond: oneshot::Sender<Result<StatusEvent, GearmanError>>,
    },
    PingAck {
        payload: Bytes,
        respond: oneshot::Sender<Result<(), GearmanError>>,
    },
}

struct TaskSlot {
    function: String,
    unique_id: String,
    sender: mpsc::UnboundedSender<TaskEvent>,
}

/// Cheap, `Clone`-able handle to a client connection. All methods hand a
/// request to the [`ClientEngine`] task over a channel and await its reply;
/// none of them touch the socket directly.
#[derive(Clone)]
pub struct Client {
    control_tx: mpsc::UnboundedSender<ClientControl>,
    events_tx: broadcast::Sender<ClientEvent>,
}

impl Client {
    /// Subscribes to client-level events (job submissions, stale work
    /// events, status snapshots, option acks, and connection loss).
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events_tx.subscribe()
    }

    pub async fn submit(&self, function: impl Into<String>, workload: impl Into<Bytes>) -> Result<Task, GearmanError> {
        self.submit_inner(function.into(), workload.into(), Priority::Normal, String::new(), false).await
    }

    pub async fn submit_with(
        &self,
        function: impl Into<String>,
        workload: impl Into<Bytes>,
        priority: Priority,
        unique_id: impl Into<String>,
    ) -> Result<Task, GearmanError> {
        self.submit_inner(function.into(), workload.into(), priority, unique_id.into(), false).await
    }

    pub async fn submit_background(
        &self,
        function: impl Into<String>,
        workload: impl Into<Bytes>,
    ) -> Result<Task, GearmanError> {
        self.submit_inner(function.into(), workload.into(), Priority::Normal, String::new(), true).await
    }

    pub async fn submit_background_with(
        &self,
        function: impl Into<String>,
        workload: impl Into<Bytes>,
        priority: Priority,
        unique_id: impl Into<String>,
    ) -> Result<Task, GearmanError> {
        self.submit_inner(function.into(), workload.into(), priority, unique_id.into(), true).await
    }

    async fn submit_inner(
        &self,
        function: String,
        workload: Bytes,
        priority: Priority,
        unique_id: String,
        background: bool,
    ) -> Result<Task, GearmanError> {
        let (tx, rx) = oneshot::channel();
        let params = SubmitParams { function, workload, priority, unique_id, background };
        self.control_tx
            .send(ClientControl::Submit(params, tx))
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    /// The only option this crate's server-side peer understands is
    /// `"exceptions"`, which asks the server to also deliver
    /// `WORK_EXCEPTION` events instead of silently dropping them.
    pub async fn set_option(&self, option: impl Into<String>) -> Result<(), GearmanError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(ClientControl::SetOption(option.into(), tx))
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    pub async fn get_status(&self, handle: impl Into<String>) -> Result<StatusEvent, GearmanError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(ClientControl::GetStatus(handle.into(), tx))
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }

    /// Removes `task` from local bookkeeping immediately. There is no wire
    /// message for this; the server keeps working the job, this client
    /// just stops listening for its events.
    pub fn cancel(&self, task: &Task) {
        let _ = self.control_tx.send(ClientControl::Cancel(task.handle().to_string()));
    }

    /// Resolves once there are no outstanding blocking actions and no
    /// foreground tasks left awaiting a terminal event.
    pub async fn wait(&self) {
        let (tx, rx) = oneshot::channel();
        if self.control_tx.send(ClientControl::Wait(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    pub async fn ping(&self) -> Result<(), GearmanError> {
        let (tx, rx) = oneshot::channel();
        self.control_tx
            .send(ClientControl::Ping(tx))
            .map_err(|_| GearmanError::ConnectionClosed)?;
        rx.await.map_err(|_| GearmanError::ConnectionClosed)?
    }
}

/// Builds and connects a [`Client`]. `create_client` is the shorthand for
/// `ClientBuilder::new(..).build()` with no extra options.
pub struct ClientBuilder {
    host: String,
    port: u16,
    initial_options: Vec<String>,
}

impl ClientBuilder {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientBuilder { host: host.into(), port, initial_options: Vec::new() }
    }

    /// Requests this option be set right after the initial ping succeeds,
    /// before `build` returns the handle.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.initial_options.push(option.into());
        self
    }

    pub async fn build(self) -> Result<Client, GearmanError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(GearmanError::Dial)?;
        let participant = Participant::new(Connection::new(stream));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(128);

        let engine = ClientEngine {
            participant,
            queue: BlockingQueue::new(),
            tasks: HashMap::new(),
            unique_tasks: HashSet::new(),
            waiters: Vec::new(),
            control_rx,
            events_tx: events_tx.clone(),
        };
        tokio::spawn(engine.run());

        let client = Client { control_tx, events_tx };
        client.ping().await.map_err(|e| GearmanError::Ping(Box::new(e)))?;
        for option in &self.initial_options {
            client.set_option(option.clone()).await?;
        }
        Ok(client)
    }
}

pub async fn create_client(host: impl Into<String>, port: u16) -> Result<Client, GearmanError> {
    ClientBuilder::new(host.into(), port).build().await
}

/// Owns the connection, the in-flight task table, and the blocking-action
/// queue. Runs as a single spawned task; every method on [`Client`] reaches
/// it only through `control_rx`.
struct ClientEngine {
    participant: Participant<TcpStream>,
    queue: BlockingQueue<PendingAction>,
    tasks: HashMap<String, TaskSlot>,
    unique_tasks: HashSet<(String, String)>,
    waiters: Vec<oneshot::Sender<()>>,
    control_rx: mpsc::UnboundedReceiver<ClientControl>,
    events_tx: broadcast::Sender<ClientEvent>,
}

impl ClientEngine {
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
                        Some(control) => self.on_control(control).await,
                    }
                }
            }
        }
    }

    /// Returns `true` if this command was fatal and the connection has
    /// already been shut down.
    async fn on_command(&mut self, cmd: Command) -> bool {
        if cmd.name() == "ERROR" {
            let code = cmd.field_str("code").unwrap_or_default();
            let text = cmd.field_str("text").unwrap_or_default();
            self.participant.end_blocking_action();
            if let Some(action) = self.queue.pop_for_error() {
                self.finish_action(action, Err(GearmanError::Server { code, text }));
            } else {
                tracing::warn!(code = %code, text = %text, "ERROR with nothing pending to correlate it to");
            }
            return false;
        }

        match self.queue.try_resolve(cmd) {
            Ok(MatchOutcome::Resolved(action, response)) => {
                self.participant.end_blocking_action();
                self.finish_action(action, Ok(response));
                false
            }
            Ok(MatchOutcome::NotCorrelated(cmd)) => {
                self.route_work_event(cmd);
                false
            }
            Err(e) => {
                self.shutdown(Some(e.into())).await;
                true
            }
        }
    }

    async fn on_control(&mut self, control: ClientControl) {
        match control {
            ClientControl::Submit(params, respond) => self.handle_submit(params, respond).await,
            ClientControl::SetOption(option, respond) => self.handle_set_option(option, respond).await,
            ClientControl::GetStatus(handle, respond) => self.handle_get_status(handle, respond).await,
            ClientControl::Cancel(handle) => self.finalize_task(&handle),
            ClientControl::Wait(respond) => self.handle_wait(respond),
            ClientControl::Ping(respond) => self.handle_ping(respond).await,
        }
    }

    async fn handle_submit(&mut self, params: SubmitParams, respond: oneshot::Sender<Result<Task, GearmanError>>) {
        let SubmitParams { function, workload, priority, mut unique_id, background } = params;
        if unique_id.is_empty() {
            unique_id = Uuid::new_v4().to_string();
        }

        if !background && self.unique_tasks.contains(&(function.clone(), unique_id.clone())) {
            let _ = respond.send(Err(GearmanError::DuplicateJob { function, unique_id }));
            return;
        }

        let cmd_name = priority.submit_command_name(background);
        let req = request(
            cmd_name,
            &[
                ("function_name", s(function.clone())),
                ("id", s(unique_id.clone())),
                ("data", workload.clone()),
            ],
        );

        if let Err(e) = self.participant.begin_blocking_action(req).await {
            let _ = respond.send(Err(e.into()));
            return;
        }

        if !background {
            // Reserved now, not after JOB_CREATED returns: a second submit
            // for the same (function, unique_id) arriving before this one
            // resolves must still be rejected.
            self.unique_tasks.insert((function.clone(), unique_id.clone()));
        }
        self.queue.push(
            &["JOB_CREATED"],
            PendingAction::JobCreated { function, workload, priority, unique_id, background, respond },
        );
    }

    async fn handle_set_option(&mut self, option: String, respond: oneshot::Sender<Result<(), GearmanError>>) {
        if option != "exceptions" {
            let _ = respond.send(Err(GearmanError::UnsupportedOption(option)));
            return;
        }
        let req = request("OPTION_REQ", &[("option_name", s(option.clone()))]);
        if let Err(e) = self.participant.begin_blocking_action(req).await {
            let _ = respond.send(Err(e.into()));
            return;
        }
        self.queue.push(&["OPTION_RES"], PendingAction::OptionAck { requested: option, respond });
    }

    async fn handle_get_status(&mut self, handle: String, respond: oneshot::Sender<Result<StatusEvent, GearmanError>>) {
        let req = request("GET_STATUS", &[("handle", s(handle.clone()))]);
        if let Err(e) = self.participant.begin_blocking_action(req).await {
            let _ = respond.send(Err(e.into()));
            return;
        }
        self.queue.push(&["STATUS_RES"], PendingAction::StatusAck { handle, respond });
    }

    async fn handle_ping(&mut self, respond: oneshot::Sender<Result<(), GearmanError>>) {
        let mut raw = [0u8; 16];
        for (i, b) in raw.iter_mut().enumerate() {
            *b = (rand::random::<u8>()).wrapping_add(i as u8);
        }
        let payload = Bytes::copy_from_slice(&raw);
        let req = request("ECHO_REQ", &[("data", payload.clone())]);
        if let Err(e) = self.participant.begin_blocking_action(req).await {
            let _ = respond.send(Err(e.into()));
            return;
        }
        self.queue.push(&["ECHO_RES"], PendingAction::PingAck { payload, respond });
    }

    fn handle_wait(&mut self, respond: oneshot::Sender<()>) {
        if self.is_idle() {
            let _ = respond.send(());
        } else {
            self.waiters.push(respond);
        }
    }

    fn finish_action(&mut self, action: PendingAction, result: Result<Command, GearmanError>) {
        match action {
            PendingAction::JobCreated { function, workload, priority, unique_id, background, respond } => {
                match result {
                    Ok(resp) => {
                        let handle = resp.field_str("handle").unwrap_or_default();
                        let (tx, rx) = mpsc::unbounded_channel();
                        if background {
                            drop(tx);
                        } else {
                            self.tasks.insert(
                                handle.clone(),
                                TaskSlot { function: function.clone(), unique_id: unique_id.clone(), sender: tx },
                            );
                        }
                        let _ = self.events_tx.send(ClientEvent::TaskSubmitted { handle: handle.clone() });
                        let task = Task::new(function, workload, handle, priority, unique_id, rx);
                        let _ = respond.send(Ok(task));
                    }
                    Err(e) => {
                        if !background {
                            self.unique_tasks.remove(&(function, unique_id));
                        }
                        let _ = respond.send(Err(e));
                    }
                }
            }
            PendingAction::OptionAck { requested, respond } => match result {
                Ok(resp) => {
                    let got = resp.field_str("option_name").unwrap_or_default();
                    if got == requested {
                        let _ = self.events_tx.send(ClientEvent::OptionSet(requested));
                        let _ = respond.send(Ok(()));
                    } else {
                        let err = ProtocolError::OptionMismatch { expected: requested, got };
                        let _ = respond.send(Err(err.into()));
                    }
                }
                Err(e) => {
                    let _ = respond.send(Err(e));
                }
            },
            PendingAction::StatusAck { handle, respond } => match result {
                Ok(resp) => {
                    let got_handle = resp.field_str("handle").unwrap_or_default();
                    if got_handle != handle {
                        let err = ProtocolError::HandleMismatch { expected: handle, got: got_handle };
                        let _ = respond.send(Err(err.into()));
                        return;
                    }
                    let known = resp.field_str("known").as_deref() == Some("1");
                    let running = resp.field_str("running").as_deref() == Some("1");
                    let numerator = resp.field_str("numerator").and_then(|v| v.parse().ok()).unwrap_or(0);
                    let denominator = resp.field_str("denominator").and_then(|v| v.parse().ok()).unwrap_or(0);
                    if let Some(slot) = self.tasks.get(&handle) {
                        let _ = slot.sender.send(TaskEvent::Status { numerator, denominator });
                    }
                    let event = StatusEvent { handle, known, running, numerator, denominator };
                    let _ = self.events_tx.send(ClientEvent::Status(event.clone()));
                    let _ = respond.send(Ok(event));
                }
                Err(e) => {
                    let _ = respond.send(Err(e));
                }
            },
            PendingAction::PingAck { payload, respond } => match result {
                Ok(resp) => {
                    let matches = resp.field("data").map(|d| d == &payload).unwrap_or(false);
                    let outcome = if matches { Ok(()) } else { Err(ProtocolError::EchoMismatch.into()) };
                    let _ = respond.send(outcome);
                }
                Err(e) => {
                    let _ = respond.send(Err(e));
                }
            },
        }
        self.recompute_gate();
    }

    fn route_work_event(&mut self, cmd: Command) {
        let Some(handle) = cmd.field_str("handle") else {
            return;
        };
        let Some(slot) = self.tasks.get(&handle) else {
            let _ = self.events_tx.send(ClientEvent::TaskUnknown { handle, command: cmd.name() });
            return;
        };

        let terminal = match cmd.name() {
            "WORK_COMPLETE" => {
                let data = cmd.field("data").cloned().unwrap_or_default();
                let _ = slot.sender.send(TaskEvent::Complete(data));
                true
            }
            "WORK_FAIL" => {
                let _ = slot.sender.send(TaskEvent::Failure);
                true
            }
            "WORK_EXCEPTION" => {
                let data = cmd.field("data").cloned().unwrap_or_default();
                let _ = slot.sender.send(TaskEvent::Exception(data));
                true
            }
            "WORK_DATA" => {
                let data = cmd.field("data").cloned().unwrap_or_default();
                let _ = slot.sender.send(TaskEvent::Data(data));
                false
            }
            "WORK_WARNING" => {
                let data = cmd.field("data").cloned().unwrap_or_default();
                let _ = slot.sender.send(TaskEvent::Warning(data));
                false
            }
            "WORK_STATUS" => {
                let numerator = cmd.field_str("numerator").and_then(|v| v.parse().ok()).unwrap_or(0);
                let denominator = cmd.field_str("denominator").and_then(|v| v.parse().ok()).unwrap_or(0);
                let _ = slot.sender.send(TaskEvent::Status { numerator, denominator });
                false
            }
            other => {
                tracing::warn!(command = %other, %handle, "unexpected command routed as a work event");
                false
            }
        };

        if terminal {
            self.finalize_task(&handle);
        }
    }

    fn finalize_task(&mut self, handle: &str) {
        if let Some(slot) = self.tasks.remove(handle) {
            self.unique_tasks.remove(&(slot.function, slot.unique_id));
        }
        self.recompute_gate();
    }

    fn is_idle(&self) -> bool {
        self.participant.pending_blocking_actions() == 0 && self.tasks.is_empty()
    }

    fn recompute_gate(&mut self) {
        if self.is_idle() {
            self.participant.connection.pause();
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        } else {
            self.participant.connection.resume();
        }
    }

    async fn shutdown(&mut self, err: Option<GearmanError>) {
        if let Some(err) = &err {
            let _ = self.events_tx.send(ClientEvent::Error(err.to_string()));
        }
        for action in self.queue.drain_all() {
            self.finish_action(action, Err(GearmanError::ConnectionClosed));
        }
        for (_, slot) in self.tasks.drain() {
            let _ = slot.sender.send(TaskEvent::Exception(Bytes::from_static(b"Lost connection")));
        }
        self.unique_tasks.clear();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
        let _ = self.events_tx.send(ClientEvent::Close);
    }
}
