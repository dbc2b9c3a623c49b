//! A client/worker library for the binary Gearman job-server protocol.
//!
//! The two entry points are [`create_client`] and [`create_worker`]: each
//! dials `host:port`, performs the initial handshake ping, and returns a
//! cheap, `Clone`-able handle backed by a single task that owns the
//! connection (`Client`/`Worker`). Submitting jobs, registering functions,
//! and receiving work events all happen through that handle without the
//! caller ever touching the socket directly.
//!
//! ```no_run
//! # async fn run() -> Result<(), gearman_rs::GearmanError> {
//! let client = gearman_rs::create_client("127.0.0.1", 4730).await?;
//! let mut task = client.submit("reverse", "hello").await?;
//! while let Some(event) = task.next_event().await {
//!     tracing::debug!(?event, "task event");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod error;
mod participant;
mod priority;
mod worker;
mod wire;

pub use client::{create_client, Client, ClientBuilder, ClientEvent, StatusEvent, Task, TaskEvent};
pub use error::{GearmanError, ProtocolError};
pub use priority::Priority;
pub use worker::{create_worker, Job, Worker, WorkerBuilder, WorkerEvent};
pub use wire::command::{Command, Magic};
pub use wire::catalog;
pub use wire::catalog::{CommandKind, FieldSpec};
