//! Shared request/response correlation used by both Client and Worker.
//!
//! Implements a "blocking action" pattern: the connection plus a
//! pending-action counter live here; the FIFO queue of in-flight RPC
//! descriptors is kept by each engine (`BlockingQueue<A>`) because only
//! the engine knows what to do once an entry resolves (build a `Task`,
//! populate a `StatusEvent`, ...). Matching against the queue head is
//! still the single algorithm in [`BlockingQueue::try_resolve`].

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::connection::Connection;
use crate::error::ProtocolError;
use crate::wire::command::Command;

/// Command names that are ever the expected response of a blocking action.
/// Anything else arriving over the wire is routed by the caller instead of
/// being treated as RPC correlation (work events, for example).
const CORRELATED_RESPONSE_NAMES: &[&str] = &[
    "JOB_CREATED",
    "STATUS_RES",
    "OPTION_RES",
    "ECHO_RES",
    "JOB_ASSIGN",
    "JOB_ASSIGN_UNIQ",
    "NO_JOB",
    "NOOP",
];

/// Shared base for `Client` and `Worker` engines: owns the connection and
/// the count of outstanding blocking actions that gates it (Worker never
/// gates on this, only Client does).
pub(crate) struct Participant<T> {
    pub(crate) connection: Connection<T>,
    pending: usize,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Participant<T> {
    pub(crate) fn new(connection: Connection<T>) -> Self {
        Participant { connection, pending: 0 }
    }

    pub(crate) fn pending_blocking_actions(&self) -> usize {
        self.pending
    }

    /// Sends `req`, resuming the readable side for the duration of the
    /// call. The caller is responsible for pushing a correlated entry
    /// onto its own [`BlockingQueue`] right after this returns `Ok`.
    pub(crate) async fn begin_blocking_action(&mut self, req: Command) -> Result<(), ProtocolError> {
        self.pending += 1;
        self.connection.resume();
        self.connection.send(req).await
    }

    /// Called once a queue entry resolves, whether by a matched response
    /// or by an `ERROR`.
    pub(crate) fn end_blocking_action(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }
}

/// Outcome of matching one decoded command against a [`BlockingQueue`].
pub(crate) enum MatchOutcome<A> {
    /// `cmd`'s type is never a blocking-action response; route it
    /// elsewhere (work events, unsolicited notifications).
    NotCorrelated(Command),
    /// `cmd` resolved the head of the queue.
    Resolved(A, Command),
}

/// FIFO queue of (expected response names, opaque continuation) pairs.
/// Strictly head-matched: a correlated response whose name isn't in the
/// head's expected set is a protocol error.
pub(crate) struct BlockingQueue<A> {
    entries: VecDeque<(&'static [&'static str], A)>,
}

impl<A> Default for BlockingQueue<A> {
    fn default() -> Self {
        BlockingQueue { entries: VecDeque::new() }
    }
}

impl<A> BlockingQueue<A> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, expected: &'static [&'static str], action: A) {
        self.entries.push_back((expected, action));
    }

    pub(crate) fn try_resolve(&mut self, cmd: Command) -> Result<MatchOutcome<A>, ProtocolError> {
        if !CORRELATED_RESPONSE_NAMES.contains(&cmd.name()) {
            return Ok(MatchOutcome::NotCorrelated(cmd));
        }

        let Some((expected, _)) = self.entries.front() else {
            return Err(ProtocolError::UnexpectedResponse { expected: Vec::new(), got: cmd.name() });
        };
        if !expected.contains(&cmd.name()) {
            return Err(ProtocolError::UnexpectedResponse {
                expected: expected.to_vec(),
                got: cmd.name(),
            });
        }

        let (_, action) = self.entries.pop_front().expect("front checked above");
        Ok(MatchOutcome::Resolved(action, cmd))
    }

    /// Pops the head unconditionally, for correlating an `ERROR` response
    /// (any blocking action can fail with one, regardless of its expected
    /// response names).
    pub(crate) fn pop_for_error(&mut self) -> Option<A> {
        self.entries.pop_front().map(|(_, a)| a)
    }

    pub(crate) fn drain_all(&mut self) -> Vec<A> {
        self.entries.drain(..).map(|(_, a)| a).collect()
    }
}
