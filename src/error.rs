//! Error taxonomy for the Gearman protocol engine.
//!
//! Protocol violations are fatal to the connection, server errors and
//! duplicate-job rejections are scoped to a single caller, and the rest
//! are raised by the `create_client`/`create_worker` factories or
//! surfaced after close.

use std::{error, fmt, io};

/// Top-level error type returned by every fallible public operation.
#[derive(Debug)]
pub enum GearmanError {
    /// Invalid magic/code, truncated-but-unrecoverable framing, or a
    /// response that violates FIFO correlation. Fatal to the connection.
    Protocol(ProtocolError),
    /// The server sent an `ERROR` command correlated to this caller's
    /// request.
    Server { code: String, text: String },
    /// A foreground submit was rejected locally because `(function,
    /// unique_id)` is already in flight on this client.
    DuplicateJob { function: String, unique_id: String },
    /// `set_option` was called with anything other than `"exceptions"`.
    UnsupportedOption(String),
    /// The catalog has no command type with this name or code.
    UnknownCommand(String),
    /// `Command::create` was given a field set that does not match the
    /// type's schema.
    ArgumentMismatch { command: &'static str, detail: String },
    /// The connection closed with this action or task still outstanding.
    ConnectionClosed,
    /// A transport-level I/O failure on an already-established connection.
    Io(io::Error),
    /// `create_client`/`create_worker` failed to establish the connection.
    Dial(io::Error),
    /// The initial handshake ping performed by the factory failed.
    Ping(Box<GearmanError>),
    /// A job operation was attempted after the job already reached a
    /// terminal verdict (complete/fail/exception).
    InvalidJobState,
}

impl fmt::Display for GearmanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(e) => write!(f, "protocol error: {e}"),
            Self::Server { code, text } => write!(f, "server error {code}: {text}"),
            Self::DuplicateJob { function, unique_id } => write!(
                f,
                "duplicate job: function={function:?} unique_id={unique_id:?} already in flight"
            ),
            Self::UnsupportedOption(opt) => write!(f, "unsupported option: {opt:?}"),
            Self::UnknownCommand(name) => write!(f, "unknown command type: {name:?}"),
            Self::ArgumentMismatch { command, detail } => {
                write!(f, "argument mismatch for {command}: {detail}")
            },
            Self::ConnectionClosed => write!(f, "connection closed"),
            Self::Io(e) => write!(f, "i/o error: {e}"),
            Self::Dial(e) => write!(f, "failed to connect: {e}"),
            Self::Ping(e) => write!(f, "initial handshake ping failed: {e}"),
            Self::InvalidJobState => write!(f, "job already reached a terminal verdict"),
        }
    }
}

impl error::Error for GearmanError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Protocol(e) => Some(e),
            Self::Io(e) | Self::Dial(e) => Some(e),
            Self::Ping(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<ProtocolError> for GearmanError {
    fn from(value: ProtocolError) -> Self {
        Self::Protocol(value)
    }
}

impl From<io::Error> for GearmanError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

/// Framing- and correlation-level violations. Closing the connection after
/// any of these is the caller's (engine's) responsibility, not this type's.
#[derive(Debug)]
pub enum ProtocolError {
    BadMagic([u8; 4]),
    UnknownCode(u32),
    TruncatedPayload { expected_fields: usize, got: usize },
    UnexpectedResponse { expected: Vec<&'static str>, got: &'static str },
    HandleMismatch { expected: String, got: String },
    OptionMismatch { expected: String, got: String },
    EchoMismatch,
    Io(io::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic(bytes) => write!(f, "unrecognized frame magic {bytes:?}"),
            Self::UnknownCode(code) => write!(f, "unrecognized command code {code}"),
            Self::TruncatedPayload { expected_fields, got } => write!(
                f,
                "payload had {got} fields, expected {expected_fields}"
            ),
            Self::UnexpectedResponse { expected, got } => write!(
                f,
                "expected one of {expected:?} at head of blocking queue, got {got}"
            ),
            Self::HandleMismatch { expected, got } => {
                write!(f, "response handle {got:?} did not match request handle {expected:?}")
            },
            Self::OptionMismatch { expected, got } => {
                write!(f, "OPTION_RES named {got:?}, expected {expected:?}")
            },
            Self::EchoMismatch => write!(f, "ECHO_RES payload did not match ECHO_REQ"),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}
