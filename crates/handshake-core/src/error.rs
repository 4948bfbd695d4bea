//! Error taxonomy shared by every layer of a workflow run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error, raised before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("Host must not be empty")]
    EmptyHost,
    #[error("Port out of range [1, 65535]: {0}")]
    InvalidPort(i64),
    #[error("Unknown protocol version: {0}")]
    UnknownProtocolVersion(String),
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("At least one algorithm must be configured")]
    NoAlgorithms,
    #[error("Invalid configuration document: {0}")]
    Parse(String),
    #[error("Failed to read configuration: {0}")]
    Io(String),
}

/// Transport-level failure reported by a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TransportError {
    #[error("Timed out")]
    Timeout,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection reset by peer")]
    ConnectionReset,
    #[error("Connection closed")]
    Closed,
    /// `send`/`receive` called outside the `Connected` state.
    #[error("Connection is not open")]
    NotConnected,
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Self::Timeout,
            ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                Self::ConnectionReset
            }
            ErrorKind::UnexpectedEof | ErrorKind::NotConnected => Self::Closed,
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Message codec failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Malformed message: {0}")]
    Malformed(String),
    #[error("Message of {len} bytes exceeds limit of {max}")]
    Oversized { len: usize, max: usize },
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Content-level failure: the peer said something we could not accept.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProtocolError {
    #[error("Failed to parse message: {message}")]
    Parse { message: String },
    #[error("Failed to serialize message: {message}")]
    Serialize { message: String },
    #[error("Unexpected message kind {actual}, expected {expected}")]
    UnexpectedKind { expected: String, actual: String },
    #[error("Session state rejected update: {message}")]
    State { message: String },
}

/// Attempted to mutate a context after its run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ContextError {
    #[error("Context is terminated and read-only")]
    Terminated,
}

/// Why an action failed. Recorded in the trace and the execution result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ActionError {
    #[error("Transport error: {error}")]
    Transport { error: TransportError },
    #[error("Protocol error: {error}")]
    Protocol { error: ProtocolError },
    #[error("Run cancelled")]
    Cancelled,
}

impl From<TransportError> for ActionError {
    fn from(error: TransportError) -> Self {
        Self::Transport { error }
    }
}

impl From<ProtocolError> for ActionError {
    fn from(error: ProtocolError) -> Self {
        Self::Protocol { error }
    }
}

impl ActionError {
    /// Transport error carried by this failure, if any.
    #[must_use]
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { error } => Some(error),
            _ => None,
        }
    }

    /// Protocol error carried by this failure, if any.
    #[must_use]
    pub const fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Self::Protocol { error } => Some(error),
            _ => None,
        }
    }
}
