//! Transport abstraction used by the workflow executor.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use handshake_core::{ConnectionConfig, TransportError};
use serde::{Deserialize, Serialize};

/// Connection lifecycle.
///
/// ```text
/// ┌─────────────┐ connect ┌───────────┐ close ┌────────┐
/// │ Unconnected │────────>│ Connected │──────>│ Closed │
/// └─────────────┘         └───────────┘       └────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconnected,
    Connected,
    /// Terminal.
    Closed,
}

/// Byte counters of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStats {
    /// Bytes written to the peer.
    pub bytes_sent: u64,
    /// Bytes read from the peer.
    pub bytes_received: u64,
}

/// A byte-oriented connection to one remote peer.
///
/// `send` and `receive` are only valid in `Connected`; anywhere else they
/// return `TransportError::NotConnected` without touching the network.
#[async_trait]
pub trait Connection: Send {
    /// Parameters this connection was created with.
    fn config(&self) -> &ConnectionConfig;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Bytes moved so far.
    fn stats(&self) -> ConnectionStats;

    /// Open the connection. A no-op when already connected.
    ///
    /// # Errors
    /// Returns error if the peer cannot be reached within the configured
    /// timeout, or if the connection was already closed.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Write all of `bytes`.
    ///
    /// # Errors
    /// Returns error if the write fails.
    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next chunk of bytes from the peer.
    ///
    /// # Errors
    /// Returns `Timeout` if nothing arrives in time and `Closed` once the
    /// peer has shut down its side.
    async fn receive(&mut self, timeout: Duration) -> Result<Bytes, TransportError>;

    /// Release the connection. Idempotent; the state becomes `Closed`.
    fn close(&mut self);
}

/// Shared precondition check for implementations.
pub(crate) const fn ensure_connected(state: ConnectionState) -> Result<(), TransportError> {
    match state {
        ConnectionState::Connected => Ok(()),
        ConnectionState::Unconnected | ConnectionState::Closed => Err(TransportError::NotConnected),
    }
}
