//! Session context shared by the actions of one workflow run.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    encoding::base64_bytes,
    error::ContextError,
    registry::{AlgorithmId, ProtocolVersion},
};

/// Run identifier.
pub type RunId = Uuid;

/// Direction of an exchanged message, seen from our side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

/// Raw bytes of one message as it crossed the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangedMessage {
    /// Whether we wrote or read the message.
    pub direction: Direction,
    /// Sequence number within its direction, starting at zero.
    pub sequence: u64,
    /// Raw bytes as they crossed the wire.
    #[serde(with = "base64_bytes")]
    pub bytes: Bytes,
}

/// Whether the context still accepts mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Active,
    Terminated,
}

/// Negotiated and derived state of one run.
///
/// Every mutator fails with `ContextError::Terminated` once the executor has
/// ended the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    id: RunId,
    protocol_version: Option<ProtocolVersion>,
    selected_algorithm: Option<AlgorithmId>,
    send_sequence: u64,
    receive_sequence: u64,
    log: Vec<ExchangedMessage>,
    /// Arbitrary derived values (keys, nonces, peer details).
    #[serde(default)]
    metadata: HashMap<String, Value>,
    state: RunState,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create a fresh, active context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol_version: None,
            selected_algorithm: None,
            send_sequence: 0,
            receive_sequence: 0,
            log: Vec::new(),
            metadata: HashMap::new(),
            state: RunState::Active,
        }
    }

    #[must_use]
    pub const fn id(&self) -> RunId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == RunState::Active
    }

    #[must_use]
    pub const fn protocol_version(&self) -> Option<&ProtocolVersion> {
        self.protocol_version.as_ref()
    }

    #[must_use]
    pub const fn selected_algorithm(&self) -> Option<&AlgorithmId> {
        self.selected_algorithm.as_ref()
    }

    #[must_use]
    pub const fn send_sequence(&self) -> u64 {
        self.send_sequence
    }

    #[must_use]
    pub const fn receive_sequence(&self) -> u64 {
        self.receive_sequence
    }

    /// Ordered log of every message sent or received.
    #[must_use]
    pub fn log(&self) -> &[ExchangedMessage] {
        &self.log
    }

    /// Get a metadata value by key.
    #[must_use]
    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Start (or restart) a run. A reused context keeps its negotiated state.
    pub const fn activate(&mut self) {
        self.state = RunState::Active;
    }

    /// End the run; the context becomes read-only.
    pub const fn terminate(&mut self) {
        self.state = RunState::Terminated;
    }

    const fn ensure_active(&self) -> Result<(), ContextError> {
        match self.state {
            RunState::Active => Ok(()),
            RunState::Terminated => Err(ContextError::Terminated),
        }
    }

    /// Record the negotiated protocol version.
    ///
    /// # Errors
    /// Returns error if the run has terminated.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) -> Result<(), ContextError> {
        self.ensure_active()?;
        self.protocol_version = Some(version);
        Ok(())
    }

    /// Record the selected algorithm.
    ///
    /// # Errors
    /// Returns error if the run has terminated.
    pub fn set_selected_algorithm(&mut self, algorithm: AlgorithmId) -> Result<(), ContextError> {
        self.ensure_active()?;
        self.selected_algorithm = Some(algorithm);
        Ok(())
    }

    /// Set a metadata value.
    ///
    /// # Errors
    /// Returns error if the run has terminated.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) -> Result<(), ContextError> {
        self.ensure_active()?;
        self.metadata.insert(key.into(), value);
        Ok(())
    }

    /// Append a message to the log and advance the sequence number of its
    /// direction. Returns the sequence number the message was logged under.
    ///
    /// # Errors
    /// Returns error if the run has terminated.
    pub fn record(&mut self, direction: Direction, bytes: Bytes) -> Result<u64, ContextError> {
        self.ensure_active()?;
        let counter = match direction {
            Direction::Sent => &mut self.send_sequence,
            Direction::Received => &mut self.receive_sequence,
        };
        let sequence = *counter;
        *counter += 1;
        self.log.push(ExchangedMessage {
            direction,
            sequence,
            bytes,
        });
        Ok(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_advances_per_direction() {
        let mut ctx = Context::new();
        assert_eq!(ctx.record(Direction::Sent, Bytes::from_static(b"a")), Ok(0));
        assert_eq!(ctx.record(Direction::Received, Bytes::from_static(b"b")), Ok(0));
        assert_eq!(ctx.record(Direction::Sent, Bytes::from_static(b"c")), Ok(1));

        assert_eq!(ctx.send_sequence(), 2);
        assert_eq!(ctx.receive_sequence(), 1);
        let directions: Vec<Direction> = ctx.log().iter().map(|m| m.direction).collect();
        assert_eq!(
            directions,
            vec![Direction::Sent, Direction::Received, Direction::Sent]
        );
    }

    #[test]
    fn test_terminated_context_is_read_only() {
        let mut ctx = Context::new();
        ctx.set_selected_algorithm(AlgorithmId::new("X", 1)).unwrap();
        ctx.terminate();

        assert_eq!(
            ctx.set_protocol_version(ProtocolVersion::new("TLS12", 0x0303)),
            Err(ContextError::Terminated)
        );
        assert_eq!(
            ctx.record(Direction::Sent, Bytes::new()),
            Err(ContextError::Terminated)
        );
        assert_eq!(
            ctx.set_metadata("k", Value::Bool(true)),
            Err(ContextError::Terminated)
        );
        assert!(ctx.log().is_empty());
        assert_eq!(ctx.selected_algorithm().map(|a| a.code), Some(1));

        ctx.activate();
        assert!(ctx.set_metadata("k", Value::Bool(true)).is_ok());
        assert_eq!(ctx.get_metadata("k"), Some(&Value::Bool(true)));
    }
}
