//! Message and codec traits consumed by the workflow executor.
//!
//! The executor never looks inside a message: it asks the codec to turn
//! messages into bytes and bytes back into messages, and compares messages
//! only by their kind.

use std::{fmt::Debug, hash::Hash};

use bytes::Bytes;

use crate::{
    context::{Context, Direction},
    error::CodecError,
};

/// A protocol message with a kind discriminant.
pub trait ProtocolMessage: Clone + Debug + Send + Sync + 'static {
    /// Discriminant used for matching and inspection.
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// The kind of this message.
    fn kind(&self) -> Self::Kind;
}

/// Result of feeding bytes to a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed<M> {
    /// One message was decoded from the first `consumed` bytes.
    Complete { message: M, consumed: usize },
    /// The buffer holds a prefix of a message.
    Incomplete,
}

/// Wire encoding for a message type.
pub trait MessageCodec: Send + Sync {
    type Message: ProtocolMessage;

    /// Encode one message using the current session state.
    ///
    /// # Errors
    /// Returns error if the message cannot be encoded.
    fn serialize(&self, message: &Self::Message, ctx: &Context) -> Result<Bytes, CodecError>;

    /// Decode one message from the front of `buf`.
    ///
    /// # Errors
    /// Returns error if the bytes cannot be a valid message.
    fn parse(&self, buf: &[u8], ctx: &Context) -> Result<Parsed<Self::Message>, CodecError>;

    /// Update negotiated state after a message was sent or received.
    ///
    /// # Errors
    /// Returns error if the message content is inconsistent with the session.
    fn adjust_context(
        &self,
        _message: &Self::Message,
        _direction: Direction,
        _ctx: &mut Context,
    ) -> Result<(), CodecError> {
        Ok(())
    }
}
