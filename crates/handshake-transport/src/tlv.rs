//! Reference type-length-value message codec.
//!
//! Wire format of one message:
//!
//! ```text
//! ┌──────────┬──────────────────┬─────────────┐
//! │ kind: u8 │ length: u24 (BE) │ payload ... │
//! └──────────┴──────────────────┴─────────────┘
//! ```
//!
//! The codec can also track a "hello reply" kind whose payload begins with
//! the negotiated protocol version (u16) and algorithm code (u16); receiving
//! one records both in the session context.

use bytes::{BufMut, Bytes, BytesMut};
use handshake_core::{
    AlgorithmId, CodecError, Context, Direction, MessageCodec, Parsed, ProtocolMessage,
    ProtocolVersion, Registry, encoding::base64_bytes,
};
use serde::{Deserialize, Serialize};

/// Header size: one kind byte plus a 24-bit length.
pub const HEADER_LEN: usize = 4;

/// Largest payload a 24-bit length can describe.
pub const MAX_PAYLOAD: usize = 0x00FF_FFFF;

/// A message with a one-byte kind and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlvMessage {
    /// First byte of the frame.
    pub kind: u8,
    /// Frame body, at most 2^24 - 1 bytes.
    #[serde(with = "base64_bytes")]
    pub payload: Bytes,
}

impl TlvMessage {
    #[must_use]
    pub fn new(kind: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A message with an empty payload.
    #[must_use]
    pub const fn empty(kind: u8) -> Self {
        Self {
            kind,
            payload: Bytes::new(),
        }
    }
}

impl ProtocolMessage for TlvMessage {
    type Kind = u8;

    fn kind(&self) -> u8 {
        self.kind
    }
}

/// Codec for `TlvMessage`.
#[derive(Debug, Clone)]
pub struct TlvCodec {
    registry: Registry,
    hello_reply: Option<u8>,
    max_payload: usize,
}

impl Default for TlvCodec {
    fn default() -> Self {
        Self::new(Registry::default())
    }
}

impl TlvCodec {
    /// Create a codec that resolves negotiated values against `registry`.
    #[must_use]
    pub const fn new(registry: Registry) -> Self {
        Self {
            registry,
            hello_reply: None,
            max_payload: MAX_PAYLOAD,
        }
    }

    /// Treat received messages of `kind` as the peer's hello reply.
    #[must_use]
    pub fn with_hello_reply(mut self, kind: u8) -> Self {
        self.hello_reply = Some(kind);
        self
    }

    /// Lower the payload size limit.
    #[must_use]
    pub fn with_max_payload(mut self, max: usize) -> Self {
        self.max_payload = max.min(MAX_PAYLOAD);
        self
    }

    fn record_hello_reply(&self, payload: &[u8], ctx: &mut Context) -> Result<(), CodecError> {
        let [v0, v1, a0, a1, ..] = payload else {
            return Err(CodecError::Malformed(format!(
                "hello reply needs 4 bytes, got {}",
                payload.len()
            )));
        };
        let wire = u16::from_be_bytes([*v0, *v1]);
        let code = u16::from_be_bytes([*a0, *a1]);

        let version = self
            .registry
            .version_by_wire(wire)
            .cloned()
            .unwrap_or_else(|| ProtocolVersion::new(format!("0x{wire:04X}"), wire));
        let algorithm = self
            .registry
            .algorithm_by_code(code)
            .cloned()
            .unwrap_or_else(|| AlgorithmId::new("UNKNOWN", code));

        tracing::debug!(version = %version, algorithm = %algorithm, "Peer selected parameters");
        ctx.set_protocol_version(version)?;
        ctx.set_selected_algorithm(algorithm)?;
        Ok(())
    }
}

impl MessageCodec for TlvCodec {
    type Message = TlvMessage;

    fn serialize(&self, message: &TlvMessage, _ctx: &Context) -> Result<Bytes, CodecError> {
        let len = message.payload.len();
        if len > self.max_payload {
            return Err(CodecError::Oversized {
                len,
                max: self.max_payload,
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + len);
        buf.put_u8(message.kind);
        buf.put_uint(len as u64, 3);
        buf.put_slice(&message.payload);
        Ok(buf.freeze())
    }

    fn parse(&self, buf: &[u8], _ctx: &Context) -> Result<Parsed<TlvMessage>, CodecError> {
        let [kind, l0, l1, l2, ..] = buf else {
            return Ok(Parsed::Incomplete);
        };
        let len = (usize::from(*l0) << 16) | (usize::from(*l1) << 8) | usize::from(*l2);
        if len > self.max_payload {
            return Err(CodecError::Oversized {
                len,
                max: self.max_payload,
            });
        }
        let Some(payload) = buf.get(HEADER_LEN..HEADER_LEN + len) else {
            return Ok(Parsed::Incomplete);
        };
        Ok(Parsed::Complete {
            message: TlvMessage::new(*kind, Bytes::copy_from_slice(payload)),
            consumed: HEADER_LEN + len,
        })
    }

    fn adjust_context(
        &self,
        message: &TlvMessage,
        direction: Direction,
        ctx: &mut Context,
    ) -> Result<(), CodecError> {
        if direction == Direction::Received && self.hello_reply == Some(message.kind) {
            self.record_hello_reply(&message.payload, ctx)?;
        }
        Ok(())
    }
}
