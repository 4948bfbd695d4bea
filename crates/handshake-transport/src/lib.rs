//! Connection layer and reference message codec for handshake workflows.
//!
//! Provides:
//! - `Connection` - Byte-level transport trait with an explicit lifecycle
//! - `TcpConnection` - tokio TCP implementation
//! - `MemoryConnection` - Scripted peer (feature: memory)
//! - `TlvCodec` - Type-length-value message framing

pub mod connection;
pub mod tcp;
pub mod tlv;

#[cfg(feature = "memory")]
pub mod memory;

pub use connection::{Connection, ConnectionState, ConnectionStats};
pub use tcp::TcpConnection;
pub use tlv::{TlvCodec, TlvMessage};

#[cfg(feature = "memory")]
pub use memory::{ConnectionProbe, MemoryConnection, PeerEvent};
