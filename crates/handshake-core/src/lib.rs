//! Core abstractions for scripted handshake workflows.
//!
//! This crate provides the fundamental building blocks:
//! - `Context` - Negotiated state and message log of one run
//! - `ProtocolMessage` / `MessageCodec` - The message collaborator contract
//! - `Config` / `Registry` - Client configuration and its validation
//! - The error taxonomy shared by transport and executor

pub mod config;
pub mod context;
pub mod encoding;
pub mod error;
pub mod message;
pub mod registry;

pub use config::{Config, ConnectionConfig, ValidatedConfig};
pub use context::{Context, Direction, ExchangedMessage, RunId, RunState};
pub use error::{
    ActionError, CodecError, ConfigError, ContextError, ProtocolError, TransportError,
};
pub use message::{MessageCodec, Parsed, ProtocolMessage};
pub use registry::{AlgorithmId, ProtocolVersion, Registry};
