//! State of one in-flight run: the owned connection, the inbound buffer,
//! and the bodies of the individual action variants.

use std::{
    ops::{Deref, DerefMut},
    time::Duration,
};

use bytes::BytesMut;
use handshake_core::{
    ActionError, CodecError, Context, ContextError, Direction, MessageCodec, Parsed,
    ProtocolError, ProtocolMessage, TransportError,
};
use handshake_transport::{Connection, ConnectionState, ConnectionStats};
use tokio::time::Instant;

use crate::{
    abort::AbortSignal,
    action::{ActionOutcome, Expect},
};

type Message<C> = <C as MessageCodec>::Message;

/// Stand-in deadline for timeouts too large to add to `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Activates a context for the run and terminates it however the run ends,
/// including when the run future is dropped.
pub(crate) struct ContextGuard<'a> {
    ctx: &'a mut Context,
}

impl<'a> ContextGuard<'a> {
    pub(crate) fn activate(ctx: &'a mut Context) -> Self {
        ctx.activate();
        Self { ctx }
    }
}

impl Deref for ContextGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.ctx.terminate();
    }
}

/// Owns the connection for the lifetime of a run and closes it however the
/// run ends, including when the run future is dropped.
pub(crate) struct ConnectionGuard<T: Connection> {
    inner: T,
}

impl<T: Connection> ConnectionGuard<T> {
    pub(crate) const fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Close now and report final counters.
    pub(crate) fn release(&mut self) -> ConnectionStats {
        self.inner.close();
        self.inner.stats()
    }
}

impl<T: Connection> Drop for ConnectionGuard<T> {
    fn drop(&mut self) {
        if self.inner.state() != ConnectionState::Closed {
            tracing::debug!("Run ended early; closing connection");
            self.inner.close();
        }
    }
}

pub(crate) struct Run<'c, C: MessageCodec, T: Connection> {
    codec: &'c C,
    conn: ConnectionGuard<T>,
    inbound: BytesMut,
    timeout: Duration,
}

impl<'c, C: MessageCodec, T: Connection> Run<'c, C, T> {
    pub(crate) fn new(codec: &'c C, conn: T) -> Self {
        let timeout = conn.config().timeout;
        Self {
            codec,
            conn: ConnectionGuard::new(conn),
            inbound: BytesMut::new(),
            timeout,
        }
    }

    pub(crate) fn release(&mut self) -> ConnectionStats {
        self.conn.release()
    }

    /// Connect if this is the first network action of the run.
    pub(crate) async fn open(&mut self) -> Result<(), TransportError> {
        if self.conn.inner.state() == ConnectionState::Unconnected {
            let config = self.conn.inner.config();
            tracing::debug!(host = %config.host, port = config.port, "Opening connection");
        }
        self.conn.inner.connect().await
    }

    fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.timeout).unwrap_or_else(|| now + FAR_FUTURE)
    }

    pub(crate) async fn send(
        &mut self,
        messages: &[Message<C>],
        ctx: &mut Context,
        outcome: &mut ActionOutcome<Message<C>>,
    ) -> Result<(), ActionError> {
        for message in messages {
            let bytes = self
                .codec
                .serialize(message, ctx)
                .map_err(serialize_error)?;
            self.conn.inner.send(&bytes).await?;
            let sequence = ctx.record(Direction::Sent, bytes).map_err(state_error)?;
            let adjusted = self.codec.adjust_context(message, Direction::Sent, ctx);
            outcome.sent.push(message.clone());
            adjusted.map_err(serialize_error)?;
            tracing::trace!(kind = ?message.kind(), sequence, "Sent message");
        }
        Ok(())
    }

    pub(crate) async fn receive(
        &mut self,
        expected: &Expect<<Message<C> as ProtocolMessage>::Kind>,
        ctx: &mut Context,
        outcome: &mut ActionOutcome<Message<C>>,
    ) -> Result<(), ActionError> {
        let deadline = self.deadline();

        loop {
            match self.codec.parse(&self.inbound, ctx).map_err(parse_error)? {
                Parsed::Complete { message, consumed } => {
                    let raw = self.inbound.split_to(consumed).freeze();
                    ctx.record(Direction::Received, raw).map_err(state_error)?;
                    let adjusted = self
                        .codec
                        .adjust_context(&message, Direction::Received, ctx);

                    let kind = message.kind();
                    outcome.received.push(message);
                    adjusted.map_err(parse_error)?;
                    if expected.matches(&kind) {
                        tracing::trace!(?kind, "Received expected message");
                        return Ok(());
                    }
                    return Err(ProtocolError::UnexpectedKind {
                        expected: describe(expected),
                        actual: format!("{kind:?}"),
                    }
                    .into());
                }
                Parsed::Incomplete => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let chunk = self.conn.inner.receive(remaining).await?;
                    self.inbound.extend_from_slice(&chunk);
                }
            }
        }
    }

    /// Never fails on content: unparseable bytes land in `outcome.unparsed`.
    pub(crate) async fn generic_receive(
        &mut self,
        ctx: &mut Context,
        outcome: &mut ActionOutcome<Message<C>>,
    ) -> Result<(), ActionError> {
        let deadline = self.deadline();
        let mut garbage = BytesMut::new();

        loop {
            self.absorb(ctx, outcome, &mut garbage);

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.conn.inner.receive(remaining).await {
                Ok(chunk) => self.inbound.extend_from_slice(&chunk),
                Err(TransportError::Timeout) => break,
                Err(TransportError::Closed) => {
                    tracing::debug!("Peer closed during generic receive");
                    break;
                }
                Err(e) => {
                    self.absorb(ctx, outcome, &mut garbage);
                    outcome.unparsed = garbage.freeze();
                    return Err(e.into());
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        self.absorb(ctx, outcome, &mut garbage);
        outcome.unparsed = garbage.freeze();
        Ok(())
    }

    /// Parse every complete message out of the inbound buffer. Once the
    /// stream stops parsing, everything after that point is garbage.
    fn absorb(
        &mut self,
        ctx: &mut Context,
        outcome: &mut ActionOutcome<Message<C>>,
        garbage: &mut BytesMut,
    ) {
        if !garbage.is_empty() {
            garbage.extend_from_slice(&self.inbound.split());
            return;
        }

        loop {
            match self.codec.parse(&self.inbound, ctx) {
                Ok(Parsed::Complete { message, consumed }) => {
                    let raw = self.inbound.split_to(consumed).freeze();
                    if let Err(e) = ctx.record(Direction::Received, raw) {
                        tracing::warn!("Dropping received message: {e}");
                    }
                    if let Err(e) = self
                        .codec
                        .adjust_context(&message, Direction::Received, ctx)
                    {
                        tracing::warn!(kind = ?message.kind(), "Ignoring inconsistent message: {e}");
                    }
                    outcome.received.push(message);
                }
                Ok(Parsed::Incomplete) => return,
                Err(e) => {
                    tracing::warn!(
                        bytes = self.inbound.len(),
                        "Unparseable data from peer, keeping raw: {e}"
                    );
                    garbage.extend_from_slice(&self.inbound.split());
                    return;
                }
            }
        }
    }
}

/// Suspend for `duration`, cut short by an abort request.
pub(crate) async fn wait(
    duration: Duration,
    abort: Option<&mut AbortSignal>,
) -> Result<(), ActionError> {
    match abort {
        Some(signal) => {
            tokio::select! {
                () = tokio::time::sleep(duration) => Ok(()),
                () = signal.aborted() => Err(ActionError::Cancelled),
            }
        }
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

fn describe<K: std::fmt::Debug>(expected: &Expect<K>) -> String {
    match expected {
        Expect::Any => "any".to_string(),
        Expect::OneOf(kinds) => format!("one of {kinds:?}"),
    }
}

fn serialize_error(e: CodecError) -> ActionError {
    ProtocolError::Serialize {
        message: e.to_string(),
    }
    .into()
}

fn parse_error(e: CodecError) -> ActionError {
    ProtocolError::Parse {
        message: e.to_string(),
    }
    .into()
}

fn state_error(e: ContextError) -> ActionError {
    ProtocolError::State {
        message: e.to_string(),
    }
    .into()
}
