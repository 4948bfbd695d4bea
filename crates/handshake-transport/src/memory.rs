//! Scripted in-memory peer.
//!
//! Useful for tests and dry runs of a trace: every `receive` consumes the
//! next scripted peer event, and every byte written is captured by a
//! `ConnectionProbe` that stays readable after the connection has been
//! moved into (and dropped by) an executor.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use handshake_core::{ConnectionConfig, TransportError};

use crate::connection::{Connection, ConnectionState, ConnectionStats, ensure_connected};

/// What the scripted peer does on the next `receive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// Deliver these bytes.
    Reply(Bytes),
    /// Shut down gracefully; every later `receive` reports `Closed`.
    Close,
    /// Abort the connection; every later operation reports `ConnectionReset`.
    Reset,
    /// Say nothing until the receive timeout expires.
    Silence,
}

#[derive(Default)]
struct ProbeInner {
    connects: AtomicUsize,
    closes: AtomicUsize,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    written: Mutex<Vec<Bytes>>,
}

/// Observer handle onto a `MemoryConnection`.
#[derive(Clone, Default)]
pub struct ConnectionProbe {
    inner: Arc<ProbeInner>,
}

impl ConnectionProbe {
    /// Successful `connect` calls.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Connected → Closed transitions.
    #[must_use]
    pub fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            bytes_sent: self.inner.bytes_sent.load(Ordering::SeqCst),
            bytes_received: self.inner.bytes_received.load(Ordering::SeqCst),
        }
    }

    /// Every buffer passed to `send`, in order.
    #[must_use]
    pub fn written(&self) -> Vec<Bytes> {
        self.inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record_write(&self, bytes: &[u8]) {
        self.inner
            .bytes_sent
            .fetch_add(bytes.len() as u64, Ordering::SeqCst);
        self.inner
            .written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Bytes::copy_from_slice(bytes));
    }
}

/// In-memory connection that plays back a script of peer events.
///
/// Once the script is exhausted the peer stays silent.
pub struct MemoryConnection {
    config: ConnectionConfig,
    script: VecDeque<PeerEvent>,
    state: ConnectionState,
    probe: ConnectionProbe,
    refuse: bool,
    send_failure: Option<TransportError>,
    terminal: Option<TransportError>,
}

impl MemoryConnection {
    /// Create a connection to a silent peer.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            script: VecDeque::new(),
            state: ConnectionState::Unconnected,
            probe: ConnectionProbe::default(),
            refuse: false,
            send_failure: None,
            terminal: None,
        }
    }

    /// Queue a reply.
    #[must_use]
    pub fn reply(mut self, bytes: impl Into<Bytes>) -> Self {
        self.script.push_back(PeerEvent::Reply(bytes.into()));
        self
    }

    /// Queue an arbitrary peer event.
    #[must_use]
    pub fn then(mut self, event: PeerEvent) -> Self {
        self.script.push_back(event);
        self
    }

    /// Refuse every connection attempt.
    #[must_use]
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Fail every `send` with `error`.
    #[must_use]
    pub fn failing_sends(mut self, error: TransportError) -> Self {
        self.send_failure = Some(error);
        self
    }

    /// Handle for observing this connection after it has been handed off.
    #[must_use]
    pub fn probe(&self) -> ConnectionProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn stats(&self) -> ConnectionStats {
        self.probe.stats()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(TransportError::NotConnected),
            ConnectionState::Unconnected => {}
        }
        if self.refuse {
            return Err(TransportError::ConnectionRefused);
        }
        self.state = ConnectionState::Connected;
        self.probe.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        ensure_connected(self.state)?;
        if let Some(TransportError::ConnectionReset) = self.terminal {
            return Err(TransportError::ConnectionReset);
        }
        if let Some(error) = &self.send_failure {
            return Err(error.clone());
        }
        self.probe.record_write(bytes);
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        ensure_connected(self.state)?;
        if let Some(error) = &self.terminal {
            return Err(error.clone());
        }
        match self.script.pop_front().unwrap_or(PeerEvent::Silence) {
            PeerEvent::Reply(bytes) => {
                self.probe
                    .inner
                    .bytes_received
                    .fetch_add(bytes.len() as u64, Ordering::SeqCst);
                Ok(bytes)
            }
            PeerEvent::Close => {
                self.terminal = Some(TransportError::Closed);
                Err(TransportError::Closed)
            }
            PeerEvent::Reset => {
                self.terminal = Some(TransportError::ConnectionReset);
                Err(TransportError::ConnectionReset)
            }
            PeerEvent::Silence => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout)
            }
        }
    }

    fn close(&mut self) {
        if self.state == ConnectionState::Connected {
            self.probe.inner.closes.fetch_add(1, Ordering::SeqCst);
        }
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::assert_ok;

    use super::*;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("peer.test", 4433)
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_playback() {
        let mut conn = MemoryConnection::new(config())
            .reply(&b"abc"[..])
            .then(PeerEvent::Silence)
            .then(PeerEvent::Close);
        let probe = conn.probe();

        assert_eq!(
            conn.receive(Duration::from_millis(10)).await,
            Err(TransportError::NotConnected)
        );
        assert_ok!(conn.connect().await);
        assert_ok!(conn.send(b"hi").await);

        assert_eq!(
            conn.receive(Duration::from_millis(10)).await,
            Ok(Bytes::from_static(b"abc"))
        );

        let started = tokio::time::Instant::now();
        assert_eq!(
            conn.receive(Duration::from_millis(200)).await,
            Err(TransportError::Timeout)
        );
        assert!(started.elapsed() >= Duration::from_millis(200));

        assert_eq!(
            conn.receive(Duration::from_millis(10)).await,
            Err(TransportError::Closed)
        );
        assert_eq!(
            conn.receive(Duration::from_millis(10)).await,
            Err(TransportError::Closed)
        );

        assert_eq!(
            probe.stats(),
            ConnectionStats {
                bytes_sent: 2,
                bytes_received: 3
            }
        );
        assert_eq!(probe.written(), vec![Bytes::from_static(b"hi")]);
    }

    #[tokio::test]
    async fn test_close_counts_only_open_connections() {
        let mut conn = MemoryConnection::new(config());
        let probe = conn.probe();

        conn.close();
        assert_eq!(probe.closes(), 0);

        let mut conn = MemoryConnection::new(config());
        let probe = conn.probe();
        assert_ok!(conn.connect().await);
        conn.close();
        conn.close();
        assert_eq!(probe.connects(), 1);
        assert_eq!(probe.closes(), 1);
        assert_eq!(conn.connect().await, Err(TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_refusing_and_reset() {
        let mut conn = MemoryConnection::new(config()).refusing();
        assert_eq!(conn.connect().await, Err(TransportError::ConnectionRefused));
        assert_eq!(conn.state(), ConnectionState::Unconnected);

        let mut conn = MemoryConnection::new(config()).then(PeerEvent::Reset);
        assert_ok!(conn.connect().await);
        assert_eq!(
            conn.receive(Duration::from_millis(10)).await,
            Err(TransportError::ConnectionReset)
        );
        assert_eq!(conn.send(b"x").await, Err(TransportError::ConnectionReset));
    }
}
