//! TCP connection backed by tokio.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use handshake_core::{ConnectionConfig, TransportError};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::connection::{Connection, ConnectionState, ConnectionStats, ensure_connected};

/// Read buffer size per `receive` call.
const READ_CHUNK: usize = 16 * 1024;

/// Client-side TCP connection, opened lazily by `connect`.
pub struct TcpConnection {
    config: ConnectionConfig,
    stream: Option<TcpStream>,
    state: ConnectionState,
    stats: ConnectionStats,
    peer_closed: bool,
}

impl TcpConnection {
    /// Create an unconnected TCP connection.
    #[must_use]
    pub const fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            stream: None,
            state: ConnectionState::Unconnected,
            stats: ConnectionStats {
                bytes_sent: 0,
                bytes_received: 0,
            },
            peer_closed: false,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        ensure_connected(self.state)?;
        self.stream.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    fn stats(&self) -> ConnectionStats {
        self.stats
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Closed => return Err(TransportError::NotConnected),
            ConnectionState::Unconnected => {}
        }

        let host = self.config.host.as_str();
        let port = self.config.port;
        tracing::debug!(host, port, "Connecting");

        let stream = match timeout(self.config.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!(host, port, "Connect failed: {e}");
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!(host, port, "Connect timed out");
                return Err(TransportError::Timeout);
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {e}");
        }

        self.stream = Some(stream);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        self.stats.bytes_sent += bytes.len() as u64;
        Ok(())
    }

    async fn receive(&mut self, wait: Duration) -> Result<Bytes, TransportError> {
        if self.peer_closed {
            ensure_connected(self.state)?;
            return Err(TransportError::Closed);
        }

        let mut buf = vec![0u8; READ_CHUNK];
        let stream = self.stream()?;
        let read = timeout(wait, stream.read(&mut buf)).await;
        match read {
            Err(_) => Err(TransportError::Timeout),
            Ok(Ok(0)) => {
                tracing::debug!("Peer closed the connection");
                self.peer_closed = true;
                Err(TransportError::Closed)
            }
            Ok(Ok(n)) => {
                buf.truncate(n);
                self.stats.bytes_received += n as u64;
                Ok(Bytes::from(buf))
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        if self.state == ConnectionState::Connected {
            tracing::debug!(
                host = %self.config.host,
                port = self.config.port,
                sent = self.stats.bytes_sent,
                received = self.stats.bytes_received,
                "Closing connection"
            );
        }
        drop(self.stream.take());
        self.state = ConnectionState::Closed;
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    use super::*;

    async fn listener() -> (TcpListener, ConnectionConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config =
            ConnectionConfig::new("127.0.0.1", port).with_timeout(Duration::from_millis(500));
        (listener, config)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (listener, config) = listener().await;
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"world").await.unwrap();
            buf
        });

        let mut conn = TcpConnection::new(config);
        assert_eq!(conn.send(b"x").await, Err(TransportError::NotConnected));

        assert_ok!(conn.connect().await);
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert_ok!(conn.send(b"hello").await);

        let mut received = Vec::new();
        while received.len() < 5 {
            let chunk = assert_ok!(conn.receive(Duration::from_millis(500)).await);
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"world");
        assert_eq!(&server.await.unwrap(), b"hello");

        assert_eq!(
            conn.receive(Duration::from_millis(500)).await,
            Err(TransportError::Closed)
        );
        assert_eq!(
            conn.stats(),
            ConnectionStats {
                bytes_sent: 5,
                bytes_received: 5
            }
        );

        conn.close();
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.connect().await, Err(TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_receive_times_out() {
        let (listener, config) = listener().await;
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let mut conn = TcpConnection::new(config);
        assert_ok!(conn.connect().await);
        assert_eq!(
            conn.receive(Duration::from_millis(50)).await,
            Err(TransportError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, config) = listener().await;
        drop(listener);

        let mut conn = TcpConnection::new(config);
        assert_eq!(conn.connect().await, Err(TransportError::ConnectionRefused));
        assert_eq!(conn.state(), ConnectionState::Unconnected);
    }
}
