//! End-to-end runs over loopback TCP.

use std::time::Duration;

use handshake_core::{ConnectionConfig, Context, TransportError};
use handshake_transport::{TlvCodec, TlvMessage};
use handshake_workflow::{WorkflowExecutor, WorkflowTrace};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

const HELLO: u8 = 1;
const HELLO_REPLY: u8 = 2;
const DATA: u8 = 3;
const FINISHED: u8 = 20;

async fn listen() -> (TcpListener, ConnectionConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = ConnectionConfig::new("127.0.0.1", port).with_timeout(Duration::from_secs(2));
    (listener, config)
}

async fn read_frame(socket: &mut TcpStream) -> (u8, Vec<u8>) {
    let mut header = [0u8; 4];
    socket.read_exact(&mut header).await.unwrap();
    let len =
        (usize::from(header[1]) << 16) | (usize::from(header[2]) << 8) | usize::from(header[3]);
    let mut payload = vec![0u8; len];
    socket.read_exact(&mut payload).await.unwrap();
    (header[0], payload)
}

#[tokio::test]
async fn test_peer_closes_after_first_reply() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        assert_eq!(read_frame(&mut socket).await, (HELLO, Vec::new()));
        socket.write_all(b"\x02\x00\x00\x02hi").await.unwrap();

        let mut rest = [0u8; 12];
        socket.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"\x03\x00\x00\x00\x03\x00\x00\x00\x03\x00\x00\x00");
    });

    let mut ctx = Context::new();
    let mut trace = WorkflowTrace::new()
        .send([TlvMessage::empty(HELLO)])
        .receive(HELLO_REPLY)
        .wait(Duration::from_millis(300))
        .send([
            TlvMessage::empty(DATA),
            TlvMessage::empty(DATA),
            TlvMessage::empty(DATA),
        ])
        .receive_any();

    let result = WorkflowExecutor::new(TlvCodec::default())
        .execute(&mut ctx, &config, &mut trace)
        .await
        .unwrap();
    server.await.unwrap();

    assert!(!result.completed);
    assert_eq!(result.failed_at, Some(4));
    assert_eq!(result.error, Some(TransportError::Closed.into()));
    assert!(trace.inspect().did_receive(HELLO_REPLY));
    assert_eq!(ctx.log().len(), 5);
}

#[tokio::test]
async fn test_hello_reply_and_finished() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let (kind, payload) = read_frame(&mut socket).await;
        assert_eq!(kind, HELLO);
        assert_eq!(payload, b"\x03\x03\x00\x2f\x00\x35");

        socket
            .write_all(b"\x02\x00\x00\x04\x03\x03\x00\x2f\x14\x00\x00\x00")
            .await
            .unwrap();
    });

    let mut ctx = Context::new();
    let mut trace = WorkflowTrace::new()
        .send([TlvMessage::new(HELLO, &b"\x03\x03\x00\x2f\x00\x35"[..])])
        .receive(HELLO_REPLY)
        .generic_receive();

    let result = WorkflowExecutor::new(TlvCodec::default().with_hello_reply(HELLO_REPLY))
        .execute(&mut ctx, &config, &mut trace)
        .await
        .unwrap();
    server.await.unwrap();

    assert!(result.completed);
    let inspector = trace.inspect();
    assert!(inspector.did_receive(FINISHED));
    assert!(inspector.did_send(HELLO));
    assert_eq!(ctx.protocol_version().map(|v| v.name.as_str()), Some("TLS12"));
    assert_eq!(ctx.selected_algorithm().map(|a| a.code), Some(0x002F));
}

#[tokio::test]
async fn test_nobody_listening() {
    let (listener, config) = listen().await;
    drop(listener);

    let mut ctx = Context::new();
    let mut trace = WorkflowTrace::new().send([TlvMessage::empty(HELLO)]);
    let result = WorkflowExecutor::new(TlvCodec::default())
        .execute(&mut ctx, &config, &mut trace)
        .await
        .unwrap();

    assert_eq!(result.failed_at, Some(0));
    assert_eq!(result.error, Some(TransportError::ConnectionRefused.into()));
}
