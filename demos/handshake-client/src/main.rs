//! Example client that runs a scripted handshake against a live peer.
//!
//! Run with: cargo run -p handshake-client -- 10.160.160.3 50001 TLS12
//!
//! Messages use the TLV framing of `TlvCodec`; the peer's hello reply
//! carries its chosen version and algorithm as two big-endian u16 values.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use handshake_core::{Config, Context, Registry, ValidatedConfig, config::parse_port};
use handshake_transport::{TlvCodec, TlvMessage};
use handshake_workflow::{WorkflowExecutor, WorkflowTrace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLIENT_HELLO: u8 = 1;
const SERVER_HELLO: u8 = 2;
const CLIENT_KEY_EXCHANGE: u8 = 16;
const FINISHED: u8 = 20;
const CHANGE_CIPHER_SPEC: u8 = 0x80;

const USAGE: &str = "Expecting three arguments: [IP] [Port] [ProtocolVersion]\n \
                     Example: handshake-client \"10.160.160.3\" \"50001\" \"TLS12\"";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [host, port, version] = args.as_slice() else {
        println!("{USAGE}");
        return Ok(());
    };

    let registry = Registry::default();
    let mut config = Config::new(host.as_str(), parse_port(port)?);
    config.highest_protocol_version.clone_from(version);
    let config = config.validate(&registry)?;

    let mut trace = WorkflowTrace::new()
        .send([client_hello(&config)])
        .generic_receive()
        .wait(Duration::from_millis(2000))
        .send([
            TlvMessage::empty(CLIENT_KEY_EXCHANGE),
            TlvMessage::empty(CHANGE_CIPHER_SPEC),
            TlvMessage::empty(FINISHED),
        ])
        .generic_receive()
        .send([server_hello(&config)])
        .generic_receive();

    let executor = WorkflowExecutor::new(TlvCodec::new(registry).with_hello_reply(SERVER_HELLO));
    let mut ctx = Context::new();
    let result = executor
        .execute(&mut ctx, &config.connection, &mut trace)
        .await?;

    if let Some(error) = &result.error {
        tracing::warn!(failed_at = ?result.failed_at, "Workflow halted: {error}");
    }

    println!(
        "Received Finished: {}",
        trace.inspect().did_receive(FINISHED)
    );
    match ctx.selected_algorithm() {
        Some(algorithm) => println!("Selected algorithm: {algorithm}"),
        None => println!("Selected algorithm: none"),
    }
    Ok(())
}

/// Offered version followed by every offered algorithm code.
fn client_hello(config: &ValidatedConfig) -> TlvMessage {
    let mut payload = BytesMut::with_capacity(2 + 2 * config.supported_algorithms.len());
    payload.put_u16(config.highest_protocol_version.wire);
    for algorithm in &config.supported_algorithms {
        payload.put_u16(algorithm.code);
    }
    TlvMessage::new(CLIENT_HELLO, payload.freeze())
}

/// Unsolicited hello in the server role, picking our first algorithm.
fn server_hello(config: &ValidatedConfig) -> TlvMessage {
    let code = config.supported_algorithms.first().map_or(0, |a| a.code);
    let mut payload = BytesMut::with_capacity(4);
    payload.put_u16(config.highest_protocol_version.wire);
    payload.put_u16(code);
    TlvMessage::new(SERVER_HELLO, Bytes::from(payload))
}
