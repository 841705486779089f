//! Shared helpers for integration tests: log setup and a fake state-history
//! node served over a real WebSocket.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use ship_client::abi::{Abi, Fields, Schema, Value};
use ship_client::{BlockPosition, Checksum256, SessionConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub const SHIP_ABI: &str = include_str!("../fixtures/ship_abi.json");

/// Head block the fake node reports.
pub const HEAD_BLOCK: u32 = 100;

static INIT: std::sync::Once = std::sync::Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("warn".parse().unwrap()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Fail the test instead of hanging when `fut` does not finish in time.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NodeOptions {
    /// Send a `get_blocks_result_v0` right after the ABI.
    pub unknown_result_after_handshake: bool,
}

/// A node that accepts one connection.
pub struct FakeNode {
    pub port: u16,
    handle: JoinHandle<()>,
    closed: Option<oneshot::Receiver<()>>,
}

impl FakeNode {
    pub async fn spawn(options: NodeOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (closed_tx, closed_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            serve(ws, options).await;
            let _ = closed_tx.send(());
        });
        Self {
            port,
            handle,
            closed: Some(closed_rx),
        }
    }

    /// Wait until the client has hung up. Returns `false` if already awaited.
    pub async fn closed(&mut self) -> bool {
        match self.closed.take() {
            Some(rx) => rx.await.is_ok(),
            None => false,
        }
    }

    pub fn config(&self) -> SessionConfig {
        SessionConfig::new("127.0.0.1", self.port)
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Outstanding blocks stream, driven by requests and acks.
#[derive(Default)]
struct BlockStream {
    next: u32,
    end: u32,
    credits: u32,
    fetch_block: bool,
}

impl BlockStream {
    fn start(&mut self, body: &Fields) {
        self.next = body["start_block_num"].as_u32().unwrap();
        self.end = body["end_block_num"].as_u32().unwrap();
        self.credits = body["max_messages_in_flight"].as_u32().unwrap();
        self.fetch_block = body["fetch_block"].as_bool().unwrap();
    }

    fn ack(&mut self, num_messages: u32) {
        self.credits = self.credits.saturating_add(num_messages);
    }

    /// Frames the node may send now.
    fn pump(&mut self, abi: &Abi) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while self.credits > 0 && self.next < self.end {
            frames.push(blocks_frame(abi, self.next, self.fetch_block));
            self.next += 1;
            self.credits -= 1;
        }
        frames
    }
}

async fn serve(mut ws: WebSocketStream<TcpStream>, options: NodeOptions) {
    let abi = Abi::from_document(SHIP_ABI.as_bytes()).unwrap();
    if ws.send(Message::Text(SHIP_ABI.to_owned())).await.is_err() {
        return;
    }
    if options.unknown_result_after_handshake {
        let frame = result_frame(&abi, "get_blocks_result_v0", blocks_v0_body(2));
        let _ = ws.send(Message::Binary(frame.to_vec())).await;
    }

    let mut stream = BlockStream::default();
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Binary(data) = msg else {
            continue;
        };
        let (tag, body) = decode_request(&abi, Bytes::from(data));
        let replies = match tag.as_str() {
            "get_status_request_v0" => vec![status_frame(&abi)],
            "get_blocks_request_v1" => {
                stream.start(&body);
                stream.pump(&abi)
            }
            "get_blocks_ack_request_v0" => {
                stream.ack(body["num_messages"].as_u32().unwrap());
                stream.pump(&abi)
            }
            other => panic!("unexpected request {}", other),
        };
        for frame in replies {
            if ws.send(Message::Binary(frame.to_vec())).await.is_err() {
                return;
            }
        }
    }
}

pub fn decode_request(abi: &Abi, mut frame: Bytes) -> (String, Fields) {
    let (tag, body) = abi
        .decode(&mut frame, "request")
        .unwrap()
        .into_variant()
        .unwrap();
    (tag, body.as_struct().unwrap().clone())
}

pub fn block_id(n: u32) -> Checksum256 {
    let mut id = [0u8; 32];
    id[..4].copy_from_slice(&n.to_be_bytes());
    Checksum256(id)
}

pub fn pos(n: u32) -> Value {
    Value::from(&BlockPosition::new(n, block_id(n)))
}

pub fn result_frame(abi: &Abi, tag: &str, body: Fields) -> Bytes {
    let mut buf = BytesMut::new();
    let value = Value::Variant(tag.into(), Box::new(Value::Struct(body)));
    abi.encode(&mut buf, "result", &value).unwrap();
    buf.freeze()
}

pub fn status_frame(abi: &Abi) -> Bytes {
    let mut body = Fields::new();
    body.insert("head".into(), pos(HEAD_BLOCK));
    body.insert("last_irreversible".into(), pos(HEAD_BLOCK - 1));
    body.insert("trace_begin_block".into(), 2u32.into());
    body.insert("trace_end_block".into(), HEAD_BLOCK.into());
    body.insert("chain_state_begin_block".into(), 2u32.into());
    body.insert("chain_state_end_block".into(), HEAD_BLOCK.into());
    body.insert("chain_id".into(), Checksum256([0xcf; 32]).into());
    result_frame(abi, "get_status_result_v0", body)
}

fn blocks_v0_body(n: u32) -> Fields {
    let mut body = Fields::new();
    body.insert("head".into(), pos(HEAD_BLOCK));
    body.insert("last_irreversible".into(), pos(HEAD_BLOCK - 1));
    body.insert("this_block".into(), pos(n));
    body.insert(
        "prev_block".into(),
        if n > 1 { pos(n - 1) } else { Value::Null },
    );
    body.insert("block".into(), Value::Null);
    body.insert("traces".into(), Value::Null);
    body.insert("deltas".into(), Value::Null);
    body
}

pub fn blocks_frame(abi: &Abi, n: u32, fetch_block: bool) -> Bytes {
    let mut body = blocks_v0_body(n);
    if fetch_block {
        body.insert(
            "block".into(),
            Bytes::copy_from_slice(&n.to_le_bytes()).into(),
        );
    }
    body.insert("block_header".into(), Value::Null);
    result_frame(abi, "get_blocks_result_v2", body)
}
