//! Session builder and read loop.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring the
//! connection. The [`Session`] manages the lifecycle:
//! 1. Dial the node
//! 2. Receive the schema document (first frame)
//! 3. Decode every later frame and publish it on the matching stream
//! 4. Encode and send requests on demand
//!
//! # Example
//!
//! ```ignore
//! use ship_client::{BlocksAckRequest, BlocksRequest, Session};
//!
//! #[tokio::main]
//! async fn main() -> ship_client::Result<()> {
//!     let mut session = Session::builder().host("127.0.0.1").port(8080).build();
//!     session.open().await?;
//!     let mut streams = session.take_streams().expect("streams are taken once");
//!
//!     streams.ready.recv().await;
//!     session
//!         .send_blocks_request(&BlocksRequest::new(2, 10).fetch_block(true))
//!         .await?;
//!
//!     while let Some(block) = streams.blocks.recv().await {
//!         println!("{:?}", block.this_block);
//!         session.send_ack_blocks_request(&BlocksAckRequest::new(1)).await?;
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::abi::{Abi, Schema};
use crate::config::SessionConfig;
use crate::error::{Result, ShipError};
use crate::flow::FlowWindow;
use crate::protocol::{encode_request, ShipRequest, ShipResult};
use crate::transport::{Dialer, FrameReader, FrameWriter, WsDialer};
use crate::types::{BlocksAckRequest, BlocksRequest, BlocksResult, StatusResult};
use crate::writer::RequestWriter;

/// Lifecycle state of a [`Session`].
///
/// ```text
/// Unopened ─open─► AwaitingSchema ─schema─► Ready
///                         │                   │
///                         └──close / fatal────┴──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionState {
    Unopened = 0,
    AwaitingSchema = 1,
    Ready = 2,
    /// Terminal.
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Unopened,
            1 => SessionState::AwaitingSchema,
            2 => SessionState::Ready,
            _ => SessionState::Closed,
        }
    }

    /// Whether the session holds a live connection.
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::AwaitingSchema | SessionState::Ready)
    }
}

/// Receiving ends of everything the read loop publishes.
///
/// Every stream ends (`recv()` returns `None`) once the session is closed,
/// explicitly or after a fatal error.
#[derive(Debug)]
pub struct SessionStreams<S = Abi> {
    /// Read-path failures. At most one error is published, then the session
    /// is closed.
    pub errors: mpsc::Receiver<ShipError>,
    /// Fires once with the schema, before any result.
    pub ready: mpsc::Receiver<Arc<S>>,
    pub status: mpsc::Receiver<StatusResult>,
    pub blocks: mpsc::Receiver<BlocksResult>,
}

/// Sending ends, owned by the read loop.
struct Producers<S> {
    errors: mpsc::Sender<ShipError>,
    ready: Option<mpsc::Sender<Arc<S>>>,
    status: mpsc::Sender<StatusResult>,
    blocks: mpsc::Sender<BlocksResult>,
}

fn channels<S>(capacity: usize) -> (Producers<S>, SessionStreams<S>) {
    let (errors_tx, errors) = mpsc::channel(capacity);
    let (ready_tx, ready) = mpsc::channel(1);
    let (status_tx, status) = mpsc::channel(capacity);
    let (blocks_tx, blocks) = mpsc::channel(capacity);
    (
        Producers {
            errors: errors_tx,
            ready: Some(ready_tx),
            status: status_tx,
            blocks: blocks_tx,
        },
        SessionStreams {
            errors,
            ready,
            status,
            blocks,
        },
    )
}

/// State shared between the session handle and its read loop.
struct Shared<S> {
    state: AtomicU8,
    schema: OnceLock<Arc<S>>,
    window: FlowWindow,
}

impl<S> Shared<S> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Unopened as u8),
            schema: OnceLock::new(),
            window: FlowWindow::new(),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move to Closed and return the previous state.
    fn close(&self) -> SessionState {
        SessionState::from_u8(
            self.state
                .swap(SessionState::Closed as u8, Ordering::AcqRel),
        )
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Builder for configuring and creating a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the node host.
    ///
    /// Default: 127.0.0.1
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the node port.
    ///
    /// Default: 8080
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the capacity of each result stream.
    ///
    /// The read loop waits while a stream is full, so a larger capacity lets
    /// the node run ahead of a slow consumer.
    /// Default: 1
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Fail the session when no frame arrives within `timeout`.
    ///
    /// Default: wait forever
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Cap the size of one inbound WebSocket message.
    ///
    /// Default: no limit
    pub fn max_message_size(mut self, limit: usize) -> Self {
        self.config.max_message_size = Some(limit);
        self
    }

    /// Cap the size of one inbound WebSocket frame.
    ///
    /// Default: no limit
    pub fn max_frame_size(mut self, limit: usize) -> Self {
        self.config.max_frame_size = Some(limit);
        self
    }

    /// Replace every setting at once.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a WebSocket session using the bundled ABI codec.
    pub fn build(self) -> Session {
        Session::new(self.config)
    }

    /// Build a session with a custom codec and transport.
    pub fn build_with<S: Schema, D: Dialer>(self, dialer: D) -> Session<S, D> {
        Session::with_dialer(self.config, dialer)
    }
}

/// A client session with one state-history node.
///
/// Requests go out through `send_*`; everything the node sends comes back
/// through the [`SessionStreams`] returned by [`Session::take_streams`].
pub struct Session<S: Schema = Abi, D: Dialer = WsDialer> {
    config: SessionConfig,
    dialer: D,
    shared: Arc<Shared<S>>,
    /// Write half. `None` until opened and again after close or a fatal
    /// read error.
    writer: Arc<Mutex<Option<D::Writer>>>,
    reader_task: Option<JoinHandle<()>>,
    streams: Option<SessionStreams<S>>,
}

impl Session {
    /// Create a WebSocket session. Nothing is dialed until [`open`](Session::open).
    pub fn new(config: SessionConfig) -> Self {
        let dialer = WsDialer::from_config(&config);
        Session::with_dialer(config, dialer)
    }

    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }
}

impl<S: Schema, D: Dialer> Session<S, D> {
    /// Create a session that connects through `dialer`.
    pub fn with_dialer(config: SessionConfig, dialer: D) -> Self {
        Self {
            config,
            dialer,
            shared: Arc::new(Shared::new()),
            writer: Arc::new(Mutex::new(None)),
            reader_task: None,
            streams: None,
        }
    }

    /// Connect and start the read loop.
    ///
    /// Succeeds without doing anything when the session is already open. A
    /// failed dial leaves the session unopened so it can be retried. A closed
    /// session cannot be reopened.
    pub async fn open(&mut self) -> Result<()> {
        match self.shared.state() {
            SessionState::Unopened => {}
            SessionState::AwaitingSchema | SessionState::Ready => return Ok(()),
            SessionState::Closed => return Err(ShipError::SessionClosed),
        }

        let url = self.config.url();
        let (reader, writer) = self.dialer.dial(&url).await?;
        *self.writer.lock().await = Some(writer);

        let (producers, streams) = channels(self.config.stream_capacity());
        self.streams = Some(streams);
        self.shared.set_state(SessionState::AwaitingSchema);

        let shared = self.shared.clone();
        let writer = self.writer.clone();
        let read_timeout = self.config.read_timeout;
        self.reader_task = Some(tokio::spawn(read_loop(
            reader,
            writer,
            shared,
            producers,
            read_timeout,
        )));

        tracing::debug!("Session opened to {}", url);
        Ok(())
    }

    /// Close the connection and stop the read loop.
    ///
    /// Does nothing on a session that was never opened or is already closed.
    /// Once this returns no stream produces anything new; results queued
    /// before the call can still be received, then every stream ends.
    pub async fn close(&mut self) {
        let Some(task) = self.reader_task.take() else {
            return;
        };
        self.shared.close();
        shut_writer(&self.writer).await;

        task.abort();
        let _ = task.await;
        self.streams = None;
        tracing::debug!("Session closed");
    }

    /// Take the result streams. Available once per session, after `open`.
    pub fn take_streams(&mut self) -> Option<SessionStreams<S>> {
        self.streams.take()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The schema received from the node, once ready.
    pub fn schema(&self) -> Option<Arc<S>> {
        self.shared.schema.get().cloned()
    }

    /// Flow-control window of the current blocks stream.
    pub fn flow_window(&self) -> FlowWindow {
        self.shared.window.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Ask the node for its chain status.
    pub async fn send_status_request(&self) -> Result<()> {
        self.send_request(ShipRequest::Status).await
    }

    /// Ask the node to stream blocks.
    ///
    /// Starts a new flow-control window of `max_messages_in_flight`.
    pub async fn send_blocks_request(&self, request: &BlocksRequest) -> Result<()> {
        self.send_request(ShipRequest::Blocks(request)).await
    }

    /// Acknowledge `num_messages` blocks results, letting the node send as
    /// many more.
    pub async fn send_ack_blocks_request(&self, request: &BlocksAckRequest) -> Result<()> {
        self.send_request(ShipRequest::BlocksAck(request)).await
    }

    fn ready_schema(&self) -> Result<&Arc<S>> {
        match self.shared.state() {
            SessionState::Ready => self.shared.schema.get().ok_or(ShipError::NotReady),
            SessionState::Closed => Err(ShipError::SessionClosed),
            SessionState::Unopened | SessionState::AwaitingSchema => Err(ShipError::NotReady),
        }
    }

    async fn send_request(&self, request: ShipRequest<'_>) -> Result<()> {
        let schema = self.ready_schema()?;

        let mut writer = RequestWriter::acquire(&self.writer).await?;
        encode_request(&**schema, writer.buffer(), &request)?;

        tracing::trace!("Sending {}", request.tag());
        writer.finish().await?;

        match request {
            ShipRequest::Blocks(req) => self.shared.window.reset(req.max_messages_in_flight),
            ShipRequest::BlocksAck(ack) => self.shared.window.acknowledge(ack.num_messages),
            ShipRequest::Status => {}
        }
        Ok(())
    }
}

impl<S: Schema, D: Dialer> Drop for Session<S, D> {
    fn drop(&mut self) {
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

/// Take the write half out of `slot` and close it.
async fn shut_writer<W: FrameWriter>(slot: &Mutex<Option<W>>) {
    let writer = slot.lock().await.take();
    if let Some(mut writer) = writer {
        if let Err(e) = writer.close().await {
            tracing::debug!("Error closing connection: {}", e);
        }
    }
}

/// Background task: runs until the connection fails or the session closes.
///
/// A fatal error shuts the write half before it is published, so the
/// connection is gone by the time a consumer sees the error.
async fn read_loop<R: FrameReader, W: FrameWriter, S: Schema>(
    mut reader: R,
    writer: Arc<Mutex<Option<W>>>,
    shared: Arc<Shared<S>>,
    mut out: Producers<S>,
    read_timeout: Option<Duration>,
) {
    match run(&mut reader, &shared, &mut out, read_timeout).await {
        Ok(()) => tracing::debug!("Read loop stopped"),
        Err(e) => {
            if shared.close() == SessionState::Closed {
                tracing::debug!("Read loop stopped after close: {}", e);
                return;
            }
            tracing::error!("Read loop error: {}", e);
            shut_writer(&writer).await;
            let _ = out.errors.send(e).await;
        }
    }
}

/// Returns `Ok` only when the session was closed underneath it.
async fn run<R: FrameReader, S: Schema>(
    reader: &mut R,
    shared: &Shared<S>,
    out: &mut Producers<S>,
    read_timeout: Option<Duration>,
) -> Result<()> {
    loop {
        let frame = next_frame(reader, read_timeout).await?;
        if shared.state() == SessionState::Closed {
            return Ok(());
        }
        tracing::trace!("Received {} byte frame", frame.len());

        // The first frame is the schema document.
        let Some(schema) = shared.schema.get() else {
            let schema = Arc::new(S::from_document(&frame)?);
            let schema = shared.schema.get_or_init(|| schema);
            if !shared.transition(SessionState::AwaitingSchema, SessionState::Ready) {
                return Ok(());
            }
            tracing::debug!("Schema received, session ready");
            if let Some(ready) = out.ready.take() {
                let _ = ready.try_send(schema.clone());
            }
            continue;
        };

        match ShipResult::decode(&**schema, frame)? {
            ShipResult::Status(status) => {
                if out.status.send(status).await.is_err() {
                    tracing::debug!("Status stream dropped, discarding result");
                }
            }
            ShipResult::Blocks(blocks) => {
                shared.window.record_delivery();
                if out.blocks.send(blocks).await.is_err() {
                    tracing::debug!("Blocks stream dropped, discarding result");
                }
            }
            ShipResult::Unhandled(tag) => return Err(ShipError::UnhandledMessage(tag)),
        }
    }
}

async fn next_frame<R: FrameReader>(reader: &mut R, read_timeout: Option<Duration>) -> Result<Bytes> {
    match read_timeout {
        Some(limit) => tokio::time::timeout(limit, reader.read_frame())
            .await
            .map_err(|_| ShipError::Timeout(limit))?,
        None => reader.read_frame().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{Fields, Value};
    use crate::error::AbiError;
    use crate::protocol::{
        GET_BLOCKS_ACK_REQUEST_V0, GET_BLOCKS_REQUEST_V1, GET_BLOCKS_RESULT_V2,
        GET_STATUS_REQUEST_V0, GET_STATUS_RESULT_V0, KNOWN_EMPTY_BODY_DEFECT, REQUEST_TYPE,
        RESULT_TYPE,
    };
    use crate::transport::{memory_pair, MemoryDialer, MemoryPeer};
    use crate::types::{BlockPosition, Checksum256};
    use bytes::BytesMut;

    const SHIP_ABI: &str = include_str!("../tests/fixtures/ship_abi.json");

    fn ship_abi() -> Abi {
        Abi::from_document(SHIP_ABI.as_bytes()).unwrap()
    }

    fn pos(n: u32) -> Value {
        Value::from(&BlockPosition::new(n, Checksum256([n as u8; 32])))
    }

    fn result_frame(abi: &Abi, tag: &str, body: Fields) -> Bytes {
        let mut buf = BytesMut::new();
        let value = Value::Variant(tag.into(), Box::new(Value::Struct(body)));
        abi.encode(&mut buf, RESULT_TYPE, &value).unwrap();
        buf.freeze()
    }

    fn status_frame(abi: &Abi) -> Bytes {
        let mut body = Fields::new();
        body.insert("head".into(), pos(9));
        body.insert("last_irreversible".into(), pos(8));
        body.insert("trace_begin_block".into(), 2u32.into());
        body.insert("trace_end_block".into(), 9u32.into());
        body.insert("chain_state_begin_block".into(), 2u32.into());
        body.insert("chain_state_end_block".into(), 9u32.into());
        body.insert("chain_id".into(), Checksum256([0xab; 32]).into());
        result_frame(abi, GET_STATUS_RESULT_V0, body)
    }

    fn blocks_body(this_block: u32) -> Fields {
        let mut body = Fields::new();
        body.insert("head".into(), pos(9));
        body.insert("last_irreversible".into(), pos(8));
        body.insert("this_block".into(), pos(this_block));
        body.insert("prev_block".into(), Value::Null);
        body.insert("block".into(), Value::Null);
        body.insert("traces".into(), Value::Null);
        body.insert("deltas".into(), Value::Null);
        body
    }

    fn blocks_frame(abi: &Abi, this_block: u32) -> Bytes {
        let mut body = blocks_body(this_block);
        body.insert("block_header".into(), Value::Null);
        result_frame(abi, GET_BLOCKS_RESULT_V2, body)
    }

    fn decode_request(abi: &Abi, frame: Bytes) -> (String, Fields) {
        let mut frame = frame;
        let (tag, body) = abi
            .decode(&mut frame, REQUEST_TYPE)
            .unwrap()
            .into_variant()
            .unwrap();
        (tag, body.as_struct().unwrap().clone())
    }

    async fn open_session() -> (Session<Abi, MemoryDialer>, SessionStreams, MemoryPeer) {
        let (dialer, peer) = memory_pair();
        let mut session = Session::builder().build_with(dialer);
        session.open().await.unwrap();
        let streams = session.take_streams().unwrap();
        (session, streams, peer)
    }

    async fn ready_session() -> (Session<Abi, MemoryDialer>, SessionStreams, MemoryPeer) {
        let (session, mut streams, peer) = open_session().await;
        peer.send(SHIP_ABI);
        streams.ready.recv().await.unwrap();
        (session, streams, peer)
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Session::builder()
            .host("node.local")
            .port(9090)
            .channel_capacity(16)
            .read_timeout(Duration::from_secs(5))
            .max_message_size(1 << 30);

        let session = builder.build();
        assert_eq!(session.config().url(), "ws://node.local:9090");
        assert_eq!(session.config().channel_capacity, 16);
        assert_eq!(session.config().read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(session.config().max_message_size, Some(1 << 30));
        assert_eq!(session.config().max_frame_size, None);
        assert_eq!(session.state(), SessionState::Unopened);
    }

    #[tokio::test]
    async fn test_requests_before_ready_fail() {
        let (dialer, _peer) = memory_pair();
        let mut session: Session<Abi, MemoryDialer> =
            Session::with_dialer(SessionConfig::default(), dialer);

        assert!(matches!(
            session.send_status_request().await,
            Err(ShipError::NotReady)
        ));

        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::AwaitingSchema);
        assert!(matches!(
            session.send_status_request().await,
            Err(ShipError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_ready_fires_once_before_results() {
        let abi = ship_abi();
        let (session, mut streams, peer) = open_session().await;

        peer.send(SHIP_ABI);
        peer.send(status_frame(&abi));

        let schema = streams.ready.recv().await.unwrap();
        assert_eq!(schema.version(), "eosio::abi/1.1");
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.schema().is_some());

        let status = streams.status.recv().await.unwrap();
        assert_eq!(status.trace_begin_block, 2);
        assert!(streams.ready.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_status_request_frame() {
        let abi = ship_abi();
        let (session, _streams, mut peer) = ready_session().await;

        session.send_status_request().await.unwrap();
        let (tag, body) = decode_request(&abi, peer.recv().await.unwrap());
        assert_eq!(tag, GET_STATUS_REQUEST_V0);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_blocks_flow_window() {
        let abi = ship_abi();
        let (session, mut streams, mut peer) = ready_session().await;
        let window = session.flow_window();

        let request = BlocksRequest::new(2, 4).max_messages_in_flight(2);
        session.send_blocks_request(&request).await.unwrap();
        let (tag, body) = decode_request(&abi, peer.recv().await.unwrap());
        assert_eq!(tag, GET_BLOCKS_REQUEST_V1);
        assert_eq!(body["have_positions"], Value::Array(vec![]));
        assert_eq!(window.max_in_flight(), 2);
        assert_eq!(window.in_flight(), 0);

        peer.send(blocks_frame(&abi, 2));
        let block = streams.blocks.recv().await.unwrap();
        assert_eq!(block.this_block.map(|p| p.block_num), Some(2));
        assert_eq!(block.prev_block, None);
        assert_eq!(window.in_flight(), 1);

        session
            .send_ack_blocks_request(&BlocksAckRequest::new(1))
            .await
            .unwrap();
        let (tag, body) = decode_request(&abi, peer.recv().await.unwrap());
        assert_eq!(tag, GET_BLOCKS_ACK_REQUEST_V0);
        assert_eq!(body["num_messages"], Value::Uint(1));
        assert_eq!(window.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_unhandled_message_is_fatal() {
        let abi = ship_abi();
        let (session, mut streams, peer) = ready_session().await;

        peer.send(result_frame(&abi, "get_blocks_result_v0", blocks_body(2)));
        peer.send(status_frame(&abi));

        let err = streams.errors.recv().await.unwrap();
        assert!(matches!(err, ShipError::UnhandledMessage(ref tag) if tag == "get_blocks_result_v0"));
        assert!(streams.errors.recv().await.is_none());
        assert!(streams.status.recv().await.is_none());
        assert!(streams.blocks.recv().await.is_none());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.send_status_request().await,
            Err(ShipError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let (session, mut streams, mut peer) = open_session().await;

        peer.close();
        assert!(matches!(
            streams.errors.recv().await,
            Some(ShipError::ConnectionClosed)
        ));
        assert!(streams.ready.recv().await.is_none());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_bad_schema_document() {
        let (session, mut streams, peer) = open_session().await;

        peer.send("not a schema");
        assert!(matches!(
            streams.errors.recv().await,
            Some(ShipError::SchemaDocument(_))
        ));
        assert!(streams.ready.recv().await.is_none());
        assert!(session.schema().is_none());
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (dialer, _peer) = memory_pair();
        let mut session: Session<Abi, MemoryDialer> = Session::builder()
            .read_timeout(Duration::from_millis(20))
            .build_with(dialer);
        session.open().await.unwrap();
        let mut streams = session.take_streams().unwrap();

        assert!(matches!(
            streams.errors.recv().await,
            Some(ShipError::Timeout(d)) if d == Duration::from_millis(20)
        ));
    }

    #[tokio::test]
    async fn test_close_ends_every_stream() {
        let (mut session, mut streams, mut peer) = ready_session().await;

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(streams.errors.recv().await.is_none());
        assert!(streams.ready.recv().await.is_none());
        assert!(streams.status.recv().await.is_none());
        assert!(streams.blocks.recv().await.is_none());

        // writer half was closed
        assert!(peer.recv().await.is_none());
        assert!(matches!(
            session.send_status_request().await,
            Err(ShipError::SessionClosed)
        ));
        assert!(matches!(session.open().await, Err(ShipError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_close_unopened_is_noop() {
        let (dialer, _peer) = memory_pair();
        let mut session: Session<Abi, MemoryDialer> = Session::builder().build_with(dialer);

        session.close().await;
        assert_eq!(session.state(), SessionState::Unopened);
        session.open().await.unwrap();
        assert!(session.state().is_open());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        // The memory dialer refuses a second dial.
        let (mut session, _streams, _peer) = open_session().await;
        session.open().await.unwrap();
        assert_eq!(session.state(), SessionState::AwaitingSchema);
        assert!(session.take_streams().is_none());
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_session_unopened() {
        let mut session: Session<Abi, MemoryDialer> =
            Session::builder().build_with(MemoryDialer::refusing());

        assert!(matches!(session.open().await, Err(ShipError::Io(_))));
        assert_eq!(session.state(), SessionState::Unopened);
        assert!(session.take_streams().is_none());
    }

    #[tokio::test]
    async fn test_fatal_error_shuts_connection() {
        let abi = ship_abi();
        let (_session, mut streams, mut peer) = ready_session().await;

        peer.send(result_frame(&abi, "get_blocks_result_v0", blocks_body(2)));
        assert!(matches!(
            streams.errors.recv().await,
            Some(ShipError::UnhandledMessage(_))
        ));

        let closed = tokio::time::timeout(Duration::from_millis(300), peer.recv()).await;
        assert_eq!(closed, Ok(None));
    }

    #[tokio::test]
    async fn test_bad_schema_shuts_connection() {
        let (_session, mut streams, mut peer) = open_session().await;

        peer.send("not a schema");
        assert!(streams.errors.recv().await.is_some());
        let closed = tokio::time::timeout(Duration::from_millis(300), peer.recv()).await;
        assert_eq!(closed, Ok(None));
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let (session, _streams, mut peer) = ready_session().await;

        peer.stop_receiving();
        assert!(matches!(
            session.send_status_request().await,
            Err(ShipError::ConnectionClosed)
        ));
        // write-path failures do not end the session
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_failed_blocks_request_keeps_window() {
        let abi = ship_abi();
        let (session, mut streams, mut peer) = ready_session().await;
        let window = session.flow_window();

        session
            .send_blocks_request(&BlocksRequest::new(2, 10).max_messages_in_flight(3))
            .await
            .unwrap();
        peer.recv().await.unwrap();
        peer.send(blocks_frame(&abi, 2));
        streams.blocks.recv().await.unwrap();
        assert_eq!(window.in_flight(), 1);

        peer.stop_receiving();
        let retry = BlocksRequest::new(3, 10).max_messages_in_flight(8);
        assert!(session.send_blocks_request(&retry).await.is_err());
        assert_eq!(window.max_in_flight(), 3);
        assert_eq!(window.in_flight(), 1);
    }

    /// Reports the empty-body defect after encoding every status request.
    struct DefectiveAbi(Abi);

    impl Schema for DefectiveAbi {
        fn from_document(document: &[u8]) -> Result<Self> {
            Ok(Self(Abi::from_document(document)?))
        }

        fn decode(
            &self,
            buf: &mut Bytes,
            type_name: &str,
        ) -> std::result::Result<Value, AbiError> {
            self.0.decode(buf, type_name)
        }

        fn encode(
            &self,
            buf: &mut BytesMut,
            type_name: &str,
            value: &Value,
        ) -> std::result::Result<(), AbiError> {
            self.0.encode(buf, type_name, value)?;
            match value {
                Value::Variant(tag, _) if tag == GET_STATUS_REQUEST_V0 => {
                    Err(AbiError::Custom(KNOWN_EMPTY_BODY_DEFECT.into()))
                }
                _ => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_status_request_survives_codec_defect() {
        let abi = ship_abi();
        let (dialer, mut peer) = memory_pair();
        let mut session: Session<DefectiveAbi, MemoryDialer> =
            Session::builder().build_with(dialer);
        session.open().await.unwrap();
        let mut streams = session.take_streams().unwrap();

        peer.send(SHIP_ABI);
        streams.ready.recv().await.unwrap();

        session.send_status_request().await.unwrap();
        let (tag, _) = decode_request(&abi, peer.recv().await.unwrap());
        assert_eq!(tag, GET_STATUS_REQUEST_V0);
    }
}
