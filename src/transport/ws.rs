//! WebSocket transport built on `tokio-tungstenite`.
//!
//! Nodes send the ABI as a text message and everything else as binary
//! messages; both are handed to the session as plain frames. Ping and pong
//! messages never reach the session.
//!
//! Inbound size caps come from [`SessionConfig`]. Unlike tungstenite's
//! defaults they are off unless configured.

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use super::{Dialer, FrameReader, FrameWriter};
use crate::config::SessionConfig;
use crate::error::{Result, ShipError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dials `ws://` URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WsDialer {
    max_message_size: Option<usize>,
    max_frame_size: Option<usize>,
}

impl WsDialer {
    /// A dialer without size caps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the size caps from `config`.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            max_frame_size: config.max_frame_size,
        }
    }

    pub fn max_message_size(mut self, limit: Option<usize>) -> Self {
        self.max_message_size = limit;
        self
    }

    pub fn max_frame_size(mut self, limit: Option<usize>) -> Self {
        self.max_frame_size = limit;
        self
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_frame_size;
        config
    }
}

/// Read half of a WebSocket connection.
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

/// Write half of a WebSocket connection.
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

impl Dialer for WsDialer {
    type Reader = WsReader;
    type Writer = WsWriter;

    async fn dial(&self, url: &str) -> Result<(WsReader, WsWriter)> {
        let (stream, response) =
            connect_async_with_config(url, Some(self.websocket_config()), false).await?;
        if response.status() != StatusCode::SWITCHING_PROTOCOLS {
            return Err(ShipError::UnexpectedStatus(response.status().as_u16()));
        }
        tracing::debug!("Connected to {}", url);

        let (sink, stream) = stream.split();
        Ok((WsReader { stream }, WsWriter { sink }))
    }
}

impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Bytes::from(data)),
                Some(Ok(Message::Text(text))) => return Ok(Bytes::from(text)),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!("Node closed the connection: {:?}", frame);
                    return Err(ShipError::ConnectionClosed);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ShipError::ConnectionClosed),
            }
        }
    }
}

impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, frame: Bytes) -> Result<()> {
        self.sink.send(Message::Binary(frame.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.sink.close().await?;
        Ok(())
    }
}
