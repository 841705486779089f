//! Transport module - message-oriented duplex connections.
//!
//! The session needs three things from a transport:
//! - [`Dialer::dial`] to open a connection and split it in two halves
//! - [`FrameReader::read_frame`] to pull one complete inbound message
//! - [`FrameWriter::write_frame`] / [`FrameWriter::close`] for the other side
//!
//! Implementations:
//! - [`WsDialer`] - WebSocket, what state-history nodes speak
//! - [`MemoryDialer`] - in-process channels, for tests and embedding

mod memory;
mod ws;

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

pub use memory::{memory_pair, MemoryDialer, MemoryPeer, MemoryReader, MemoryWriter};
pub use ws::{WsDialer, WsReader, WsWriter};

/// Opens connections to a node.
pub trait Dialer: Send + Sync + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    /// Connect to `url` and return the read and write halves.
    fn dial(&self, url: &str) -> impl Future<Output = Result<(Self::Reader, Self::Writer)>> + Send;
}

/// Inbound half of a connection.
pub trait FrameReader: Send + 'static {
    /// Wait for the next complete message.
    ///
    /// A closed connection is an error ([`ShipError::ConnectionClosed`](crate::ShipError::ConnectionClosed)).
    fn read_frame(&mut self) -> impl Future<Output = Result<Bytes>> + Send;
}

/// Outbound half of a connection.
pub trait FrameWriter: Send + 'static {
    /// Send one complete message.
    fn write_frame(&mut self, frame: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Build the node URL for `host` and `port`.
pub fn ship_url(host: &str, port: u16) -> String {
    format!("ws://{}:{}", host, port)
}
