//! In-process transport backed by tokio channels.
//!
//! [`memory_pair`] returns a dialer for the session and a [`MemoryPeer`]
//! playing the node. The dialer hands out its connection once; later dials
//! are refused.
//!
//! # Example
//!
//! ```
//! use ship_client::transport::{memory_pair, Dialer, FrameReader, FrameWriter};
//!
//! # tokio_test_block_on(async {
//! let (dialer, mut peer) = memory_pair();
//! let (mut reader, mut writer) = dialer.dial("ws://ignored:0").await.unwrap();
//!
//! peer.send("hello");
//! assert_eq!(&reader.read_frame().await.unwrap()[..], b"hello");
//!
//! writer.write_frame("hi".into()).await.unwrap();
//! assert_eq!(&peer.recv().await.unwrap()[..], b"hi");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{Dialer, FrameReader, FrameWriter};
use crate::error::{Result, ShipError};

type Inbound = Result<Bytes>;

/// Hands out one pre-built in-memory connection.
#[derive(Clone)]
pub struct MemoryDialer {
    connection: Arc<Mutex<Option<(MemoryReader, MemoryWriter)>>>,
}

/// Session-side read half.
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

/// Session-side write half.
pub struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<Bytes>>,
}

/// The node side of an in-memory connection.
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Inbound>>,
    rx: Option<mpsc::UnboundedReceiver<Bytes>>,
}

/// Create a connected dialer/peer pair.
pub fn memory_pair() -> (MemoryDialer, MemoryPeer) {
    let (to_client, from_peer) = mpsc::unbounded_channel();
    let (to_peer, from_client) = mpsc::unbounded_channel();

    let dialer = MemoryDialer {
        connection: Arc::new(Mutex::new(Some((
            MemoryReader { rx: from_peer },
            MemoryWriter { tx: Some(to_peer) },
        )))),
    };
    let peer = MemoryPeer {
        tx: Some(to_client),
        rx: Some(from_client),
    };
    (dialer, peer)
}

impl MemoryDialer {
    /// A dialer whose every dial is refused.
    pub fn refusing() -> Self {
        Self {
            connection: Arc::new(Mutex::new(None)),
        }
    }

    fn take(&self) -> Option<(MemoryReader, MemoryWriter)> {
        match self.connection.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl Dialer for MemoryDialer {
    type Reader = MemoryReader;
    type Writer = MemoryWriter;

    async fn dial(&self, url: &str) -> Result<(MemoryReader, MemoryWriter)> {
        self.take().ok_or_else(|| {
            ShipError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no in-memory connection left for {}", url),
            ))
        })
    }
}

impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Bytes> {
        self.rx.recv().await.unwrap_or(Err(ShipError::ConnectionClosed))
    }
}

impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: Bytes) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ShipError::ConnectionClosed)?;
        tx.send(frame).map_err(|_| ShipError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

impl MemoryPeer {
    /// Deliver a frame to the session. Returns `false` once the session side is gone.
    pub fn send(&self, frame: impl Into<Bytes>) -> bool {
        self.tx
            .as_ref()
            .is_some_and(|tx| tx.send(Ok(frame.into())).is_ok())
    }

    /// Make the session's next read fail with `err`.
    pub fn fail(&self, err: ShipError) -> bool {
        self.tx.as_ref().is_some_and(|tx| tx.send(Err(err)).is_ok())
    }

    /// Next frame written by the session, or `None` once it closed its writer.
    pub async fn recv(&mut self) -> Option<Bytes> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Stop reading: the session's writes fail while its reads keep working.
    pub fn stop_receiving(&mut self) {
        self.rx = None;
    }

    /// Hang up: pending frames are still delivered, then reads fail.
    pub fn close(&mut self) {
        self.tx = None;
    }
}
