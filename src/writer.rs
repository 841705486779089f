//! One-frame request writer.
//!
//! Writes are not pipelined. Sending a request goes through one cycle:
//!
//! ```text
//! acquire (lock writer half) ─► encode into buffer ─► finish (send frame, unlock)
//! ```
//!
//! Holding the lock for the whole cycle keeps two concurrent requests from
//! interleaving. [`RequestWriter::finish`] consumes the writer, so a frame is
//! ended exactly once and nothing can be written after it. Dropping the
//! writer without finishing discards the frame.

use bytes::BytesMut;
use tokio::sync::{Mutex, MutexGuard};

use crate::error::{Result, ShipError};
use crate::transport::FrameWriter;

/// Initial capacity of a request frame buffer.
const DEFAULT_FRAME_CAPACITY: usize = 256;

/// Exclusive access to the connection for one outbound frame.
pub(crate) struct RequestWriter<'a, W: FrameWriter> {
    guard: MutexGuard<'a, Option<W>>,
    buf: BytesMut,
}

impl<'a, W: FrameWriter> RequestWriter<'a, W> {
    /// Wait for the writer half and take it for one frame.
    ///
    /// Fails with [`ShipError::SessionClosed`] once the session dropped its
    /// connection.
    pub(crate) async fn acquire(slot: &'a Mutex<Option<W>>) -> Result<Self> {
        let guard = slot.lock().await;
        if guard.is_none() {
            return Err(ShipError::SessionClosed);
        }
        Ok(Self {
            guard,
            buf: BytesMut::with_capacity(DEFAULT_FRAME_CAPACITY),
        })
    }

    /// Frame buffer to encode into.
    pub(crate) fn buffer(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// End the frame and send it.
    pub(crate) async fn finish(mut self) -> Result<()> {
        let frame = std::mem::take(&mut self.buf).freeze();
        let writer = self.guard.as_mut().ok_or(ShipError::SessionClosed)?;
        tracing::trace!("Writing {} byte frame", frame.len());
        writer.write_frame(frame).await
    }
}
