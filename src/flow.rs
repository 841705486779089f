//! Flow-control accounting for streamed blocks.
//!
//! A blocks request grants the node a window of `max_messages_in_flight`
//! results. Every delivered blocks result consumes one slot; an ack of `n`
//! messages gives `n` slots back. The node stops sending while the window is
//! exhausted, so a consumer that forgets to ack stalls the stream.
//!
//! The session only keeps the books here. It never acknowledges on its own:
//! acking is the consumer's decision, made once a result is actually handled.
//!
//! # Example
//!
//! ```ignore
//! let window = session.flow_window();
//! if window.is_saturated() {
//!     session.send_ack_blocks_request(&BlocksAckRequest::new(window.in_flight())).await?;
//! }
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared view of the blocks flow-control window.
///
/// Cloning is cheap and all clones observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct FlowWindow {
    /// Results delivered but not yet acknowledged.
    in_flight: Arc<AtomicU32>,
    /// Window granted by the last blocks request.
    max_in_flight: Arc<AtomicU32>,
}

impl FlowWindow {
    /// Create an empty window (nothing granted yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accounting for a new blocks request.
    ///
    /// The node restarts its stream on every blocks request, so the
    /// outstanding count starts over.
    pub(crate) fn reset(&self, max_in_flight: u32) {
        self.max_in_flight.store(max_in_flight, Ordering::Release);
        self.in_flight.store(0, Ordering::Release);
    }

    /// One blocks result was handed to the consumer.
    pub(crate) fn record_delivery(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_add(1))
            });
    }

    /// `num_messages` results were acknowledged.
    pub(crate) fn acknowledge(&self, num_messages: u32) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(num_messages))
            });
    }

    /// Results delivered but not yet acknowledged.
    #[inline]
    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Window granted by the last blocks request.
    #[inline]
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::Acquire)
    }

    /// Results the node may still send before it needs an ack.
    #[inline]
    pub fn available(&self) -> u32 {
        self.max_in_flight().saturating_sub(self.in_flight())
    }

    /// Whether the node is waiting for an ack.
    #[inline]
    pub fn is_saturated(&self) -> bool {
        self.in_flight() >= self.max_in_flight()
    }
}
