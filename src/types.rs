//! Typed request and result records exchanged with the node.
//!
//! These are the strongly-typed views of the schema-encoded bodies. Outbound
//! requests are turned into [`Value`](crate::abi::Value) trees by the
//! [`protocol`](crate::protocol) module; inbound bodies are mapped back into
//! [`StatusResult`] and [`BlocksResult`].

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Highest representable block number, used for open-ended ranges.
pub const MAX_BLOCK_NUM: u32 = 0xffff_ffff;

/// A 32-byte hash (block id, chain id).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Checksum256(pub [u8; 32]);

impl Checksum256 {
    /// Size in bytes.
    pub const LEN: usize = 32;

    /// Build from a slice, which must be exactly 32 bytes long.
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 32] = data.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Borrow the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Checksum256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Checksum256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Checksum256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Checksum256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum256({})", self)
    }
}

impl FromStr for Checksum256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out)?;
        Ok(Self(out))
    }
}

impl Serialize for Checksum256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Checksum256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A `(block number, block id)` pair identifying one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockPosition {
    pub block_num: u32,
    pub block_id: Checksum256,
}

impl BlockPosition {
    pub fn new(block_num: u32, block_id: Checksum256) -> Self {
        Self {
            block_num,
            block_id,
        }
    }
}

/// Answer to a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub head: BlockPosition,
    pub last_irreversible: BlockPosition,
    pub trace_begin_block: u32,
    pub trace_end_block: u32,
    pub chain_state_begin_block: u32,
    pub chain_state_end_block: u32,
    pub chain_id: Checksum256,
}

/// One streamed block message.
///
/// `this_block` and `prev_block` are `None` when the node has no block at the
/// requested position (before the range start or past the end of history).
/// The payloads are `None` when the matching `fetch_*` flag was off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksResult {
    pub head: BlockPosition,
    pub last_irreversible: BlockPosition,
    pub this_block: Option<BlockPosition>,
    pub prev_block: Option<BlockPosition>,
    pub block: Option<Bytes>,
    pub block_header: Option<Bytes>,
    pub traces: Option<Bytes>,
    pub deltas: Option<Bytes>,
}

/// Request for a range of blocks `[start_block_num, end_block_num)`.
///
/// The node sends at most `max_messages_in_flight` results before it needs a
/// [`BlocksAckRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksRequest {
    pub start_block_num: u32,
    pub end_block_num: u32,
    pub max_messages_in_flight: u32,
    pub have_positions: Vec<BlockPosition>,
    pub irreversible_only: bool,
    pub fetch_block: bool,
    pub fetch_traces: bool,
    pub fetch_deltas: bool,
    pub fetch_block_header: bool,
}

impl BlocksRequest {
    /// Request `[start, end)` with a window of one message and nothing fetched.
    pub fn new(start_block_num: u32, end_block_num: u32) -> Self {
        Self {
            start_block_num,
            end_block_num,
            max_messages_in_flight: 1,
            have_positions: Vec::new(),
            irreversible_only: false,
            fetch_block: false,
            fetch_traces: false,
            fetch_deltas: false,
            fetch_block_header: false,
        }
    }

    /// Set the flow-control window.
    pub fn max_messages_in_flight(mut self, n: u32) -> Self {
        self.max_messages_in_flight = n;
        self
    }

    /// Positions the client already has, used by the node to detect forks.
    pub fn have_positions(mut self, positions: Vec<BlockPosition>) -> Self {
        self.have_positions = positions;
        self
    }

    pub fn irreversible_only(mut self, on: bool) -> Self {
        self.irreversible_only = on;
        self
    }

    pub fn fetch_block(mut self, on: bool) -> Self {
        self.fetch_block = on;
        self
    }

    pub fn fetch_traces(mut self, on: bool) -> Self {
        self.fetch_traces = on;
        self
    }

    pub fn fetch_deltas(mut self, on: bool) -> Self {
        self.fetch_deltas = on;
        self
    }

    pub fn fetch_block_header(mut self, on: bool) -> Self {
        self.fetch_block_header = on;
        self
    }
}

/// Acknowledges `num_messages` blocks results, reopening the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlocksAckRequest {
    pub num_messages: u32,
}

impl BlocksAckRequest {
    pub fn new(num_messages: u32) -> Self {
        Self { num_messages }
    }
}
