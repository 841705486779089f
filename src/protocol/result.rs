//! Inbound result envelope and mapping into typed records.

use bytes::Bytes;

use super::RESULT_TYPE;
use crate::abi::{Fields, Schema, Value};
use crate::error::{Result, ShipError};
use crate::types::{BlockPosition, BlocksResult, Checksum256, StatusResult};

pub const GET_STATUS_RESULT_V0: &str = "get_status_result_v0";
pub const GET_BLOCKS_RESULT_V2: &str = "get_blocks_result_v2";

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipResult {
    Status(StatusResult),
    Blocks(BlocksResult),
    /// Any other tag. The stream cannot be trusted past this point.
    Unhandled(String),
}

impl ShipResult {
    /// Decode a frame and map it to a typed result.
    pub fn decode<S: Schema>(schema: &S, frame: Bytes) -> Result<Self> {
        let (tag, body) = read_result(schema, frame)?;
        Self::from_envelope(tag, &body)
    }

    /// Map an already decoded `(tag, body)` pair.
    pub fn from_envelope(tag: String, body: &Fields) -> Result<Self> {
        match tag.as_str() {
            GET_STATUS_RESULT_V0 => Ok(ShipResult::Status(StatusResult::try_from(body)?)),
            GET_BLOCKS_RESULT_V2 => Ok(ShipResult::Blocks(BlocksResult::try_from(body)?)),
            _ => Ok(ShipResult::Unhandled(tag)),
        }
    }
}

/// Decode a frame as the `result` envelope: a type tag and a struct body.
pub fn read_result<S: Schema>(schema: &S, mut frame: Bytes) -> Result<(String, Fields)> {
    let value = schema.decode(&mut frame, RESULT_TYPE)?;
    let kind = value.kind();
    let (tag, body) = value
        .into_variant()
        .ok_or_else(|| ShipError::Envelope(format!("expected variant, found {}", kind)))?;
    match body {
        Value::Struct(fields) => Ok((tag, fields)),
        other => Err(ShipError::Envelope(format!(
            "`{}` body is {}, not a struct",
            tag,
            other.kind()
        ))),
    }
}

// Field accessors. Errors name the full path, e.g. `head.block_num`.

fn field<'a>(body: &'a Fields, path: &str) -> Result<&'a Value> {
    body.get(leaf(path))
        .ok_or_else(|| ShipError::field(path, "missing"))
}

fn leaf(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

fn unexpected(path: &str, expected: &str, found: &Value) -> ShipError {
    ShipError::field(path, format!("expected {}, found {}", expected, found.kind()))
}

fn u32_field(body: &Fields, path: &str) -> Result<u32> {
    let value = field(body, path)?;
    value
        .as_u32()
        .ok_or_else(|| unexpected(path, "uint32", value))
}

fn checksum_field(body: &Fields, path: &str) -> Result<Checksum256> {
    let value = field(body, path)?;
    value
        .as_checksum256()
        .ok_or_else(|| unexpected(path, "checksum256", value))
}

fn position_value(value: &Value, path: &str) -> Result<BlockPosition> {
    let fields = value
        .as_struct()
        .ok_or_else(|| unexpected(path, "block_position", value))?;
    Ok(BlockPosition {
        block_num: u32_field(fields, &format!("{}.block_num", path))?,
        block_id: checksum_field(fields, &format!("{}.block_id", path))?,
    })
}

fn position_field(body: &Fields, path: &str) -> Result<BlockPosition> {
    position_value(field(body, path)?, path)
}

/// Present only when the field exists and is not null.
fn optional_position_field(body: &Fields, path: &str) -> Result<Option<BlockPosition>> {
    match body.get(path) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => position_value(value, path).map(Some),
    }
}

fn optional_bytes_field(body: &Fields, path: &str) -> Result<Option<Bytes>> {
    match body.get(path) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bytes(b)) => Ok(Some(b.clone())),
        Some(other) => Err(unexpected(path, "bytes", other)),
    }
}

impl TryFrom<&Fields> for StatusResult {
    type Error = ShipError;

    fn try_from(body: &Fields) -> Result<Self> {
        Ok(StatusResult {
            head: position_field(body, "head")?,
            last_irreversible: position_field(body, "last_irreversible")?,
            trace_begin_block: u32_field(body, "trace_begin_block")?,
            trace_end_block: u32_field(body, "trace_end_block")?,
            chain_state_begin_block: u32_field(body, "chain_state_begin_block")?,
            chain_state_end_block: u32_field(body, "chain_state_end_block")?,
            chain_id: checksum_field(body, "chain_id")?,
        })
    }
}

impl TryFrom<&Fields> for BlocksResult {
    type Error = ShipError;

    fn try_from(body: &Fields) -> Result<Self> {
        Ok(BlocksResult {
            head: position_field(body, "head")?,
            last_irreversible: position_field(body, "last_irreversible")?,
            this_block: optional_position_field(body, "this_block")?,
            prev_block: optional_position_field(body, "prev_block")?,
            block: optional_bytes_field(body, "block")?,
            block_header: optional_bytes_field(body, "block_header")?,
            traces: optional_bytes_field(body, "traces")?,
            deltas: optional_bytes_field(body, "deltas")?,
        })
    }
}
