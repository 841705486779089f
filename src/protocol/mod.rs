//! Protocol module - request and result envelopes.
//!
//! After the handshake every frame carries exactly one schema-encoded
//! envelope:
//! - outbound frames hold a `request` variant ([`ShipRequest`])
//! - inbound frames hold a `result` variant ([`ShipResult`])
//!
//! The tag strings are part of the wire protocol and must match the node's
//! ABI exactly.

mod request;
mod result;

pub use request::{
    encode_request, is_known_empty_body_defect, ShipRequest, GET_BLOCKS_ACK_REQUEST_V0,
    GET_BLOCKS_REQUEST_V1, GET_STATUS_REQUEST_V0, KNOWN_EMPTY_BODY_DEFECT,
};
pub use result::{read_result, ShipResult, GET_BLOCKS_RESULT_V2, GET_STATUS_RESULT_V0};

/// Schema type of the outbound envelope.
pub const REQUEST_TYPE: &str = "request";

/// Schema type of the inbound envelope.
pub const RESULT_TYPE: &str = "result";
