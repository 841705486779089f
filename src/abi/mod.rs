//! Schema codec - turns frames into [`Value`] trees and back.
//!
//! The session only talks to a codec through the [`Schema`] trait:
//!
//! - [`Schema::from_document`] parses the handshake frame
//! - [`Schema::decode`] reads one value of a named type from a frame
//! - [`Schema::encode`] appends one value of a named type to a frame
//!
//! [`Abi`] is the bundled implementation: it understands JSON ABI documents
//! and the binary layout used by state-history nodes.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use ship_client::abi::{Abi, Fields, Schema, Value};
//!
//! let abi = Abi::from_document(br#"{
//!     "version": "eosio::abi/1.1",
//!     "structs": [{"name": "ack", "fields": [{"name": "n", "type": "uint32"}]}]
//! }"#).unwrap();
//!
//! let mut body = Fields::new();
//! body.insert("n".into(), Value::from(3u32));
//!
//! let mut frame = BytesMut::new();
//! abi.encode(&mut frame, "ack", &Value::Struct(body.clone())).unwrap();
//! assert_eq!(&frame[..], &[3, 0, 0, 0]);
//!
//! let decoded = abi.decode(&mut frame.freeze(), "ack").unwrap();
//! assert_eq!(decoded, Value::Struct(body));
//! ```

mod binary;
mod schema;
mod value;

use bytes::{Bytes, BytesMut};

use crate::error::{AbiError, Result};

pub use binary::{read_varuint32, write_varuint32};
pub use schema::{Abi, AbiDef, FieldDef, StructDef, TypeDef, VariantDef};
pub use value::{Fields, Value};

/// A codec for schema-described values, received once per session.
///
/// Implementations must be immutable after construction: the session shares
/// one instance between the read loop and request senders.
pub trait Schema: Send + Sync + Sized + 'static {
    /// Parse the schema document carried by the handshake frame.
    fn from_document(document: &[u8]) -> Result<Self>;

    /// Decode one value of `type_name`, advancing `buf` past it.
    fn decode(&self, buf: &mut Bytes, type_name: &str) -> std::result::Result<Value, AbiError>;

    /// Append the encoding of `value` as `type_name` to `buf`.
    fn encode(
        &self,
        buf: &mut BytesMut,
        type_name: &str,
        value: &Value,
    ) -> std::result::Result<(), AbiError>;
}

impl Schema for Abi {
    fn from_document(document: &[u8]) -> Result<Self> {
        Abi::from_json(document)
    }

    fn decode(&self, buf: &mut Bytes, type_name: &str) -> std::result::Result<Value, AbiError> {
        self.decode_type(buf, type_name, 0)
    }

    fn encode(
        &self,
        buf: &mut BytesMut,
        type_name: &str,
        value: &Value,
    ) -> std::result::Result<(), AbiError> {
        self.encode_type(buf, type_name, value, 0)
    }
}
