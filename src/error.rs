//! Error types for ship-client.

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for all session operations.
#[derive(Debug, Error)]
pub enum ShipError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    /// The node answered the upgrade request with something other than 101.
    #[error("Unhandled ship http response {0}")]
    UnexpectedStatus(u16),

    /// The handshake frame is not a valid schema document.
    #[error("Schema document error: {0}")]
    SchemaDocument(#[from] serde_json::Error),

    /// Binary encode/decode failure reported by the schema codec.
    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),

    /// A decoded body field is missing or has an unexpected shape.
    #[error("Field `{field}`: {reason}")]
    Field { field: String, reason: String },

    /// The result envelope did not decode to a `(tag, body)` pair.
    #[error("Malformed result envelope: {0}")]
    Envelope(String),

    /// The node sent a result type this client does not understand.
    #[error("Unhandled message type: {0}")]
    UnhandledMessage(String),

    /// A request was issued before the schema handshake completed.
    #[error("Session is not ready")]
    NotReady,

    /// The session was closed, explicitly or after a fatal error.
    #[error("Session closed")]
    SessionClosed,

    /// The remote side closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No frame arrived within the configured read timeout.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),
}

impl From<tungstenite::Error> for ShipError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                ShipError::UnexpectedStatus(response.status().as_u16())
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                ShipError::ConnectionClosed
            }
            other => ShipError::WebSocket(Box::new(other)),
        }
    }
}

impl ShipError {
    pub(crate) fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ShipError::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a schema codec while encoding or decoding values.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("unexpected end of input while decoding `{0}`")]
    UnexpectedEof(String),

    #[error("varuint32 is too long or overflows")]
    VarUintOverflow,

    #[error("invalid utf-8 in string")]
    InvalidUtf8,

    #[error("invalid optional flag {0}")]
    InvalidOptionalFlag(u8),

    #[error("value {value} out of range for `{type_name}`")]
    OutOfRange { type_name: String, value: String },

    #[error("expected {expected} found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("struct `{struct_name}` is missing field `{field}`")]
    MissingField { struct_name: String, field: String },

    #[error("variant `{variant}` has no type `{tag}`")]
    UnknownVariant { variant: String, tag: String },

    #[error("variant `{variant}` index {index} out of range")]
    VariantIndex { variant: String, index: u32 },

    #[error("type definitions nest too deeply at `{0}`")]
    RecursionLimit(String),

    /// Free-form failure from a codec implementation.
    #[error("{0}")]
    Custom(String),
}

/// Result type alias using ShipError.
pub type Result<T> = std::result::Result<T, ShipError>;
