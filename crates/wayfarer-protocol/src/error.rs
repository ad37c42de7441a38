//! Error types for the protocol layer.
//!
//! Every variant here is recoverable from the connection's point of
//! view: the frame that produced it is dropped and the connection keeps
//! reading.

use wayfarer_transport::varint::VarintError;

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended in the middle of a field.
    #[error("message truncated")]
    Truncated,

    /// A tag, length, or varint field could not be decoded.
    #[error("bad varint: {0}")]
    Varint(#[from] VarintError),

    /// A field used a wire type this codec cannot skip.
    #[error("unsupported wire type {0}")]
    UnsupportedWireType(u8),

    /// A known field arrived with the wrong wire type.
    #[error("field {field} has the wrong wire type")]
    WireTypeMismatch { field: u32 },

    /// A string field was not valid UTF-8.
    #[error("field {field} is not valid UTF-8")]
    InvalidUtf8 { field: u32 },

    /// The envelope's kind tag is not one this server knows.
    #[error("unknown message kind {0}")]
    UnknownMessageKind(u32),

    /// The envelope's kind tag and payload disagree, or the payload is
    /// missing or duplicated.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// JSON deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
