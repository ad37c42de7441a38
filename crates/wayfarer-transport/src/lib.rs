//! Transport layer for Wayfarer.
//!
//! Turns a reliable, ordered byte stream into discrete frames and back:
//!
//! - [`varint`]: the base-128 varint32 used for length prefixes
//! - [`FrameDecoder`] / [`FrameReader`] / [`FrameWriter`]: framing
//! - [`TcpTransport`]: accepts TCP connections and hands out framed halves
//!
//! ```text
//! socket bytes → FrameReader → payload bytes → (protocol layer)
//! ```

mod error;
mod frame;
mod tcp;
pub mod varint;

pub use error::TransportError;
pub use frame::{
    DEFAULT_MAX_FRAME_SIZE, FrameDecoder, FrameReader, FrameStep, FrameWriter,
    MAX_ENCODABLE_FRAME, encode_frame,
};
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
