//! Error types for the map layer.
//!
//! None of these ever reach a client. The cache client and the
//! broadcaster log them and carry on with what they have in memory.

use std::time::Duration;

/// Errors from the position cache and the durable position store.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The operation did not finish within its time budget.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The backing service refused or failed the operation.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A record could not be serialized for the cache.
    #[error("failed to encode position: {0}")]
    Encode(serde_json::Error),

    /// A cached value was not a valid position record.
    #[error("corrupt cache entry {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}
