//! Unified error type for the Wayfarer server.

use wayfarer_map::MapError;
use wayfarer_protocol::ProtocolError;
use wayfarer_session::SessionError;
use wayfarer_transport::TransportError;

use crate::ConfigError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` generates the `From` impls, so `?` converts sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WayfarerError {
    /// Binding, accepting, reading, or writing a socket.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or decoding an envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or session bookkeeping.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Position cache or durable store.
    #[error(transparent)]
    Map(#[from] MapError),

    /// Loading or validating the server configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let wayfarer_err: WayfarerError = err.into();
        assert!(matches!(wayfarer_err, WayfarerError::Transport(_)));
        assert!(wayfarer_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownMessageKind(99);
        let wayfarer_err: WayfarerError = err.into();
        assert!(matches!(wayfarer_err, WayfarerError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("nope".into());
        let wayfarer_err: WayfarerError = err.into();
        assert!(matches!(wayfarer_err, WayfarerError::Session(_)));
    }

    #[test]
    fn test_from_config_error() {
        let err = ConfigError::Invalid {
            field: "view_distance",
            reason: "must be positive".into(),
        };
        let wayfarer_err: WayfarerError = err.into();
        assert!(wayfarer_err.to_string().contains("view_distance"));
    }
}
