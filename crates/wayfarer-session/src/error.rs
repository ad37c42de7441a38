//! Error types for the session layer.

use wayfarer_protocol::PlayerId;
use wayfarer_transport::ConnectionId;

use crate::AuthState;

/// Errors that can occur during authentication and session management.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credentials, registration, or verification code were
    /// rejected. The message is safe to show to the client.
    #[error("{0}")]
    AuthFailed(String),

    /// The [`Authenticator`](crate::Authenticator) does not implement
    /// this flow.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// No live session exists for the connection.
    #[error("no session for {0}")]
    NotFound(ConnectionId),

    /// A session already exists for the connection.
    #[error("{0} is already registered")]
    AlreadyRegistered(ConnectionId),

    /// The session is not in a state that allows the operation.
    #[error("{conn} is {state:?}")]
    InvalidState { conn: ConnectionId, state: AuthState },

    /// Another live session already holds this player id.
    #[error("player {0} is already logged in")]
    AlreadyLoggedIn(PlayerId),

    /// A message could not be queued for the connection: its outbox is
    /// closed or stayed full past the send timeout.
    #[error("send to {conn} failed: {reason}")]
    SendFailed { conn: ConnectionId, reason: String },
}
