//! Session types: the server's record of one live connection.
//!
//! A session tracks:
//! - WHICH connection it belongs to (`ConnectionId`)
//! - WHO the player is, once they have logged in (`PlayerId`)
//! - WHAT they may send right now ([`AuthState`])
//! - WHEN they last sent anything (for idle eviction)

use std::time::Duration;

use tokio::time::Instant;
use wayfarer_protocol::{MessageKind, PlayerId, PositionRecord};
use wayfarer_transport::ConnectionId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A session with no inbound traffic for this long is closed by the
    /// idle sweep. Default: 60 seconds.
    pub idle_timeout: Duration,

    /// How many outbound messages may queue for one connection before
    /// senders start waiting. Default: 64.
    pub outbox_capacity: usize,

    /// How long a sender waits for room in a full outbox before giving
    /// up on that recipient. Default: 1 second.
    pub send_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            outbox_capacity: 64,
            send_timeout: Duration::from_secs(1),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// The authentication phase of a session.
///
/// ```text
///   Connected ──(login ok)──→ Authenticated
///       │                          │
///       └──(transport closed)──────┴──→ Closed
/// ```
///
/// - **Connected**: only auth requests are accepted.
/// - **Authenticated**: the player has an id and may move around.
/// - **Closed**: terminal. The session is gone from the store; a
///   reconnect gets a brand-new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    Connected,
    Authenticated,
    Closed,
}

impl AuthState {
    /// Whether a session in this state may send `kind`.
    pub fn permits(self, kind: MessageKind) -> bool {
        match self {
            Self::Connected => matches!(
                kind,
                MessageKind::RegisterRequest
                    | MessageKind::LoginRequest
                    | MessageKind::VerifyEmailRequest
            ),
            Self::Authenticated => kind == MessageKind::PositionUpdate,
            Self::Closed => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A snapshot of one connection's session.
///
/// The [`SessionStore`](crate::SessionStore) owns the live value; callers
/// always get clones, so holding a `Session` never blocks the store.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,

    /// Unset until login succeeds.
    pub player_id: Option<PlayerId>,

    pub state: AuthState,

    pub connected_at: Instant,

    /// Updated on inbound traffic, including bytes of unfinished frames.
    pub last_active_at: Instant,

    /// Set on login.
    pub user_email: Option<String>,

    /// Set on login.
    pub auth_token: Option<String>,

    /// The last position this player reported, kept in memory so
    /// teardown still knows it when the position cache is down.
    pub last_position: Option<PositionRecord>,
}

impl Session {
    pub fn new(connection_id: ConnectionId) -> Self {
        let now = Instant::now();
        Self {
            connection_id,
            player_id: None,
            state: AuthState::Connected,
            connected_at: now,
            last_active_at: now,
            user_email: None,
            auth_token: None,
            last_position: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active_at.elapsed()
    }
}
