//! Message dispatch: one decoded envelope in, addressed envelopes out.
//!
//! The routing table maps each inbound [`MessageKind`] to a [`Route`]
//! and is built once when the server starts. Dispatch itself is a pure
//! routing step:
//!
//! 1. Look up the route. Kinds with no route are server-to-client
//!    messages a client must never send: `Error` 400.
//! 2. Ask the session's [`AuthState`] whether the kind is allowed now.
//!    A position update before login gets `Error` 401; an auth request
//!    after login gets `Error` 409. The session is left as it was.
//! 3. Run exactly one handler and return what it produced.
//!
//! Nothing here writes to a socket. The caller delivers the returned
//! [`Outbound`] list.

use std::collections::HashMap;

use wayfarer_map::{PositionCache, PositionStore};
use wayfarer_protocol::{
    AuthReply, Envelope, InitialPlayers, LoginRequest, LoginResponse, MessageKind, PlayerJoined,
    PlayerPosition, PositionRecord, RegisterRequest, VerifyEmailRequest, unix_millis,
};
use wayfarer_session::{
    AuthState, Authenticator, Credentials, Outbound, Registration, SessionError,
};
use wayfarer_transport::ConnectionId;

use crate::server::ServerState;

/// Rejection codes carried in `Error` envelopes.
pub mod codes {
    /// The message kind is never valid from a client.
    pub const BAD_REQUEST: u32 = 400;
    /// The message needs a logged-in session.
    pub const UNAUTHORIZED: u32 = 401;
    /// The session is already logged in.
    pub const CONFLICT: u32 = 409;
}

/// Which handler an inbound kind goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Register,
    Login,
    VerifyEmail,
    PositionUpdate,
}

/// The kind → route table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    routes: HashMap<MessageKind, Route>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let routes = HashMap::from([
            (MessageKind::RegisterRequest, Route::Register),
            (MessageKind::LoginRequest, Route::Login),
            (MessageKind::VerifyEmailRequest, Route::VerifyEmail),
            (MessageKind::PositionUpdate, Route::PositionUpdate),
        ]);
        Self { routes }
    }

    pub fn route(&self, kind: MessageKind) -> Option<Route> {
        self.routes.get(&kind).copied()
    }
}

fn reply(to: ConnectionId, envelope: Envelope) -> Vec<Outbound> {
    vec![Outbound::new(to, envelope)]
}

/// Routes one envelope from `conn` and returns what should be sent.
pub(crate) async fn dispatch<A, C, S>(
    state: &ServerState<A, C, S>,
    conn: ConnectionId,
    envelope: Envelope,
) -> Vec<Outbound>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let kind = envelope.kind();

    let Some(route) = state.dispatcher.route(kind) else {
        tracing::warn!(%conn, ?kind, "client sent a server-only message");
        return reply(
            conn,
            Envelope::error(codes::BAD_REQUEST, format!("{kind:?} is not accepted from clients")),
        );
    };

    let Some(session) = state.sessions.get(conn).await else {
        // Closed while the frame was in flight.
        return Vec::new();
    };

    if !session.state.permits(kind) {
        tracing::warn!(%conn, ?kind, state = ?session.state, "message rejected in current state");
        let rejection = match session.state {
            AuthState::Connected => Envelope::error(codes::UNAUTHORIZED, "login required"),
            AuthState::Authenticated => Envelope::error(codes::CONFLICT, "already logged in"),
            AuthState::Closed => return Vec::new(),
        };
        return reply(conn, rejection);
    }

    match (route, envelope) {
        (Route::Register, Envelope::RegisterRequest(req)) => register(state, conn, req).await,
        (Route::Login, Envelope::LoginRequest(req)) => login(state, conn, req).await,
        (Route::VerifyEmail, Envelope::VerifyEmailRequest(req)) => {
            verify_email(state, conn, req).await
        }
        (Route::PositionUpdate, Envelope::PositionUpdate(pos)) => {
            position_update(state, conn, pos).await
        }
        (route, envelope) => {
            tracing::error!(%conn, ?route, kind = ?envelope.kind(), "route does not match payload");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Auth handlers
// ---------------------------------------------------------------------------

async fn register<A, C, S>(
    state: &ServerState<A, C, S>,
    conn: ConnectionId,
    req: RegisterRequest,
) -> Vec<Outbound>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let registration = Registration {
        email: req.email,
        password: req.password,
        player_name: req.player_name,
    };
    let result = state.auth.register(&registration).await;
    tracing::info!(%conn, email = %registration.email, ok = result.is_ok(), "registration");
    reply(conn, Envelope::RegisterResponse(auth_reply(result)))
}

async fn verify_email<A, C, S>(
    state: &ServerState<A, C, S>,
    conn: ConnectionId,
    req: VerifyEmailRequest,
) -> Vec<Outbound>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let result = state.auth.verify_email(&req.email, &req.code).await;
    tracing::info!(%conn, email = %req.email, ok = result.is_ok(), "email verification");
    reply(conn, Envelope::VerifyEmailResponse(auth_reply(result)))
}

fn auth_reply(result: Result<String, SessionError>) -> AuthReply {
    match result {
        Ok(message) => AuthReply {
            success: true,
            message,
        },
        Err(e) => AuthReply {
            success: false,
            message: e.to_string(),
        },
    }
}

fn login_failed(conn: ConnectionId, message: String) -> Vec<Outbound> {
    reply(
        conn,
        Envelope::LoginResponse(LoginResponse {
            success: false,
            message,
            ..LoginResponse::default()
        }),
    )
}

/// Connected → Authenticated.
///
/// In order: check credentials, bind the player id (rejecting a second
/// live login), cache the starting position, answer with the login
/// result and a snapshot of who is nearby, then tell those players
/// someone joined.
async fn login<A, C, S>(
    state: &ServerState<A, C, S>,
    conn: ConnectionId,
    req: LoginRequest,
) -> Vec<Outbound>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let credentials = Credentials {
        email: req.email,
        password: req.password,
    };
    let grant = match state.auth.login(&credentials).await {
        Ok(grant) => grant,
        Err(e) => {
            tracing::info!(%conn, email = %credentials.email, error = %e, "login failed");
            return login_failed(conn, e.to_string());
        }
    };

    let session = match state.sessions.promote(conn, &grant).await {
        Ok(session) => session,
        Err(SessionError::NotFound(_)) => return Vec::new(),
        Err(e) => {
            tracing::warn!(%conn, player_id = %grant.player_id, error = %e, "login rejected");
            return login_failed(conn, e.to_string());
        }
    };

    let position = PositionRecord {
        player_id: grant.player_id.clone(),
        last_update_time: unix_millis(),
        ..grant.last_position
    };
    if !state.sessions.record_position(conn, position.clone()).await {
        return Vec::new();
    }
    state.map.cache().store(&position).await;

    let neighbors = state.map.nearby(&position).await;
    if !state.sessions.contains(conn).await {
        tracing::debug!(
            %conn,
            player_id = %grant.player_id,
            "closed during login, replies dropped"
        );
        return Vec::new();
    }
    tracing::info!(
        %conn,
        player_id = %grant.player_id,
        x = position.x,
        y = position.y,
        nearby = neighbors.len(),
        "player logged in"
    );

    let mut outbound = vec![
        Outbound::new(
            conn,
            Envelope::LoginResponse(LoginResponse {
                success: true,
                message: "login successful".into(),
                token: session.auth_token.unwrap_or_default(),
                player_id: grant.player_id.clone(),
                position: Some(position.to_wire()),
            }),
        ),
        Outbound::new(
            conn,
            Envelope::InitialPlayers(InitialPlayers {
                players: neighbors.iter().map(|n| n.record.to_wire()).collect(),
            }),
        ),
    ];

    let joined = Envelope::PlayerJoined(PlayerJoined {
        player_id: grant.player_id,
        position: position.to_wire(),
    });
    outbound.extend(
        neighbors
            .iter()
            .map(|n| Outbound::new(n.connection_id, joined.clone())),
    );
    outbound
}

// ---------------------------------------------------------------------------
// Position handler
// ---------------------------------------------------------------------------

/// Stamps the sender's identity and the server time on the update,
/// then fans it out to everyone in view.
async fn position_update<A, C, S>(
    state: &ServerState<A, C, S>,
    conn: ConnectionId,
    pos: PlayerPosition,
) -> Vec<Outbound>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let Some(player_id) = state.sessions.get(conn).await.and_then(|s| s.player_id) else {
        return Vec::new();
    };

    let record = PositionRecord::from_wire(player_id, &pos, unix_millis());
    if !state.sessions.record_position(conn, record.clone()).await {
        return Vec::new();
    }

    let outbound = state.map.publish(&record).await;
    // Teardown may have announced PlayerLeft while the cache was busy.
    if !state.sessions.contains(conn).await {
        tracing::debug!(
            %conn,
            player_id = %record.player_id,
            "closed during update, fan-out dropped"
        );
        return Vec::new();
    }
    tracing::trace!(
        %conn,
        player_id = %record.player_id,
        recipients = outbound.len(),
        "position update"
    );
    outbound
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use tokio::sync::{Notify, mpsc};
    use wayfarer_map::{MapError, MemoryCache, MemoryPositionStore, ProximityBroadcaster};
    use wayfarer_protocol::{PlayerLeft, WireCodec};
    use wayfarer_session::{MemoryAccounts, SessionStore};

    use super::*;
    use crate::ServerConfig;
    use crate::lifecycle::{CloseReason, close_connection};

    /// A cache whose writes, once `hold` is set, park until released.
    #[derive(Default)]
    struct GatedCache {
        inner: MemoryCache,
        hold: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    impl PositionCache for GatedCache {
        async fn get(&self, key: &str) -> Result<Option<String>, MapError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), MapError> {
            if self.hold.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.set(key, value, ttl).await
        }
    }

    type TestState = ServerState<MemoryAccounts, Arc<GatedCache>, MemoryPositionStore>;

    async fn test_state(cache: Arc<GatedCache>) -> TestState {
        let config = ServerConfig {
            view_distance: 15.0,
            ..ServerConfig::default()
        };
        let sessions = Arc::new(SessionStore::new(config.session_config()));
        let map = ProximityBroadcaster::new(Arc::clone(&sessions), cache, config.map_config());
        let auth = MemoryAccounts::new();
        auth.insert_verified("ash@pallet.town", "hunter2", "ash").await;
        auth.insert_verified("misty@cerulean.city", "hunter2", "misty").await;

        ServerState {
            config,
            sessions,
            map,
            dispatcher: Dispatcher::new(),
            auth,
            store: MemoryPositionStore::new(),
            codec: Arc::new(WireCodec),
        }
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn login_request(email: &str) -> Envelope {
        Envelope::LoginRequest(LoginRequest {
            email: email.into(),
            password: "hunter2".into(),
        })
    }

    fn left(name: &str) -> Envelope {
        Envelope::PlayerLeft(PlayerLeft {
            player_id: name.into(),
        })
    }

    /// Registers a connection and returns its outbox receiver.
    async fn open(state: &TestState, id: u64) -> mpsc::Receiver<Envelope> {
        let (tx, rx) = mpsc::channel(8);
        state.sessions.register(conn(id), tx).await.unwrap();
        rx
    }

    #[test]
    fn test_routes_cover_exactly_inbound_kinds() {
        let dispatcher = Dispatcher::new();
        for kind in MessageKind::ALL {
            assert_eq!(
                dispatcher.route(kind).is_some(),
                kind.is_inbound(),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_route_position_update() {
        assert_eq!(
            Dispatcher::new().route(MessageKind::PositionUpdate),
            Some(Route::PositionUpdate)
        );
    }

    #[test]
    fn test_auth_reply_maps_error_to_failure() {
        let reply = auth_reply(Err(SessionError::Unsupported("registration")));
        assert!(!reply.success);
        assert_eq!(reply.message, "registration is not supported");

        let reply = auth_reply(Ok("email verified".into()));
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_position_update_closed_mid_publish_sends_nothing() {
        let cache = Arc::new(GatedCache::default());
        let state = test_state(Arc::clone(&cache)).await;
        let mut ash_rx = open(&state, 1).await;
        let _misty_rx = open(&state, 2).await;
        dispatch(&state, conn(1), login_request("ash@pallet.town")).await;
        dispatch(&state, conn(2), login_request("misty@cerulean.city")).await;

        cache.hold.store(true, Ordering::SeqCst);
        let update = Envelope::PositionUpdate(PlayerPosition {
            x: 1.0,
            ..PlayerPosition::default()
        });
        let (outbound, ()) = tokio::join!(dispatch(&state, conn(2), update), async {
            cache.entered.notified().await;
            close_connection(&state, conn(2), CloseReason::PeerClosed).await;
            cache.release.notify_one();
        });

        assert_eq!(ash_rx.try_recv().ok(), Some(left("misty")));
        assert!(!state.sessions.contains(conn(2)).await);
        assert!(outbound.is_empty(), "{outbound:?}");
    }

    #[tokio::test]
    async fn test_login_closed_mid_cache_write_sends_nothing() {
        let cache = Arc::new(GatedCache::default());
        let state = test_state(Arc::clone(&cache)).await;
        let mut ash_rx = open(&state, 1).await;
        let _misty_rx = open(&state, 2).await;
        dispatch(&state, conn(1), login_request("ash@pallet.town")).await;

        cache.hold.store(true, Ordering::SeqCst);
        let login = login_request("misty@cerulean.city");
        let (outbound, ()) = tokio::join!(dispatch(&state, conn(2), login), async {
            cache.entered.notified().await;
            close_connection(&state, conn(2), CloseReason::PeerClosed).await;
            cache.release.notify_one();
        });

        // Ash hears that Misty left and never that she joined.
        assert_eq!(ash_rx.try_recv().ok(), Some(left("misty")));
        assert!(ash_rx.try_recv().is_err());
        assert!(outbound.is_empty(), "{outbound:?}");
    }
}
