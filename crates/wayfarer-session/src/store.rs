//! The session store: every live connection, in one place.
//!
//! The store is the single source of truth for "who is connected". Each
//! entry holds the connection's [`Session`], the sending half of its
//! outbox (drained by the connection's writer task), and a shutdown
//! signal its reader task watches.
//!
//! # Concurrency
//!
//! Everything lives in one `HashMap` behind one `RwLock`. Lookups share
//! the read lock; insert, remove, and promotion take the write lock, so
//! the player-id uniqueness check and the promotion it guards happen as
//! one atomic step. The lock is never held across a send: senders clone
//! the outbox handle and release the lock first.

use std::collections::HashMap;

use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc, watch};
use tokio::time::Instant;
use wayfarer_protocol::{Envelope, PlayerId, PositionRecord};
use wayfarer_transport::ConnectionId;

use crate::{AuthGrant, AuthState, Session, SessionConfig, SessionError};

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::Sender<Envelope>;

/// One message addressed to one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub to: ConnectionId,
    pub envelope: Envelope,
}

impl Outbound {
    pub fn new(to: ConnectionId, envelope: Envelope) -> Self {
        Self { to, envelope }
    }
}

/// Outcome of a [`SessionStore::deliver`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<ConnectionId>,
}

struct Entry {
    session: Session,
    outbox: Outbox,
    shutdown: watch::Sender<bool>,
}

/// Concurrency-safe registry of live sessions.
///
/// ## Lifecycle
///
/// ```text
/// register() ──→ promote() ──→ record_position() ... ──→ remove()
///     │              │                                     │
///     ▼              ▼                                     ▼
/// [Connected]  [Authenticated]                         [Closed]
/// ```
pub struct SessionStore {
    entries: RwLock<HashMap<ConnectionId, Entry>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a Connected session for a freshly accepted connection.
    ///
    /// Returns the receiver the connection's reader watches: it flips
    /// to `true` once the session is removed.
    ///
    /// # Errors
    /// [`SessionError::AlreadyRegistered`] if `conn` already has a
    /// session.
    pub async fn register(
        &self,
        conn: ConnectionId,
        outbox: Outbox,
    ) -> Result<watch::Receiver<bool>, SessionError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&conn) {
            return Err(SessionError::AlreadyRegistered(conn));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        entries.insert(
            conn,
            Entry {
                session: Session::new(conn),
                outbox,
                shutdown,
            },
        );
        tracing::debug!(%conn, sessions = entries.len(), "session registered");
        Ok(shutdown_rx)
    }

    /// Marks inbound activity. Returns `false` if there is no session.
    pub async fn touch(&self, conn: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&conn) {
            Some(entry) => {
                entry.session.last_active_at = Instant::now();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, conn: ConnectionId) -> Option<Session> {
        let entries = self.entries.read().await;
        entries.get(&conn).map(|e| e.session.clone())
    }

    /// Finds the live session bound to `player_id`. O(sessions).
    pub async fn find_player(&self, player_id: &PlayerId) -> Option<Session> {
        let entries = self.entries.read().await;
        entries
            .values()
            .find(|e| e.session.player_id.as_ref() == Some(player_id))
            .map(|e| e.session.clone())
    }

    /// Moves a Connected session to Authenticated.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: the connection is gone.
    /// - [`SessionError::InvalidState`]: the session is not Connected.
    /// - [`SessionError::AlreadyLoggedIn`]: another live session holds
    ///   the player id. That session is left untouched.
    pub async fn promote(
        &self,
        conn: ConnectionId,
        grant: &AuthGrant,
    ) -> Result<Session, SessionError> {
        let mut entries = self.entries.write().await;

        let taken = entries.values().any(|e| {
            e.session.connection_id != conn
                && e.session.player_id.as_ref() == Some(&grant.player_id)
        });
        if taken {
            return Err(SessionError::AlreadyLoggedIn(grant.player_id.clone()));
        }

        let entry = entries.get_mut(&conn).ok_or(SessionError::NotFound(conn))?;
        let session = &mut entry.session;
        if session.state != AuthState::Connected {
            return Err(SessionError::InvalidState {
                conn,
                state: session.state,
            });
        }

        session.state = AuthState::Authenticated;
        session.player_id = Some(grant.player_id.clone());
        session.user_email = Some(grant.email.clone());
        session.auth_token = Some(grant.token.clone());
        session.last_position = Some(grant.last_position.clone());

        tracing::info!(%conn, player_id = %grant.player_id, "session authenticated");
        Ok(session.clone())
    }

    /// Keeps the in-memory copy of a player's latest position.
    ///
    /// Returns `false` unless the session exists and is Authenticated.
    pub async fn record_position(&self, conn: ConnectionId, record: PositionRecord) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&conn) {
            Some(entry) if entry.session.is_authenticated() => {
                entry.session.last_position = Some(record);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of every Authenticated session.
    pub async fn authenticated(&self) -> Vec<Session> {
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.session.is_authenticated())
            .map(|e| e.session.clone())
            .collect()
    }

    /// Whether `conn` still has a live session.
    pub async fn contains(&self, conn: ConnectionId) -> bool {
        self.entries.read().await.contains_key(&conn)
    }

    /// Every live connection id.
    pub async fn connections(&self) -> Vec<ConnectionId> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Removes a session and signals its reader to stop.
    ///
    /// Returns the state the session was in, and the session itself
    /// now marked Closed.
    /// Only the first call for a connection gets `Some`, so teardown
    /// side effects run once even when the reader, the writer, and the
    /// idle sweep all race to close the same connection.
    pub async fn remove(&self, conn: ConnectionId) -> Option<(AuthState, Session)> {
        let entry = self.entries.write().await.remove(&conn)?;
        let _ = entry.shutdown.send(true);

        let previous = entry.session.state;
        let mut session = entry.session;
        session.state = AuthState::Closed;
        tracing::debug!(%conn, ?previous, "session removed");
        Some((previous, session))
    }

    /// Connections with no inbound traffic for longer than the
    /// configured idle timeout.
    pub async fn idle(&self) -> Vec<ConnectionId> {
        let timeout = self.config.idle_timeout;
        let entries = self.entries.read().await;
        entries
            .values()
            .filter(|e| e.session.idle_for() > timeout)
            .map(|e| e.session.connection_id)
            .collect()
    }

    /// Queues one message for one connection.
    ///
    /// Waits at most the configured send timeout for room in a full
    /// outbox.
    pub async fn send(&self, conn: ConnectionId, envelope: Envelope) -> Result<(), SessionError> {
        let outbox = {
            let entries = self.entries.read().await;
            entries
                .get(&conn)
                .map(|e| e.outbox.clone())
                .ok_or(SessionError::NotFound(conn))?
        };

        outbox
            .send_timeout(envelope, self.config.send_timeout)
            .await
            .map_err(|e| SessionError::SendFailed {
                conn,
                reason: e.to_string(),
            })
    }

    /// Queues every message, fanning out across recipients concurrently.
    ///
    /// Messages to the same connection are queued in the order given.
    /// One recipient failing (its socket just closed, its outbox is
    /// full) is logged and does not affect the others.
    pub async fn deliver(&self, outbound: Vec<Outbound>) -> DeliveryReport {
        let mut order = Vec::new();
        let mut queues: HashMap<ConnectionId, Vec<Envelope>> = HashMap::new();
        for out in outbound {
            queues
                .entry(out.to)
                .or_insert_with(|| {
                    order.push(out.to);
                    Vec::new()
                })
                .push(out.envelope);
        }

        let groups = order
            .into_iter()
            .filter_map(|to| queues.remove(&to).map(|queue| (to, queue)));
        let sends = groups.map(|(to, queue)| async move {
            let mut delivered = 0;
            for envelope in queue {
                if let Err(e) = self.send(to, envelope).await {
                    return (to, delivered, Some(e));
                }
                delivered += 1;
            }
            (to, delivered, None)
        });

        let mut report = DeliveryReport::default();
        for (conn, delivered, error) in join_all(sends).await {
            report.delivered += delivered;
            if let Some(e) = error {
                tracing::warn!(%conn, error = %e, "delivery failed");
                report.failed.push(conn);
            }
        }
        report
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use wayfarer_protocol::PlayerLeft;

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn grant(name: &str) -> AuthGrant {
        AuthGrant {
            player_id: name.into(),
            email: format!("{name}@example.com"),
            token: "t0k3n".into(),
            last_position: PositionRecord::at(name.into(), 1.0, 2.0),
        }
    }

    fn left(name: &str) -> Envelope {
        Envelope::PlayerLeft(PlayerLeft {
            player_id: name.into(),
        })
    }

    async fn store_with(ids: &[u64]) -> (SessionStore, Vec<mpsc::Receiver<Envelope>>) {
        let store = SessionStore::new(SessionConfig {
            outbox_capacity: 4,
            send_timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        });
        let mut inboxes = Vec::new();
        for &id in ids {
            let (tx, rx) = mpsc::channel(store.config().outbox_capacity);
            store.register(conn(id), tx).await.unwrap();
            inboxes.push(rx);
        }
        (store, inboxes)
    }

    // -- register / get --------------------------------------------------

    #[tokio::test]
    async fn test_register_creates_connected_session() {
        let (store, _inboxes) = store_with(&[1]).await;

        let session = store.get(conn(1)).await.unwrap();
        assert_eq!(session.state, AuthState::Connected);
        assert!(session.player_id.is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_twice_returns_already_registered() {
        let (store, _inboxes) = store_with(&[1]).await;
        let (tx, _rx) = mpsc::channel(1);

        let result = store.register(conn(1), tx).await;

        assert!(matches!(result, Err(SessionError::AlreadyRegistered(c)) if c == conn(1)));
    }

    // -- promote ---------------------------------------------------------

    #[tokio::test]
    async fn test_promote_connected_session_sets_identity() {
        let (store, _inboxes) = store_with(&[1]).await;

        let session = store.promote(conn(1), &grant("ash")).await.unwrap();

        assert_eq!(session.state, AuthState::Authenticated);
        assert_eq!(session.player_id, Some(PlayerId::from("ash")));
        assert_eq!(session.user_email.as_deref(), Some("ash@example.com"));
        assert_eq!(session.auth_token.as_deref(), Some("t0k3n"));
        assert_eq!(
            store.find_player(&PlayerId::from("ash")).await.unwrap().connection_id,
            conn(1)
        );
    }

    #[tokio::test]
    async fn test_promote_duplicate_player_rejects_new_session() {
        let (store, _inboxes) = store_with(&[1, 2]).await;
        store.promote(conn(1), &grant("ash")).await.unwrap();

        let result = store.promote(conn(2), &grant("ash")).await;

        assert!(matches!(
            result,
            Err(SessionError::AlreadyLoggedIn(p)) if p == PlayerId::from("ash")
        ));
        assert!(store.get(conn(1)).await.unwrap().is_authenticated());
        assert_eq!(store.get(conn(2)).await.unwrap().state, AuthState::Connected);
        assert_eq!(store.authenticated().await.len(), 1);
    }

    #[tokio::test]
    async fn test_promote_concurrent_same_player_only_one_wins() {
        let (store, _inboxes) = store_with(&[1, 2]).await;
        let g = grant("ash");

        let (a, b) = tokio::join!(store.promote(conn(1), &g), store.promote(conn(2), &g));

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        assert_eq!(store.authenticated().await.len(), 1);
    }

    #[tokio::test]
    async fn test_promote_twice_returns_invalid_state() {
        let (store, _inboxes) = store_with(&[1]).await;
        store.promote(conn(1), &grant("ash")).await.unwrap();

        let result = store.promote(conn(1), &grant("ash")).await;

        assert!(matches!(
            result,
            Err(SessionError::InvalidState {
                state: AuthState::Authenticated,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_promote_unknown_connection_returns_not_found() {
        let (store, _inboxes) = store_with(&[]).await;

        let result = store.promote(conn(9), &grant("ash")).await;

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    // -- record_position -------------------------------------------------

    #[tokio::test]
    async fn test_record_position_requires_authentication() {
        let (store, _inboxes) = store_with(&[1]).await;
        let record = PositionRecord::at("ash".into(), 5.0, 5.0);

        assert!(!store.record_position(conn(1), record.clone()).await);

        store.promote(conn(1), &grant("ash")).await.unwrap();
        assert!(store.record_position(conn(1), record.clone()).await);
        assert_eq!(store.get(conn(1)).await.unwrap().last_position, Some(record));
    }

    // -- remove ----------------------------------------------------------

    #[tokio::test]
    async fn test_remove_returns_previous_state_once_and_signals_shutdown() {
        let store = SessionStore::default();
        let (tx, _rx) = mpsc::channel(1);
        let mut shutdown = store.register(conn(1), tx).await.unwrap();
        store.promote(conn(1), &grant("ash")).await.unwrap();

        let (previous, session) = store.remove(conn(1)).await.unwrap();

        assert_eq!(previous, AuthState::Authenticated);
        assert_eq!(session.state, AuthState::Closed);
        assert!(store.remove(conn(1)).await.is_none());
        assert!(store.is_empty().await);
        shutdown.changed().await.unwrap();
        assert!(*shutdown.borrow());
    }

    #[tokio::test]
    async fn test_remove_frees_player_id_for_new_login() {
        let (store, _inboxes) = store_with(&[1, 2]).await;
        store.promote(conn(1), &grant("ash")).await.unwrap();
        store.remove(conn(1)).await;

        assert!(store.promote(conn(2), &grant("ash")).await.is_ok());
    }

    // -- idle ------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_idle_lists_only_quiet_sessions() {
        let (store, _inboxes) = store_with(&[1, 2]).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        store.touch(conn(2)).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(store.idle().await, vec![conn(1)]);
    }

    // -- send / deliver --------------------------------------------------

    #[tokio::test]
    async fn test_send_queues_on_outbox() {
        let (store, mut inboxes) = store_with(&[1]).await;

        store.send(conn(1), left("gary")).await.unwrap();

        assert_eq!(inboxes[0].recv().await, Some(left("gary")));
    }

    #[tokio::test]
    async fn test_send_unknown_connection_returns_not_found() {
        let (store, _inboxes) = store_with(&[]).await;

        let result = store.send(conn(5), left("gary")).await;

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deliver_one_failure_does_not_block_others() {
        let (store, mut inboxes) = store_with(&[1, 2, 3]).await;
        // Connection 2's writer is gone.
        drop(inboxes.remove(1));

        let report = store
            .deliver(vec![
                Outbound::new(conn(1), left("gary")),
                Outbound::new(conn(2), left("gary")),
                Outbound::new(conn(3), left("gary")),
            ])
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, vec![conn(2)]);
        assert_eq!(inboxes[0].recv().await, Some(left("gary")));
        assert_eq!(inboxes[1].recv().await, Some(left("gary")));
    }

    #[tokio::test]
    async fn test_deliver_full_outbox_times_out() {
        let (store, _inboxes) = store_with(&[1]).await;
        let flood = (0..5).map(|_| Outbound::new(conn(1), left("gary"))).collect();

        let report = store.deliver(flood).await;

        // Capacity is 4 and nobody drains the outbox.
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, vec![conn(1)]);
    }

    #[tokio::test]
    async fn test_deliver_keeps_per_connection_order() {
        let (store, mut inboxes) = store_with(&[1]).await;

        store
            .deliver(vec![
                Outbound::new(conn(1), left("a")),
                Outbound::new(conn(1), left("b")),
                Outbound::new(conn(1), left("c")),
            ])
            .await;

        for name in ["a", "b", "c"] {
            assert_eq!(inboxes[0].recv().await, Some(left(name)));
        }
    }

    #[tokio::test]
    async fn test_deliver_interleaved_recipients_each_keep_order() {
        let (store, mut inboxes) = store_with(&[1, 2]).await;

        let report = store
            .deliver(vec![
                Outbound::new(conn(2), left("a")),
                Outbound::new(conn(1), left("b")),
                Outbound::new(conn(2), left("c")),
                Outbound::new(conn(1), left("d")),
            ])
            .await;

        assert_eq!(report.delivered, 4);
        assert!(report.failed.is_empty());
        assert_eq!(inboxes[0].recv().await, Some(left("b")));
        assert_eq!(inboxes[0].recv().await, Some(left("d")));
        assert_eq!(inboxes[1].recv().await, Some(left("a")));
        assert_eq!(inboxes[1].recv().await, Some(left("c")));
    }
}
