//! Connection teardown and the idle sweep.
//!
//! Every way a connection can end (peer hangs up, socket error, idle
//! timeout, server shutdown) goes through [`close_connection`]. The
//! store's `remove` hands the session to exactly one caller, so the
//! side effects below run once per connection no matter how many tasks
//! race to close it:
//!
//! 1. Remove the session (its reader stops, its writer drains and ends).
//! 2. If it was Authenticated: find its last position (cache first,
//!    in-memory copy as fallback), persist it, and tell the players near
//!    that position the player left.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use wayfarer_map::{PositionCache, PositionStore};
use wayfarer_protocol::{Envelope, PlayerLeft};
use wayfarer_session::{AuthState, Authenticator};
use wayfarer_transport::ConnectionId;

use crate::server::ServerState;

/// Why a connection is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    PeerClosed,
    ReadFailed,
    WriteFailed,
    Idle,
    /// The session was removed by another task.
    Evicted,
    ServerShutdown,
}

/// Tears down one connection. A no-op if it is already gone.
pub(crate) async fn close_connection<A, C, S>(
    state: &ServerState<A, C, S>,
    conn: ConnectionId,
    reason: CloseReason,
) where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let Some((previous, session)) = state.sessions.remove(conn).await else {
        return;
    };
    tracing::info!(
        %conn,
        ?reason,
        player_id = session.player_id.as_ref().map(|p| p.as_str()),
        connected_for = ?session.connected_at.elapsed(),
        "connection closed"
    );

    if previous != AuthState::Authenticated {
        return;
    }
    let Some(player_id) = session.player_id else {
        return;
    };

    let cached = match state.map.cache().try_load(&player_id).await {
        Ok(cached) => cached,
        Err(e) => {
            tracing::warn!(%player_id, error = %e, "cache unavailable at teardown");
            None
        }
    };
    let Some(last) = cached.or(session.last_position) else {
        tracing::warn!(%player_id, "no known position at teardown");
        return;
    };

    match tokio::time::timeout(
        state.config.store_timeout(),
        state.store.persist_last_position(&last),
    )
    .await
    {
        Ok(Ok(())) => tracing::debug!(%player_id, x = last.x, y = last.y, "last position saved"),
        Ok(Err(e)) => tracing::warn!(%player_id, error = %e, "failed to save last position"),
        Err(_) => tracing::warn!(%player_id, "saving last position timed out"),
    }

    let left = Envelope::PlayerLeft(PlayerLeft {
        player_id: player_id.clone(),
    });
    let outbound = state.map.announce(&last, left).await;
    if !outbound.is_empty() {
        let report = state.sessions.deliver(outbound).await;
        tracing::debug!(%player_id, delivered = report.delivered, "player left broadcast");
    }
}

/// Closes every session that has been idle past the configured
/// timeout. Returns how many were closed.
pub(crate) async fn sweep_idle<A, C, S>(state: &ServerState<A, C, S>) -> usize
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    let idle = state.sessions.idle().await;
    for &conn in &idle {
        tracing::info!(%conn, "evicting idle session");
        close_connection(state, conn, CloseReason::Idle).await;
    }
    idle.len()
}

/// Runs [`sweep_idle`] every sweep interval until `stop` flips.
pub(crate) fn spawn_idle_sweep<A, C, S>(
    state: Arc<ServerState<A, C, S>>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    A: Authenticator,
    C: PositionCache,
    S: PositionStore,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.sweep_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    sweep_idle(&state).await;
                }
                _ = stop.changed() => break,
            }
        }
    })
}
