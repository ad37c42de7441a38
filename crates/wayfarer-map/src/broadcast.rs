//! Proximity fan-out: who should hear about a player's move.
//!
//! Every update is handled on its own: the moving player's position is
//! compared against the cached position of every other authenticated
//! player, and only those within view distance are addressed. That is
//! O(sessions) per update, which is fine for one server process and is
//! the scaling limit of this design.
//!
//! ```text
//!   publish(A moved)
//!       │
//!       ├── cache.store(A)              (best-effort, never blocks)
//!       │
//!       └── nearby(A)
//!             for each authenticated B ≠ A:
//!                 cached(B)?  ── miss ──→ skip
//!                 stale(B)?   ── yes ───→ skip
//!                 |A − B| ≤ view_distance ──→ Outbound to B
//! ```

use std::sync::Arc;

use futures_util::future::join_all;
use wayfarer_protocol::{Envelope, PositionRecord, unix_millis};
use wayfarer_session::{Outbound, Session, SessionStore};
use wayfarer_transport::ConnectionId;

use crate::{MapConfig, PositionCache, PositionCacheClient};

/// A session within view of some position, with where it was seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub connection_id: ConnectionId,
    pub record: PositionRecord,
}

/// Selects nearby sessions and addresses messages to them.
///
/// Holds the shared [`SessionStore`] and the cache client, both passed
/// in by the server at startup.
pub struct ProximityBroadcaster<C> {
    sessions: Arc<SessionStore>,
    cache: PositionCacheClient<C>,
    config: MapConfig,
}

impl<C: PositionCache> ProximityBroadcaster<C> {
    pub fn new(sessions: Arc<SessionStore>, cache: C, config: MapConfig) -> Self {
        let cache = PositionCacheClient::new(cache, config.cache_ttl, config.cache_timeout);
        Self {
            sessions,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn cache(&self) -> &PositionCacheClient<C> {
        &self.cache
    }

    /// Records a move and addresses it to every player in view.
    ///
    /// The cache write happens first and its outcome does not matter:
    /// if it fails, selection still runs against the record in hand.
    /// An empty result means nobody is close enough, which is normal.
    pub async fn publish(&self, record: &PositionRecord) -> Vec<Outbound> {
        self.cache.store(record).await;
        self.announce(record, Envelope::PositionUpdate(record.to_wire()))
            .await
    }

    /// Addresses `envelope` to every session in view of `center`.
    pub async fn announce(&self, center: &PositionRecord, envelope: Envelope) -> Vec<Outbound> {
        self.nearby(center)
            .await
            .into_iter()
            .map(|n| Outbound::new(n.connection_id, envelope.clone()))
            .collect()
    }

    /// Authenticated sessions, other than `center`'s player, whose
    /// cached position is within view distance of `center`.
    ///
    /// Results are ordered by connection id.
    pub async fn nearby(&self, center: &PositionRecord) -> Vec<Neighbor> {
        let candidates = self
            .sessions
            .authenticated()
            .await
            .into_iter()
            .filter(|s| s.player_id.as_ref() != Some(&center.player_id));

        let lookups = candidates.map(|session| self.locate(session));
        let mut found: Vec<Neighbor> = join_all(lookups)
            .await
            .into_iter()
            .flatten()
            .filter(|n| n.record.distance_to(center) <= self.config.view_distance)
            .collect();

        found.sort_by_key(|n| n.connection_id);
        found
    }

    /// Where a session's player was last seen, if anywhere usable.
    async fn locate(&self, session: Session) -> Option<Neighbor> {
        let player_id = session.player_id.as_ref()?;

        let record = match self.cache.try_load(player_id).await {
            Ok(Some(record)) => record,
            // No known position: excluded, never assumed to be the origin.
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(
                    %player_id,
                    error = %e,
                    "cache unavailable, using in-memory position"
                );
                session.last_position?
            }
        };

        if let Some(stale_after) = self.config.stale_after {
            let age = unix_millis().saturating_sub(record.last_update_time);
            if age > stale_after.as_millis() as u64 {
                return None;
            }
        }

        Some(Neighbor {
            connection_id: session.connection_id,
            record,
        })
    }
}
