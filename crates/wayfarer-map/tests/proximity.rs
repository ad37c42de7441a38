//! Nearby selection and fan-out against a real session store and cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wayfarer_map::{MapConfig, MapError, MemoryCache, PositionCache, ProximityBroadcaster};
use wayfarer_protocol::{Envelope, PlayerId, PositionRecord, unix_millis};
use wayfarer_session::{AuthGrant, SessionConfig, SessionStore};
use wayfarer_transport::ConnectionId;

struct World<C> {
    sessions: Arc<SessionStore>,
    broadcaster: ProximityBroadcaster<C>,
    _inboxes: Vec<mpsc::Receiver<Envelope>>,
}

fn conn(id: u64) -> ConnectionId {
    ConnectionId::new(id)
}

fn at(name: &str, x: f32, y: f32) -> PositionRecord {
    PositionRecord::at(name.into(), x, y)
}

/// Logs in one player per entry (connection ids 1, 2, ...) and caches
/// their positions.
async fn world<C: PositionCache>(
    cache: C,
    config: MapConfig,
    players: &[(&str, f32, f32)],
) -> World<C> {
    let sessions = Arc::new(SessionStore::new(SessionConfig::default()));
    let broadcaster = ProximityBroadcaster::new(Arc::clone(&sessions), cache, config);
    let mut inboxes = Vec::new();

    for (i, &(name, x, y)) in players.iter().enumerate() {
        let id = conn(i as u64 + 1);
        let (tx, rx) = mpsc::channel(8);
        sessions.register(id, tx).await.unwrap();
        let grant = AuthGrant {
            player_id: name.into(),
            email: format!("{name}@example.com"),
            token: "token".into(),
            last_position: at(name, x, y),
        };
        sessions.promote(id, &grant).await.unwrap();
        broadcaster.cache().store(&at(name, x, y)).await;
        inboxes.push(rx);
    }

    World {
        sessions,
        broadcaster,
        _inboxes: inboxes,
    }
}

fn view(distance: f32) -> MapConfig {
    MapConfig {
        view_distance: distance,
        ..MapConfig::default()
    }
}

fn recipients(outbound: &[wayfarer_session::Outbound]) -> Vec<ConnectionId> {
    outbound.iter().map(|o| o.to).collect()
}

#[tokio::test]
async fn test_publish_reaches_only_players_in_view() {
    let w = world(
        MemoryCache::new(),
        view(15.0),
        &[("a", 0.0, 0.0), ("b", 5.0, 5.0), ("c", 100.0, 100.0)],
    )
    .await;

    let from_a = w.broadcaster.publish(&at("a", 0.0, 0.0)).await;
    assert_eq!(recipients(&from_a), vec![conn(2)]);
    assert!(matches!(
        &from_a[0].envelope,
        Envelope::PositionUpdate(p) if p.player_id == PlayerId::from("a")
    ));

    let from_c = w.broadcaster.publish(&at("c", 100.0, 100.0)).await;
    assert!(from_c.is_empty(), "nobody is near c");
}

#[tokio::test]
async fn test_publish_writes_cache_before_selection() {
    let w = world(MemoryCache::new(), view(15.0), &[("a", 0.0, 0.0), ("b", 50.0, 0.0)]).await;

    // b walks over to a; a's next move must see b's new position.
    w.broadcaster.publish(&at("b", 3.0, 0.0)).await;
    let from_a = w.broadcaster.publish(&at("a", 0.0, 0.0)).await;

    assert_eq!(recipients(&from_a), vec![conn(2)]);
    let cached = w.broadcaster.cache().load(&"b".into()).await.unwrap();
    assert_eq!(cached.x, 3.0);
}

#[tokio::test]
async fn test_nearby_view_distance_is_inclusive() {
    let w = world(MemoryCache::new(), view(5.0), &[("a", 0.0, 0.0), ("b", 3.0, 4.0)]).await;

    let near = w.broadcaster.nearby(&at("a", 0.0, 0.0)).await;

    assert_eq!(near.len(), 1);
    assert_eq!(near[0].record.distance_to(&at("a", 0.0, 0.0)), 5.0);
}

#[tokio::test]
async fn test_nearby_cache_miss_excludes_session() {
    let cache = Arc::new(MemoryCache::new());
    let w = world(Arc::clone(&cache), view(15.0), &[("a", 0.0, 0.0)]).await;

    // b is authenticated right next to a, but has nothing in the cache.
    let (tx, _rx) = mpsc::channel(8);
    w.sessions.register(conn(9), tx).await.unwrap();
    let grant = AuthGrant {
        player_id: "b".into(),
        email: "b@example.com".into(),
        token: "token".into(),
        last_position: at("b", 1.0, 1.0),
    };
    w.sessions.promote(conn(9), &grant).await.unwrap();

    assert!(w.broadcaster.nearby(&at("a", 0.0, 0.0)).await.is_empty());
}

#[tokio::test]
async fn test_nearby_skips_unauthenticated_sessions() {
    let w = world(MemoryCache::new(), view(15.0), &[("a", 0.0, 0.0)]).await;
    let (tx, _rx) = mpsc::channel(8);
    w.sessions.register(conn(7), tx).await.unwrap();

    assert!(w.broadcaster.nearby(&at("a", 0.0, 0.0)).await.is_empty());
}

#[tokio::test]
async fn test_nearby_stale_positions_are_excluded_when_configured() {
    let config = MapConfig {
        stale_after: Some(Duration::from_secs(5)),
        ..view(15.0)
    };
    let w = world(MemoryCache::new(), config, &[("a", 0.0, 0.0), ("b", 1.0, 0.0)]).await;

    let mut old = at("b", 1.0, 0.0);
    old.last_update_time = unix_millis() - 60_000;
    w.broadcaster.cache().store(&old).await;

    assert!(w.broadcaster.nearby(&at("a", 0.0, 0.0)).await.is_empty());
}

/// A cache that is down for every call.
struct Down;

impl PositionCache for Down {
    async fn get(&self, _: &str) -> Result<Option<String>, MapError> {
        Err(MapError::Unavailable("down".into()))
    }

    async fn set(&self, _: &str, _: String, _: Duration) -> Result<(), MapError> {
        Err(MapError::Unavailable("down".into()))
    }
}

#[tokio::test]
async fn test_publish_with_cache_down_falls_back_to_session_positions() {
    let w = world(Down, view(15.0), &[("a", 0.0, 0.0), ("b", 5.0, 5.0), ("c", 100.0, 100.0)]).await;

    let from_a = w.broadcaster.publish(&at("a", 0.0, 0.0)).await;

    assert_eq!(recipients(&from_a), vec![conn(2)]);
}

#[tokio::test]
async fn test_announce_addresses_same_envelope_to_each_neighbor() {
    let w = world(
        MemoryCache::new(),
        view(15.0),
        &[("a", 0.0, 0.0), ("b", 1.0, 1.0), ("c", -2.0, 0.0)],
    )
    .await;
    let bye = Envelope::PlayerLeft(wayfarer_protocol::PlayerLeft {
        player_id: "a".into(),
    });

    let out = w.broadcaster.announce(&at("a", 0.0, 0.0), bye.clone()).await;

    assert_eq!(recipients(&out), vec![conn(2), conn(3)]);
    assert!(out.iter().all(|o| o.envelope == bye));
}
