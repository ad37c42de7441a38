//! Map configuration.

use std::time::Duration;

/// Settings for the cache client and the broadcaster.
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Players within this Euclidean distance (inclusive) see each
    /// other. Default: 10.0.
    pub view_distance: f32,

    /// Sliding expiration of cached positions. Default: 5 minutes.
    pub cache_ttl: Duration,

    /// Upper bound on a single cache `get` or `set`. Default: 1 second.
    pub cache_timeout: Duration,

    /// When set, cached positions older than this are treated as
    /// absent during nearby selection. Default: off.
    pub stale_after: Option<Duration>,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            view_distance: 10.0,
            cache_ttl: Duration::from_secs(5 * 60),
            cache_timeout: Duration::from_secs(1),
            stale_after: None,
        }
    }
}
