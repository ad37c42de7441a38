//! The shared map for Wayfarer: who is where, and who can see whom.
//!
//! - **Cache** ([`PositionCache`], [`PositionCacheClient`]): last-known
//!   positions under a sliding TTL, accessed with a bounded timeout and
//!   never allowed to block gameplay.
//! - **Store** ([`PositionStore`]): where a player's position goes when
//!   they disconnect, so their next login resumes there.
//! - **Broadcast** ([`ProximityBroadcaster`]): turns one player's move
//!   into messages for exactly the players within view distance.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)           ← calls publish() on every position update
//!     ↕
//! Map Layer (this crate)   ← cache, store, proximity
//!     ↕
//! Session Layer (below)    ← which sessions are authenticated
//! ```

mod broadcast;
mod cache;
mod config;
mod error;
mod store;

pub use broadcast::{Neighbor, ProximityBroadcaster};
pub use cache::{MemoryCache, POSITION_KEY_PREFIX, PositionCache, PositionCacheClient};
pub use config::MapConfig;
pub use error::MapError;
pub use store::{MemoryPositionStore, PositionStore};
