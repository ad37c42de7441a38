//! # Wayfarer
//!
//! Session and position-sync server for multiplayer games.
//!
//! Players connect over TCP, register and log in, then stream their
//! position. The server keeps one session per connection, remembers
//! where every player is, and forwards each move to exactly the players
//! within view distance. When a player disconnects their last position
//! is saved, and their next login resumes there.
//!
//! The server is generic over three collaborators:
//!
//! - [`Authenticator`](prelude::Authenticator): accounts and credentials.
//! - [`PositionCache`](prelude::PositionCache): fast, expiring last-known
//!   positions.
//! - [`PositionStore`](prelude::PositionStore): durable last positions.
//!
//! In-memory implementations of all three ship with the crate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wayfarer::prelude::*;
//!
//! # async fn run() -> Result<(), WayfarerError> {
//! let server = WayfarerServerBuilder::new()
//!     .bind("0.0.0.0:7777")
//!     .build(MemoryAccounts::new(), MemoryCache::new(), MemoryPositionStore::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod dispatch;
mod error;
mod handler;
mod lifecycle;
mod server;

pub use config::{ConfigError, ServerConfig};
pub use dispatch::codes;
pub use error::WayfarerError;
pub use server::{WayfarerServer, WayfarerServerBuilder};

pub mod prelude {
    pub use crate::{
        ConfigError, ServerConfig, WayfarerError, WayfarerServer, WayfarerServerBuilder, codes,
    };

    pub use wayfarer_map::{
        MapError, MemoryCache, MemoryPositionStore, PositionCache, PositionStore,
    };
    #[cfg(feature = "json")]
    pub use wayfarer_protocol::JsonCodec;
    pub use wayfarer_protocol::{
        AuthReply, Codec, Direction, Envelope, ErrorMessage, InitialPlayers, LoginRequest,
        LoginResponse, MessageKind, MotionState, PlayerId, PlayerJoined, PlayerLeft,
        PlayerPosition, PositionRecord, ProtocolError, RegisterRequest, VerifyEmailRequest,
        WireCodec,
    };
    pub use wayfarer_session::{
        AuthGrant, AuthState, Authenticator, Credentials, MemoryAccounts, Registration,
        SessionError, SessionStore,
    };
    pub use wayfarer_transport::{ConnectionId, TransportError};
}
