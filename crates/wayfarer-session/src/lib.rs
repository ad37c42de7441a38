//! Player session management for Wayfarer.
//!
//! This crate answers "who is connected, and what may they do?":
//!
//! 1. **Authentication**: validating who a player is ([`Authenticator`]
//!    trait, with [`MemoryAccounts`] for development).
//! 2. **State machine**: what a connection may send in each phase
//!    ([`AuthState`]).
//! 3. **Registry**: every live connection, its session, and its outbound
//!    channel ([`SessionStore`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Map Layer (above)       ← asks which sessions are authenticated
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides PlayerId, Envelope, MessageKind
//! ```

mod auth;
mod error;
mod session;
mod store;

pub use auth::{AuthGrant, Authenticator, Credentials, MemoryAccounts, Registration};
pub use error::SessionError;
pub use session::{AuthState, Session, SessionConfig};
pub use store::{DeliveryReport, Outbound, Outbox, SessionStore};
