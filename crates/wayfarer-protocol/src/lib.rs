//! Wire protocol for Wayfarer.
//!
//! This crate defines what clients and servers say to each other:
//!
//! - **Wire format** ([`wire`]): the tag-based field codec every
//!   message is built on.
//! - **Types** ([`PlayerPosition`], [`LoginRequest`], ...): the
//!   messages themselves, plus [`PositionRecord`], the server's view of
//!   where a player is.
//! - **Envelope** ([`Envelope`], [`MessageKind`]): the tagged union one
//!   frame carries.
//! - **Codec** ([`Codec`], [`WireCodec`], [`JsonCodec`]): envelope to
//!   bytes and back.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Session (player context)
//! ```

mod codec;
mod envelope;
mod error;
mod types;
pub mod wire;

#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codec::{Codec, WireCodec};
pub use envelope::{Envelope, MessageKind};
pub use error::ProtocolError;
pub use types::{
    AuthReply, Direction, ErrorMessage, InitialPlayers, LoginRequest, LoginResponse,
    MotionState, PlayerId, PlayerJoined, PlayerLeft, PlayerPosition, PositionRecord,
    RegisterRequest, VerifyEmailRequest, unix_millis,
};
