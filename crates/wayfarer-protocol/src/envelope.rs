//! The typed envelope carried inside every frame.
//!
//! An [`Envelope`] is a tagged union: exactly one payload, plus a
//! [`MessageKind`] tag that names it. In Rust the enum variant *is* the
//! tag, so a constructed `Envelope` can never disagree with itself. The
//! tag only exists separately on the wire, where the codec checks it.

use serde::{Deserialize, Serialize};

use crate::types::{
    AuthReply, ErrorMessage, InitialPlayers, LoginRequest, LoginResponse, PlayerJoined,
    PlayerLeft, PlayerPosition, RegisterRequest, VerifyEmailRequest,
};

/// The type tag of an envelope.
///
/// The discriminant is the on-wire tag. The payload travels in field
/// `tag + 1` of the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageKind {
    RegisterRequest = 1,
    RegisterResponse = 2,
    LoginRequest = 3,
    LoginResponse = 4,
    VerifyEmailRequest = 5,
    VerifyEmailResponse = 6,
    PositionUpdate = 7,
    PlayerJoined = 8,
    PlayerLeft = 9,
    InitialPlayers = 10,
    Error = 11,
}

impl MessageKind {
    pub const ALL: [MessageKind; 11] = [
        Self::RegisterRequest,
        Self::RegisterResponse,
        Self::LoginRequest,
        Self::LoginResponse,
        Self::VerifyEmailRequest,
        Self::VerifyEmailResponse,
        Self::PositionUpdate,
        Self::PlayerJoined,
        Self::PlayerLeft,
        Self::InitialPlayers,
        Self::Error,
    ];

    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Field number that carries this kind's payload.
    pub fn payload_field(self) -> u32 {
        self.tag() + 1
    }

    /// Whether a client may ever send this kind.
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::RegisterRequest
                | Self::LoginRequest
                | Self::VerifyEmailRequest
                | Self::PositionUpdate
        )
    }
}

/// One decoded message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Envelope {
    RegisterRequest(RegisterRequest),
    RegisterResponse(AuthReply),
    LoginRequest(LoginRequest),
    LoginResponse(LoginResponse),
    VerifyEmailRequest(VerifyEmailRequest),
    VerifyEmailResponse(AuthReply),
    PositionUpdate(PlayerPosition),
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    InitialPlayers(InitialPlayers),
    Error(ErrorMessage),
}

impl Envelope {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::RegisterRequest(_) => MessageKind::RegisterRequest,
            Self::RegisterResponse(_) => MessageKind::RegisterResponse,
            Self::LoginRequest(_) => MessageKind::LoginRequest,
            Self::LoginResponse(_) => MessageKind::LoginResponse,
            Self::VerifyEmailRequest(_) => MessageKind::VerifyEmailRequest,
            Self::VerifyEmailResponse(_) => MessageKind::VerifyEmailResponse,
            Self::PositionUpdate(_) => MessageKind::PositionUpdate,
            Self::PlayerJoined(_) => MessageKind::PlayerJoined,
            Self::PlayerLeft(_) => MessageKind::PlayerLeft,
            Self::InitialPlayers(_) => MessageKind::InitialPlayers,
            Self::Error(_) => MessageKind::Error,
        }
    }

    pub fn error(code: u32, message: impl Into<String>) -> Self {
        Self::Error(ErrorMessage {
            code,
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tag_known_and_unknown() {
        assert_eq!(MessageKind::from_tag(7), Some(MessageKind::PositionUpdate));
        assert_eq!(MessageKind::from_tag(0), None);
        assert_eq!(MessageKind::from_tag(12), None);
    }

    #[test]
    fn test_payload_field_follows_tag() {
        for kind in MessageKind::ALL {
            assert_eq!(kind.payload_field(), kind.tag() + 1);
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn test_is_inbound_only_for_client_requests() {
        let inbound: Vec<_> = MessageKind::ALL
            .into_iter()
            .filter(|k| k.is_inbound())
            .collect();
        assert_eq!(
            inbound,
            vec![
                MessageKind::RegisterRequest,
                MessageKind::LoginRequest,
                MessageKind::VerifyEmailRequest,
                MessageKind::PositionUpdate,
            ]
        );
    }

    #[test]
    fn test_kind_matches_variant() {
        let env = Envelope::PlayerLeft(PlayerLeft {
            player_id: "ash".into(),
        });
        assert_eq!(env.kind(), MessageKind::PlayerLeft);
        assert_eq!(Envelope::error(401, "nope").kind(), MessageKind::Error);
    }
}
