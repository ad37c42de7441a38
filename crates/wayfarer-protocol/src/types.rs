//! Message types that travel on the wire.
//!
//! Every message implements [`WireMessage`] with fixed field numbers.
//! The numbers are part of the protocol: changing one breaks every
//! deployed client.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::ProtocolError;
use crate::wire::{Field, WireMessage, WireWriter};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A player's stable identity: their account's player name.
///
/// Unset until the auth handshake completes; after that it is unique
/// across all live sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PlayerId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// ---------------------------------------------------------------------------
// Direction / MotionState
// ---------------------------------------------------------------------------

/// Which way a player is facing.
///
/// Unknown wire values decode as [`Direction::None`] so a newer client
/// never gets its update dropped over a cosmetic field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn from_wire(value: u32) -> Self {
        match value {
            1 => Self::Up,
            2 => Self::Down,
            3 => Self::Left,
            4 => Self::Right,
            _ => Self::None,
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Up => 1,
            Self::Down => 2,
            Self::Left => 3,
            Self::Right => 4,
        }
    }
}

/// Whether a player is standing still or walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotionState {
    #[default]
    Idle,
    Moving,
}

impl MotionState {
    pub fn from_wire(value: u32) -> Self {
        match value {
            1 => Self::Moving,
            _ => Self::Idle,
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            Self::Idle => 0,
            Self::Moving => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// PositionRecord
// ---------------------------------------------------------------------------

/// The server's record of where a player was last seen.
///
/// `last_update_time` is milliseconds since the Unix epoch, stamped by
/// the server when the update arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub motion_state: MotionState,
    pub last_update_time: u64,
}

/// Milliseconds since the Unix epoch, the unit of
/// [`PositionRecord::last_update_time`].
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl PositionRecord {
    /// A record at `(x, y)` facing nowhere, standing still, stamped now.
    pub fn at(player_id: PlayerId, x: f32, y: f32) -> Self {
        Self {
            player_id,
            x,
            y,
            direction: Direction::None,
            motion_state: MotionState::Idle,
            last_update_time: unix_millis(),
        }
    }

    /// Euclidean distance between two records.
    pub fn distance_to(&self, other: &PositionRecord) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Builds a record for `player_id` from a client-sent position,
    /// ignoring whatever player id the client put in it.
    pub fn from_wire(player_id: PlayerId, position: &PlayerPosition, now_millis: u64) -> Self {
        Self {
            player_id,
            x: position.x,
            y: position.y,
            direction: position.direction,
            motion_state: position.motion_state,
            last_update_time: now_millis,
        }
    }

    pub fn to_wire(&self) -> PlayerPosition {
        PlayerPosition {
            player_id: self.player_id.clone(),
            x: self.x,
            y: self.y,
            direction: self.direction,
            motion_state: self.motion_state,
        }
    }
}

// ---------------------------------------------------------------------------
// Auth messages
// ---------------------------------------------------------------------------

/// Client → Server: create an account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub player_name: String,
}

impl WireMessage for RegisterRequest {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.string(1, &self.email);
        w.string(2, &self.password);
        w.string(3, &self.player_name);
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.email = field.as_string()?,
            2 => self.password = field.as_string()?,
            3 => self.player_name = field.as_string()?,
            _ => {}
        }
        Ok(())
    }
}

/// Server → Client: outcome of a registration or email verification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthReply {
    pub success: bool,
    pub message: String,
}

impl WireMessage for AuthReply {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.bool(1, self.success);
        w.string(2, &self.message);
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.success = field.as_bool()?,
            2 => self.message = field.as_string()?,
            _ => {}
        }
        Ok(())
    }
}

/// Client → Server: log in with email and password.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl WireMessage for LoginRequest {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.string(1, &self.email);
        w.string(2, &self.password);
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.email = field.as_string()?,
            2 => self.password = field.as_string()?,
            _ => {}
        }
        Ok(())
    }
}

/// Server → Client: outcome of a login.
///
/// On success `player_id`, `token` and `position` (where the player
/// logged out last time) are filled in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub player_id: PlayerId,
    pub position: Option<PlayerPosition>,
}

impl WireMessage for LoginResponse {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.bool(1, self.success);
        w.string(2, &self.message);
        w.string(3, &self.token);
        w.string(4, self.player_id.as_str());
        if let Some(position) = &self.position {
            w.message(5, position);
        }
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.success = field.as_bool()?,
            2 => self.message = field.as_string()?,
            3 => self.token = field.as_string()?,
            4 => self.player_id = field.as_string()?.into(),
            5 => self.position = Some(field.as_message()?),
            _ => {}
        }
        Ok(())
    }
}

/// Client → Server: confirm an email address with the emailed code.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

impl WireMessage for VerifyEmailRequest {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.string(1, &self.email);
        w.string(2, &self.code);
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.email = field.as_string()?,
            2 => self.code = field.as_string()?,
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Map messages
// ---------------------------------------------------------------------------

/// A player's position as it appears on the wire.
///
/// Clients leave `player_id` empty; the server fills it in before
/// forwarding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub player_id: PlayerId,
    pub x: f32,
    pub y: f32,
    pub direction: Direction,
    pub motion_state: MotionState,
}

impl WireMessage for PlayerPosition {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.string(1, self.player_id.as_str());
        w.float(2, self.x);
        w.float(3, self.y);
        w.uint32(4, self.direction.to_wire());
        w.uint32(5, self.motion_state.to_wire());
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.player_id = field.as_string()?.into(),
            2 => self.x = field.as_f32()?,
            3 => self.y = field.as_f32()?,
            4 => self.direction = Direction::from_wire(field.as_u32()?),
            5 => self.motion_state = MotionState::from_wire(field.as_u32()?),
            _ => {}
        }
        Ok(())
    }
}

/// Server → Client: another player appeared within view.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub player_id: PlayerId,
    pub position: PlayerPosition,
}

impl WireMessage for PlayerJoined {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.string(1, self.player_id.as_str());
        w.message(2, &self.position);
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.player_id = field.as_string()?.into(),
            2 => self.position = field.as_message()?,
            _ => {}
        }
        Ok(())
    }
}

/// Server → Client: a nearby player disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerLeft {
    pub player_id: PlayerId,
}

impl WireMessage for PlayerLeft {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.string(1, self.player_id.as_str());
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        if field.number == 1 {
            self.player_id = field.as_string()?.into();
        }
        Ok(())
    }
}

/// Server → Client: everyone in view at the moment of login.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InitialPlayers {
    pub players: Vec<PlayerPosition>,
}

impl WireMessage for InitialPlayers {
    fn encode_fields(&self, w: &mut WireWriter) {
        for player in &self.players {
            w.message(1, player);
        }
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        if field.number == 1 {
            self.players.push(field.as_message()?);
        }
        Ok(())
    }
}

/// Server → Client: a request was rejected.
///
/// `code` follows HTTP conventions: 400 for a message that is never
/// valid from a client, 401 for one that needs a login first, 409 for
/// an auth request on a session that is already logged in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub code: u32,
    pub message: String,
}

impl WireMessage for ErrorMessage {
    fn encode_fields(&self, w: &mut WireWriter) {
        w.uint32(1, self.code);
        w.string(2, &self.message);
    }

    fn decode_field(&mut self, field: Field<'_>) -> Result<(), ProtocolError> {
        match field.number {
            1 => self.code = field.as_u32()?,
            2 => self.message = field.as_string()?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: f32, y: f32) -> PositionRecord {
        PositionRecord {
            player_id: "ash".into(),
            x,
            y,
            direction: Direction::None,
            motion_state: MotionState::Idle,
            last_update_time: 0,
        }
    }

    #[test]
    fn test_player_id_display_is_plain_name() {
        assert_eq!(PlayerId::from("misty").to_string(), "misty");
    }

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId::from("brock")).unwrap();
        assert_eq!(json, "\"brock\"");
    }

    #[test]
    fn test_direction_unknown_wire_value_is_none() {
        assert_eq!(Direction::from_wire(99), Direction::None);
        assert_eq!(Direction::from_wire(Direction::Left.to_wire()), Direction::Left);
    }

    #[test]
    fn test_motion_state_wire_values() {
        assert_eq!(MotionState::Idle.to_wire(), 0);
        assert_eq!(MotionState::from_wire(1), MotionState::Moving);
    }

    #[test]
    fn test_distance_is_euclidean() {
        assert_eq!(record(0.0, 0.0).distance_to(&record(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_record_from_wire_ignores_client_player_id() {
        let sent = PlayerPosition {
            player_id: "impostor".into(),
            x: 1.0,
            y: 2.0,
            direction: Direction::Up,
            motion_state: MotionState::Moving,
        };
        let rec = PositionRecord::from_wire("ash".into(), &sent, 1234);

        assert_eq!(rec.player_id, PlayerId::from("ash"));
        assert_eq!(rec.last_update_time, 1234);
        assert_eq!(rec.to_wire().direction, Direction::Up);
    }

    #[test]
    fn test_player_position_wire_layout() {
        let pos = PlayerPosition {
            player_id: "a".into(),
            x: 1.0,
            y: 0.0,
            direction: Direction::Right,
            motion_state: MotionState::Idle,
        };
        let bytes = pos.to_wire_bytes();

        // y and motion_state are zero, so only three fields are written.
        let mut expected = vec![(1 << 3) | 2, 1, b'a', (2 << 3) | 5];
        expected.extend(1.0f32.to_le_bytes());
        expected.extend([(4 << 3), 4]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_login_response_keeps_position_presence() {
        // A position at the origin encodes to zero bytes but must still
        // decode as present.
        let resp = LoginResponse {
            success: true,
            position: Some(PlayerPosition::default()),
            ..LoginResponse::default()
        };
        let decoded = LoginResponse::from_wire_bytes(&resp.to_wire_bytes()).unwrap();
        assert_eq!(decoded.position, Some(PlayerPosition::default()));

        let without = LoginResponse::default();
        let decoded = LoginResponse::from_wire_bytes(&without.to_wire_bytes()).unwrap();
        assert_eq!(decoded.position, None);
    }

    #[test]
    fn test_initial_players_repeated_field_preserves_order() {
        let msg = InitialPlayers {
            players: vec![
                PlayerPosition {
                    player_id: "b".into(),
                    x: 5.0,
                    y: 5.0,
                    ..PlayerPosition::default()
                },
                PlayerPosition {
                    player_id: "c".into(),
                    ..PlayerPosition::default()
                },
            ],
        };
        let decoded = InitialPlayers::from_wire_bytes(&msg.to_wire_bytes()).unwrap();
        assert_eq!(decoded, msg);
    }
}
