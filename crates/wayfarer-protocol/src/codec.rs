//! Codec trait and implementations for envelopes.
//!
//! A codec turns an [`Envelope`] into frame payload bytes and back. The
//! server holds one behind an `Arc<dyn Codec>`, so the rest of the code
//! never knows which format is on the wire.
//!
//! - [`WireCodec`] is the compact tag-based binary format real clients
//!   speak (see [`crate::wire`]).
//! - [`JsonCodec`] (feature `json`) is human-readable, for debugging and
//!   tooling.

use crate::ProtocolError;
use crate::envelope::{Envelope, MessageKind};
use crate::wire::{FieldValue, WireMessage, WireReader, WireWriter};

/// Field number of the kind tag inside an encoded envelope.
const KIND_FIELD: u32 = 1;

/// Encodes and decodes envelopes.
///
/// `Send + Sync + 'static` so one codec can be shared by every
/// connection task.
pub trait Codec: Send + Sync + 'static {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError>;

    /// # Errors
    /// `UnknownMessageKind` for a tag this server does not know, and
    /// `MalformedEnvelope` when the tag and payload disagree.
    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError>;
}

// ---------------------------------------------------------------------------
// WireCodec
// ---------------------------------------------------------------------------

/// The binary envelope format: field 1 holds the kind tag, and exactly
/// one length-delimited field numbered `tag + 1` holds the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct WireCodec;

fn payload_field_range() -> std::ops::RangeInclusive<u32> {
    let first = MessageKind::ALL[0].payload_field();
    let last = MessageKind::ALL[MessageKind::ALL.len() - 1].payload_field();
    first..=last
}

fn write_payload(w: &mut WireWriter, envelope: &Envelope) {
    let field = envelope.kind().payload_field();
    match envelope {
        Envelope::RegisterRequest(m) => w.message(field, m),
        Envelope::RegisterResponse(m) | Envelope::VerifyEmailResponse(m) => w.message(field, m),
        Envelope::LoginRequest(m) => w.message(field, m),
        Envelope::LoginResponse(m) => w.message(field, m),
        Envelope::VerifyEmailRequest(m) => w.message(field, m),
        Envelope::PositionUpdate(m) => w.message(field, m),
        Envelope::PlayerJoined(m) => w.message(field, m),
        Envelope::PlayerLeft(m) => w.message(field, m),
        Envelope::InitialPlayers(m) => w.message(field, m),
        Envelope::Error(m) => w.message(field, m),
    }
}

fn read_payload(kind: MessageKind, bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    fn decode<M: WireMessage>(bytes: &[u8]) -> Result<M, ProtocolError> {
        M::from_wire_bytes(bytes)
    }

    Ok(match kind {
        MessageKind::RegisterRequest => Envelope::RegisterRequest(decode(bytes)?),
        MessageKind::RegisterResponse => Envelope::RegisterResponse(decode(bytes)?),
        MessageKind::LoginRequest => Envelope::LoginRequest(decode(bytes)?),
        MessageKind::LoginResponse => Envelope::LoginResponse(decode(bytes)?),
        MessageKind::VerifyEmailRequest => Envelope::VerifyEmailRequest(decode(bytes)?),
        MessageKind::VerifyEmailResponse => Envelope::VerifyEmailResponse(decode(bytes)?),
        MessageKind::PositionUpdate => Envelope::PositionUpdate(decode(bytes)?),
        MessageKind::PlayerJoined => Envelope::PlayerJoined(decode(bytes)?),
        MessageKind::PlayerLeft => Envelope::PlayerLeft(decode(bytes)?),
        MessageKind::InitialPlayers => Envelope::InitialPlayers(decode(bytes)?),
        MessageKind::Error => Envelope::Error(decode(bytes)?),
    })
}

impl Codec for WireCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        let mut w = WireWriter::new();
        w.uint32(KIND_FIELD, envelope.kind().tag());
        write_payload(&mut w, envelope);
        Ok(w.into_bytes())
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        let payload_fields = payload_field_range();
        let mut tag: Option<u32> = None;
        let mut payload: Option<(u32, &[u8])> = None;

        for field in WireReader::new(data) {
            let field = field?;
            if field.number == KIND_FIELD {
                let FieldValue::Varint(value) = field.value else {
                    return Err(ProtocolError::MalformedEnvelope(
                        "kind tag is not a varint".into(),
                    ));
                };
                if tag.is_some() {
                    return Err(ProtocolError::MalformedEnvelope("kind tag repeated".into()));
                }
                tag = Some(u32::try_from(value).map_err(|_| {
                    ProtocolError::MalformedEnvelope(format!("kind tag {value} out of range"))
                })?);
            } else if payload_fields.contains(&field.number) {
                let FieldValue::Bytes(bytes) = field.value else {
                    return Err(ProtocolError::MalformedEnvelope(format!(
                        "payload field {} is not length-delimited",
                        field.number
                    )));
                };
                if let Some((first, _)) = payload {
                    return Err(ProtocolError::MalformedEnvelope(format!(
                        "two payloads (fields {first} and {})",
                        field.number
                    )));
                }
                payload = Some((field.number, bytes));
            }
            // Anything else is a field from a newer client; skip it.
        }

        let tag = match tag {
            None | Some(0) => {
                return Err(ProtocolError::MalformedEnvelope("missing kind tag".into()));
            }
            Some(tag) => tag,
        };
        let kind = MessageKind::from_tag(tag).ok_or(ProtocolError::UnknownMessageKind(tag))?;
        let (field, bytes) = payload.ok_or_else(|| {
            ProtocolError::MalformedEnvelope(format!("{kind:?} has no payload"))
        })?;
        if field != kind.payload_field() {
            return Err(ProtocolError::MalformedEnvelope(format!(
                "{kind:?} tag with payload in field {field}"
            )));
        }

        read_payload(kind, bytes)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Envelopes serialize as `{"type": "PlayerLeft", "data": {...}}`.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(envelope).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Envelope, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
