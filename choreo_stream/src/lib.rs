//! Shared ChoreoStream protocol helpers.
//!
//! Scene notifications leave the engine as a fixed-size header followed by a
//! MessagePack payload. Producers (the engine's broadcaster) and consumers (the
//! sound relay, the subject's client) share this crate so the framing stays in
//! one place.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

/// Bytes that prefix every ChoreoStream message ("CHRO").
pub const HEADER_MAGIC: [u8; 4] = *b"CHRO";

pub const PROTOCOL_VERSION: u16 = 1;

/// Magic, version, kind and payload length.
pub const HEADER_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u16)]
pub enum MessageKind {
    Hello = 1,
    PlaySound = 2,
    CuffScene = 3,
    SceneMark = 4,
}

impl MessageKind {
    const ALL: [MessageKind; 4] = [
        MessageKind::Hello,
        MessageKind::PlaySound,
        MessageKind::CuffScene,
        MessageKind::SceneMark,
    ];

    pub fn from_wire(raw: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u16 == raw)
    }
}

/// Framing in front of every payload. All fields are big-endian on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u16,
    pub kind: MessageKind,
    pub length: u32,
}

impl MessageHeader {
    fn put(&self, out: &mut BytesMut) {
        out.put_slice(&HEADER_MAGIC);
        out.put_u16(self.version);
        out.put_u16(self.kind as u16);
        out.put_u32(self.length);
    }

    /// Reads the header at the front of `input`; trailing bytes are ignored.
    pub fn parse(mut input: &[u8]) -> Result<Self, ProtocolError> {
        if input.len() < HEADER_LEN {
            return Err(ProtocolError::TruncatedHeader);
        }
        if input[..HEADER_MAGIC.len()] != HEADER_MAGIC {
            return Err(ProtocolError::BadMagic);
        }
        input.advance(HEADER_MAGIC.len());
        let version = input.get_u16();
        let raw_kind = input.get_u16();
        let kind = MessageKind::from_wire(raw_kind)
            .ok_or(ProtocolError::UnknownMessageKind(raw_kind))?;
        Ok(Self {
            version,
            kind,
            length: input.get_u32(),
        })
    }
}

/// Handshake sent to every subscriber when it connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    pub protocol: String,
    pub producer: String,
    pub build: Option<String>,
}

impl Hello {
    pub fn new(producer: impl Into<String>, build: Option<String>) -> Self {
        Self {
            protocol: "ChoreoStream".to_string(),
            producer: producer.into(),
            build,
        }
    }
}

/// "Play this sound for everyone near me" request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaySound {
    pub sound: String,
    pub distance_threshold: f32,
    pub volume: f32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub origin: Option<[f32; 3]>,
}

/// Cuff scene relayed from the officer's client to the subject's client.
///
/// `scene_pos` keeps the integer encoding used on the wire: 0 = back, 1 = front.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuffScene {
    pub perp_pos: [f32; 3],
    pub perp_rot: [f32; 3],
    pub scene_pos: i32,
}

/// Scene phase marker published for observers of a running scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMark {
    pub seq: u64,
    pub host_time_ns: u64,
    pub scene: String,
    pub phase: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("header smaller than {HEADER_LEN} bytes")]
    TruncatedHeader,
    #[error("header magic mismatch")]
    BadMagic,
    #[error("message kind {0:#06x} is unknown")]
    UnknownMessageKind(u16),
    #[error("payload of {0} bytes does not fit a frame")]
    Oversized(usize),
    #[error("header declared {expected} payload bytes but {actual} followed")]
    LengthMismatch { expected: u32, actual: usize },
    #[error("payload decode error: {0}")]
    PayloadDecode(#[from] rmp_serde::decode::Error),
    #[error("payload encode error: {0}")]
    PayloadEncode(#[from] rmp_serde::encode::Error),
}

/// Serialises `payload` and frames it as a `kind` message.
pub fn encode_message<T>(kind: MessageKind, payload: &T) -> Result<Bytes, ProtocolError>
where
    T: Serialize,
{
    let body = rmp_serde::to_vec_named(payload)?;
    let length = u32::try_from(body.len()).map_err(|_| ProtocolError::Oversized(body.len()))?;
    let mut frame = BytesMut::with_capacity(HEADER_LEN + body.len());
    MessageHeader {
        version: PROTOCOL_VERSION,
        kind,
        length,
    }
    .put(&mut frame);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Splits one complete frame into its header and payload.
pub fn decode_envelope(frame: &[u8]) -> Result<(MessageHeader, &[u8]), ProtocolError> {
    let header = MessageHeader::parse(frame)?;
    let payload = &frame[HEADER_LEN..];
    if payload.len() != header.length as usize {
        return Err(ProtocolError::LengthMismatch {
            expected: header.length,
            actual: payload.len(),
        });
    }
    Ok((header, payload))
}

pub fn decode_payload<T>(payload: &[u8]) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    Ok(rmp_serde::from_slice(payload)?)
}
