//! Wire codec.
//!
//! Goals:
//! - Frame reliable (TCP) messages with a 4-byte big-endian length prefix.
//! - Serialize/deserialize a closed, tagged set of message variants.
//! - Keep errors typed and recoverable: decoding never panics and never
//!   aborts the endpoint on its own.
//!
//! This is not a full production netcode implementation; it is a scaffold
//! that keeps the framing and schema explicit and versionable.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ecs::EntityName;
use crate::math::{Point, ViewDir};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum reliable frame payload, inclusive.
pub const MAX_RELIABLE_PAYLOAD: u32 = 1024 * 1024;

/// Conservative datagram send cap, chosen to avoid IP fragmentation.
pub const MAX_DATAGRAM_SEND: usize = 1200;

/// Datagram receive cap: the theoretical IPv4 UDP payload ceiling.
pub const MAX_DATAGRAM_RECV: usize = 65_507;

/// Identifies a connected client. Strictly positive, allocated by the
/// session registry's monotonic counter; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);

/// Player action kinds carried by `NetMsg::Input`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Action {
    Move,
    MovePath,
    CastSkill,
    Interact,
}

/// Per-entity state carried in a `Snapshot`. Position is always present;
/// everything else is optional and left untouched on the receiver when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub name: EntityName,
    pub position: Point,
    pub view_dir: Option<ViewDir>,
    pub health: Option<(i32, i32)>,
    pub animation: Option<String>,
    pub tint: Option<u32>,
}

impl EntityState {
    pub fn at(name: impl Into<EntityName>, position: Point) -> Self {
        Self {
            name: name.into(),
            position,
            view_dir: None,
            health: None,
            animation: None,
            tint: None,
        }
    }
}

/// A per-tick, never-stored broadcast of observable entity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub server_tick: u64,
    pub entities: Vec<EntityState>,
}

/// High-level message envelope. A closed, tagged variant set; adding a
/// variant is backward compatible, changing a variant's fields is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetMsg {
    // ─── client -> server: handshake ───
    ConnectRequest { player_name: String },
    RegisterUdp { client_id: ClientId },
    Input { client_id: ClientId, action: Action, point: Point },
    RequestEntitySpawn { entity_name: EntityName },

    // ─── server -> client: handshake/control ───
    ConnectAck { client_id: ClientId },
    ConnectReject { reason: String },
    LevelChange { level_name: String, spawn_point: Option<Point> },
    EntitySpawnEvent {
        entity_name: EntityName,
        position: Point,
        view_dir: Option<ViewDir>,
        texture_path: String,
        animation: String,
        tint: u32,
    },
    Snapshot(Snapshot),
    GameOver,
}

/// Error kinds produced while decoding — never panics, never aborts the
/// endpoint on its own; see spec §7 for the taxonomy this maps onto.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed framing: {0}")]
    Framing(String),
    #[error("unknown message variant")]
    UnknownVariant,
    #[error("value-level constraint violation: {0}")]
    Constraint(String),
    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Encodes a message to its opaque wire payload (used for both the reliable
/// and datagram channels; framing differs, payload encoding does not).
pub fn encode(msg: &NetMsg) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(msg)?)
}

/// Decodes a payload into a message. Unknown variants and schema violations
/// surface as typed errors rather than panics. Both are `serde_json` "data"
/// errors (as opposed to a syntax error, which means the bytes weren't even
/// valid JSON); an unrecognized tag is distinguished from a value-level
/// constraint violation (wrong field type, out-of-range value) by serde's
/// own "unknown variant" wording, since that's the only signal serde_json
/// surfaces for which case occurred.
pub fn decode(bytes: &[u8]) -> Result<NetMsg, CodecError> {
    serde_json::from_slice(bytes).map_err(classify_decode_error)
}

fn classify_decode_error(e: serde_json::Error) -> CodecError {
    if e.is_data() {
        if e.to_string().contains("unknown variant") {
            CodecError::UnknownVariant
        } else {
            CodecError::Constraint(e.to_string())
        }
    } else {
        CodecError::Serde(e)
    }
}

/// Prefixes an encoded payload with its 4-byte big-endian length, refusing
/// payloads above `MAX_RELIABLE_PAYLOAD`.
pub fn frame_reliable(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let len = payload.len();
    if len == 0 || len as u64 > MAX_RELIABLE_PAYLOAD as u64 {
        return Err(CodecError::Framing(format!(
            "payload length {len} outside 1..={MAX_RELIABLE_PAYLOAD}"
        )));
    }
    let mut framed = BytesMut::with_capacity(4 + len);
    framed.put_u32(len as u32);
    framed.extend_from_slice(payload);
    Ok(framed.to_vec())
}

/// Validates a frame length read off the wire before the payload is read.
pub fn validate_frame_len(len: u32) -> Result<usize, CodecError> {
    if len == 0 || len > MAX_RELIABLE_PAYLOAD {
        return Err(CodecError::Framing(format!(
            "frame length {len} outside 1..={MAX_RELIABLE_PAYLOAD}"
        )));
    }
    Ok(len as usize)
}

/// Validates a datagram payload is within the conservative send cap.
pub fn validate_datagram_send(payload: &[u8]) -> Result<(), CodecError> {
    if payload.len() > MAX_DATAGRAM_SEND {
        return Err(CodecError::Constraint(format!(
            "datagram payload {} exceeds send cap {}",
            payload.len(),
            MAX_DATAGRAM_SEND
        )));
    }
    Ok(())
}
