//! Shared wire model and protobuf codec for the gadget session transport.
//!
//! This crate owns every shape that crosses a socket: the request/response
//! [`Envelope`], endpoint addressing ([`addr`]), scene graph documents and
//! broadcast frames ([`scene`]), and interaction event payloads ([`events`]).
//! Envelope payloads stay flexible (`serde_json::Value`) while encoding over
//! protobuf for compact binary transport.

pub mod addr;
pub mod events;
pub mod scene;

use prost::Message;
use prost_types::value::Kind;
use prost_types::{ListValue, Struct};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use addr::{EndpointAddr, EndpointType, GlobalId};
pub use scene::{FrameRoot, GadgetTexture, NodeType, SceneFrame, SceneNode, TextureInfo, Transform, Vec3, Quat, Volume};

/// Error returned by [`decode_envelope`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireEnvelope`.
    #[error("failed to decode protobuf envelope: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The `status` integer on the wire does not map to a known [`Status`] variant.
    #[error("invalid envelope status: {0}")]
    InvalidStatus(i32),
}

/// Lifecycle status of an envelope in a request/response exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Initial request sent by either end.
    Request,
    /// Intermediate streaming item (non-terminal).
    Item,
    /// Successful terminal response.
    Done,
    /// Error terminal response.
    Error,
    /// Cancellation.
    Cancel,
}

impl Status {
    /// Convert status into wire enum integer value.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Request => WireStatus::Request as i32,
            Self::Item => WireStatus::Item as i32,
            Self::Done => WireStatus::Done as i32,
            Self::Error => WireStatus::Error as i32,
            Self::Cancel => WireStatus::Cancel as i32,
        }
    }

    /// Parse a status from wire enum integer value.
    fn from_i32(value: i32) -> Result<Self, CodecError> {
        match WireStatus::try_from(value) {
            Ok(WireStatus::Request) => Ok(Self::Request),
            Ok(WireStatus::Item) => Ok(Self::Item),
            Ok(WireStatus::Done) => Ok(Self::Done),
            Ok(WireStatus::Error) => Ok(Self::Error),
            Ok(WireStatus::Cancel) => Ok(Self::Cancel),
            Err(_) => Err(CodecError::InvalidStatus(value)),
        }
    }
}

/// A single message on the session wire protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique identifier for this envelope (UUID string).
    pub id: String,
    /// ID of the request this is responding to, if any.
    pub parent_id: Option<String>,
    /// Milliseconds since the Unix epoch when the envelope was created.
    pub ts: i64,
    /// Sender identifier (connection id or system label).
    pub from: Option<String>,
    /// Namespaced operation name, e.g. `"gadget:create"`.
    pub syscall: String,
    /// Lifecycle position of the envelope.
    pub status: Status,
    /// Arbitrary JSON payload.
    pub data: Value,
}

/// Encode an envelope into protobuf bytes.
#[must_use]
pub fn encode_envelope(envelope: &Envelope) -> Vec<u8> {
    let wire = WireEnvelope {
        id: envelope.id.clone(),
        parent_id: envelope.parent_id.clone(),
        ts: envelope.ts,
        from: envelope.from.clone(),
        syscall: envelope.syscall.clone(),
        status: envelope.status.as_i32(),
        data: Some(to_proto(&envelope.data)),
    };
    // A Vec grows as needed, so encoding cannot fail.
    wire.encode_to_vec()
}

/// Decode protobuf bytes into an envelope. Missing data decodes as `{}`.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::InvalidStatus`] for out-of-range status values.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let WireEnvelope { id, parent_id, ts, from, syscall, status, data } = WireEnvelope::decode(bytes)?;
    let status = Status::from_i32(status)?;
    let data = data.as_ref().map_or_else(|| Value::Object(Map::new()), from_proto);
    Ok(Envelope { id, parent_id, ts, from, syscall, status, data })
}

fn to_proto(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(prost_types::NullValue::NullValue.into()),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Number(n) if !exact_in_f64(n) => Kind::StringValue(n.to_string()),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        Value::String(text) => Kind::StringValue(text.clone()),
        Value::Array(items) => Kind::ListValue(ListValue { values: items.iter().map(to_proto).collect() }),
        Value::Object(map) => Kind::StructValue(Struct {
            fields: map.iter().map(|(key, item)| (key.clone(), to_proto(item))).collect(),
        }),
    };
    prost_types::Value { kind: Some(kind) }
}

fn from_proto(value: &prost_types::Value) -> Value {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::NumberValue(n)) => number_from_proto(*n),
        Some(Kind::StringValue(text)) => Value::String(text.clone()),
        Some(Kind::ListValue(list)) => list.values.iter().map(from_proto).collect(),
        Some(Kind::StructValue(map)) => {
            Value::Object(map.fields.iter().map(|(key, item)| (key.clone(), from_proto(item))).collect())
        }
    }
}

/// Every integer up to this magnitude survives a trip through `f64`.
const MAX_EXACT_INT: u64 = 1 << 53;

/// Integers a protobuf double would round travel as decimal strings instead;
/// readers of 64-bit ids accept either form (see [`addr::global_id_from_json`]).
fn exact_in_f64(n: &serde_json::Number) -> bool {
    if let Some(u) = n.as_u64() {
        return u <= MAX_EXACT_INT;
    }
    n.as_i64().is_none_or(|i| i.unsigned_abs() <= MAX_EXACT_INT)
}

/// Protobuf `Value` only carries doubles. Integral values come back as JSON
/// integers so handles and small global ids keep their integer type.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn number_from_proto(n: f64) -> Value {
    let exact = n.fract() == 0.0 && n.abs() <= MAX_EXACT_INT as f64;
    match (exact, n >= 0.0) {
        (true, true) => Value::from(n as u64),
        (true, false) => Value::from(n as i64),
        (false, _) => serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
    }
}

#[derive(Clone, PartialEq, Message)]
struct WireEnvelope {
    #[prost(string, tag = "1")]
    id: String,
    #[prost(string, optional, tag = "2")]
    parent_id: Option<String>,
    #[prost(int64, tag = "3")]
    ts: i64,
    #[prost(string, optional, tag = "4")]
    from: Option<String>,
    #[prost(string, tag = "5")]
    syscall: String,
    #[prost(enumeration = "WireStatus", tag = "6")]
    status: i32,
    #[prost(message, optional, tag = "7")]
    data: Option<prost_types::Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum WireStatus {
    Request = 0,
    Done = 1,
    Error = 2,
    Cancel = 3,
    Item = 4,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
