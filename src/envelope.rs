//! Envelope: the request/response message carried on every connection.
//!
//! DESIGN
//! ======
//! - Flat data: payload is always `Map<String, Value>` at the top level.
//! - Replies correlate to requests via `parent_id` and inherit the syscall.
//! - The websocket handler routes on the syscall prefix (`gadget:`, `poker:`,
//!   ...) and leaves field extraction to the per-prefix handlers.
//! - On the socket an envelope travels as [`wire::Envelope`]: protobuf in
//!   binary messages, JSON in text messages.

#[cfg(test)]
#[path = "envelope_test.rs"]
mod envelope_test;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;
use wire::Status;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Envelope data key for error messages.
pub const FIELD_MESSAGE: &str = "message";

/// Envelope data key for grepable error codes.
pub const FIELD_CODE: &str = "code";

/// Envelope data key for the retryable flag on error envelopes.
pub const FIELD_RETRYABLE: &str = "retryable";

// =============================================================================
// TYPES
// =============================================================================

/// Flat key-value payload.
pub type Data = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Milliseconds since Unix epoch. Set automatically at construction.
    pub ts: i64,
    pub from: Option<String>,
    pub syscall: String,
    pub status: Status,
    pub data: Data,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid envelope id: {0}")]
    InvalidId(String),
    #[error("envelope data must be an object")]
    DataNotObject,
    #[error(transparent)]
    Codec(#[from] wire::CodecError),
    #[error("invalid json envelope: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured error envelopes.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

/// A required request field was missing or had the wrong shape.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("missing field: {0}")]
    Missing(&'static str),
    #[error("invalid field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ErrorCode for FieldError {
    fn error_code(&self) -> &'static str {
        "E_INVALID_PARAMETER"
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Envelope {
    pub fn request(syscall: impl Into<String>, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            ts: now_ms(),
            from: None,
            syscall: syscall.into(),
            status: Status::Request,
            data,
        }
    }

    #[must_use]
    pub fn done(&self) -> Self {
        self.reply(Status::Done, Data::new())
    }

    #[must_use]
    pub fn done_with(&self, data: Data) -> Self {
        self.reply(Status::Done, data)
    }

    /// Structured error reply from a typed error. Terminal.
    #[must_use]
    pub fn error_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Data::new();
        data.insert(FIELD_CODE.into(), Value::String(err.error_code().to_string()));
        data.insert(FIELD_MESSAGE.into(), Value::String(err.to_string()));
        data.insert(FIELD_RETRYABLE.into(), Value::Bool(err.retryable()));
        self.reply(Status::Error, data)
    }

    fn reply(&self, status: Status, data: Data) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(self.id),
            ts: now_ms(),
            from: None,
            syscall: self.syscall.clone(),
            status,
            data,
        }
    }

    #[must_use]
    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// ROUTING
// =============================================================================

impl Envelope {
    /// Everything before the first ':'.
    #[must_use]
    pub fn prefix(&self) -> &str {
        let Some((prefix, _)) = self.syscall.split_once(':') else {
            return &self.syscall;
        };
        prefix
    }

    /// Everything after the first ':'.
    #[must_use]
    pub fn op(&self) -> &str {
        self.syscall.split_once(':').map_or("", |(_, op)| op)
    }
}

// =============================================================================
// FIELD ACCESS
// =============================================================================

impl Envelope {
    /// # Errors
    ///
    /// [`FieldError::Missing`] if absent, [`FieldError::Invalid`] if not a string.
    pub fn str_field(&self, field: &'static str) -> Result<&str, FieldError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Err(FieldError::Missing(field)),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(FieldError::Invalid { field, reason: "expected string".into() }),
        }
    }

    #[must_use]
    pub fn opt_str_field(&self, field: &'static str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// # Errors
    ///
    /// [`FieldError`] if absent or not an unsigned integer within `u32`.
    pub fn u32_field(&self, field: &'static str) -> Result<u32, FieldError> {
        let raw = self.u64_field(field)?;
        u32::try_from(raw).map_err(|_| FieldError::Invalid { field, reason: format!("{raw} exceeds u32") })
    }

    /// Unsigned integer, or its decimal string for ids wider than a double.
    ///
    /// # Errors
    ///
    /// [`FieldError`] if absent or not an unsigned integer.
    pub fn u64_field(&self, field: &'static str) -> Result<u64, FieldError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Err(FieldError::Missing(field)),
            Some(v) => wire::addr::global_id_from_json(v)
                .ok_or_else(|| FieldError::Invalid { field, reason: "expected unsigned integer".into() }),
        }
    }

    /// # Errors
    ///
    /// [`FieldError::Invalid`] if present but not an unsigned integer within `u32`.
    pub fn opt_u32_field(&self, field: &'static str) -> Result<Option<u32>, FieldError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.u32_field(field).map(Some),
        }
    }

    /// Deserialize a structured field.
    ///
    /// # Errors
    ///
    /// [`FieldError`] if absent or not deserializable as `T`.
    pub fn parse_field<T: DeserializeOwned>(&self, field: &'static str) -> Result<T, FieldError> {
        let value = self.data.get(field).ok_or(FieldError::Missing(field))?;
        serde_json::from_value(value.clone()).map_err(|e| FieldError::Invalid { field, reason: e.to_string() })
    }
}

// =============================================================================
// WIRE CONVERSION
// =============================================================================

impl From<&Envelope> for wire::Envelope {
    fn from(envelope: &Envelope) -> Self {
        Self {
            id: envelope.id.to_string(),
            parent_id: envelope.parent_id.map(|id| id.to_string()),
            ts: envelope.ts,
            from: envelope.from.clone(),
            syscall: envelope.syscall.clone(),
            status: envelope.status,
            data: Value::Object(envelope.data.clone().into_iter().collect()),
        }
    }
}

impl TryFrom<wire::Envelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: wire::Envelope) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&wire.id).map_err(|_| EnvelopeError::InvalidId(wire.id.clone()))?;
        let parent_id = wire
            .parent_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| Uuid::parse_str(s).map_err(|_| EnvelopeError::InvalidId(s.to_owned())))
            .transpose()?;
        let data = match wire.data {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => Data::new(),
            _ => return Err(EnvelopeError::DataNotObject),
        };
        Ok(Self { id, parent_id, ts: wire.ts, from: wire.from, syscall: wire.syscall, status: wire.status, data })
    }
}

impl Envelope {
    /// Protobuf bytes for a binary websocket message.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        wire::encode_envelope(&wire::Envelope::from(self))
    }

    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the bytes or the envelope id are malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        Self::try_from(wire::decode_envelope(bytes)?)
    }

    /// JSON text for a text websocket message.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Json`] if a payload value cannot be serialized.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&wire::Envelope::from(self))?)
    }

    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the text is not a valid envelope.
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        Self::try_from(serde_json::from_str::<wire::Envelope>(text)?)
    }
}
