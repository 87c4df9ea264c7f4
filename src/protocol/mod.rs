//! Event envelope decoding: one wire frame in, one typed event out.
//!
//! # Decoding
//!
//! ```text
//! raw frame ─► JSON object ─► `type` ─► EventKind ─► required fields ─► typed payload
//!                  │             │          │               │                 │
//!            MalformedFrame  Missing-   UnknownEvent-   MissingRequired-  InvalidPayload
//!                          Discriminator    Type            Field
//! ```
//!
//! Unknown discriminators fail loudly rather than being skipped, so that
//! upstream protocol drift is visible. Opaque leaves (argument deltas,
//! annotations, reasoning deltas) are accepted as any JSON value.
//!
//! ## Example
//!
//! ```rust
//! use ai_lib_responses::protocol::decode;
//! use ai_lib_responses::types::EventKind;
//!
//! let event = decode(r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"Hi","sequence_number":3}"#)?;
//! assert_eq!(event.kind(), EventKind::OutputTextDelta);
//! assert_eq!(event.sequence_number(), Some(3));
//! # Ok::<(), ai_lib_responses::protocol::DecodeError>(())
//! ```

pub mod error;
pub mod schema;

pub use error::DecodeError;

use crate::types::events::{EventKind, ResponseStreamEvent};
use serde_json::Value;

/// Decodes one SSE `data:` payload.
pub fn decode(raw: &str) -> Result<ResponseStreamEvent, DecodeError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| DecodeError::malformed(e.to_string()))?;
    decode_value(value)
}

pub fn decode_bytes(raw: &[u8]) -> Result<ResponseStreamEvent, DecodeError> {
    let text = std::str::from_utf8(raw).map_err(|e| DecodeError::malformed(e.to_string()))?;
    decode(text)
}

/// Decodes an already-parsed JSON frame.
pub fn decode_value(value: Value) -> Result<ResponseStreamEvent, DecodeError> {
    let object = value.as_object().ok_or_else(|| {
        DecodeError::malformed(format!("expected a JSON object, got {}", kind_of(&value)))
    })?;

    let tag = match object.get("type") {
        None | Some(Value::Null) => return Err(DecodeError::MissingDiscriminator),
        Some(Value::String(tag)) => tag.as_str(),
        Some(other) => {
            return Err(DecodeError::malformed(format!(
                "`type` must be a string, got {}",
                kind_of(other)
            )))
        }
    };

    let kind = EventKind::parse(tag).ok_or_else(|| DecodeError::UnknownEventType(tag.to_string()))?;

    if let Some(field) = schema::required_fields(kind)
        .iter()
        .find(|field| object.get(**field).map_or(true, Value::is_null))
    {
        return Err(DecodeError::MissingRequiredField {
            event: kind.as_str().to_string(),
            field: (*field).to_string(),
        });
    }

    ResponseStreamEvent::from_payload(kind, value).map_err(|e| DecodeError::InvalidPayload {
        event: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
