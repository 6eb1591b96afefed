//! Bounded JSON codec for event, command, and sync envelopes.
//!
//! Wire shapes:
//! ```text
//! event:          {"event":"GPI-1","state":"HIGH","user":"","password":""}
//! sync-response:  {"event":"sync-response","gpi":{"GPI-1":"LOW",..},"gpo":{"GPO-1":"LOW",..}}
//! ```
//! Every encoded envelope fits in [`MAX_ENVELOPE_LEN`] bytes.  An envelope
//! that would not fit is refused with [`CodecError::Oversized`]; it is never
//! truncated.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::domain::channel::{Direction, Level};
use crate::protocol::envelope::Envelope;

/// Upper bound on the size of any encoded envelope, in bytes.
pub const MAX_ENVELOPE_LEN: usize = 256;

/// `event` value of a sync response.
pub const SYNC_RESPONSE_EVENT: &str = "sync-response";

/// Errors raised while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The encoded envelope would exceed [`MAX_ENVELOPE_LEN`].
    #[error("encoded envelope is {len} bytes; the limit is {MAX_ENVELOPE_LEN}")]
    Oversized { len: usize },

    /// The bytes are not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON value is not an object.
    #[error("envelope is not a JSON object")]
    NotAnObject,

    /// The object has no string `event` field.
    #[error("envelope has no string \"event\" field")]
    MissingEvent,

    /// The stream buffer grew past its limit without yielding a value.
    #[error("{len} buffered bytes without a complete envelope; buffer discarded")]
    BufferOverflow { len: usize },
}

// Borrowed mirror of `Envelope` so encoding does not clone the credentials.
// Field order here is the key order on the wire.
#[derive(Serialize)]
struct EventRef<'a> {
    event: &'a str,
    state: &'a str,
    user: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SyncResponse<'a> {
    event: &'static str,
    gpi: ChannelLevels<'a>,
    gpo: ChannelLevels<'a>,
}

/// Serialises a level slice as `{"GPI-1":"HIGH",...}` in index order.
struct ChannelLevels<'a> {
    direction: Direction,
    levels: &'a [Level],
}

impl Serialize for ChannelLevels<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.levels.len()))?;
        for (index, level) in self.levels.iter().enumerate() {
            map.serialize_entry(&self.direction.wire_name(index), level.as_str())?;
        }
        map.end()
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an event envelope with exactly the keys `event`, `state`, `user`,
/// and `password`, in that order.  Empty credentials are written as `""`.
///
/// # Errors
///
/// Returns [`CodecError::Oversized`] if the result would exceed
/// [`MAX_ENVELOPE_LEN`].
///
/// # Examples
///
/// ```rust
/// use gpio_core::{decode, encode_event};
///
/// let bytes = encode_event("GPI-1", "HIGH", "op", "pw").unwrap();
/// assert_eq!(
///     bytes,
///     br#"{"event":"GPI-1","state":"HIGH","user":"op","password":"pw"}"#
/// );
/// let envelope = decode(&bytes).unwrap();
/// assert_eq!(envelope.user, "op");
/// ```
pub fn encode_event(
    event: &str,
    state: &str,
    user: &str,
    password: &str,
) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(&EventRef {
        event,
        state,
        user,
        password,
    })?;
    bounded(bytes)
}

/// Encodes a sync response covering exactly the given channels.
///
/// # Errors
///
/// Returns [`CodecError::Oversized`] if the result would exceed
/// [`MAX_ENVELOPE_LEN`]; the standard 8 inputs and 5 outputs always fit.
pub fn encode_sync(inputs: &[Level], outputs: &[Level]) -> Result<Vec<u8>, CodecError> {
    let bytes = serde_json::to_vec(&SyncResponse {
        event: SYNC_RESPONSE_EVENT,
        gpi: ChannelLevels {
            direction: Direction::Input,
            levels: inputs,
        },
        gpo: ChannelLevels {
            direction: Direction::Output,
            levels: outputs,
        },
    })?;
    bounded(bytes)
}

/// Decodes one envelope from `bytes`.
///
/// Unknown keys are ignored.  Missing or non-string `state`, `user`, and
/// `password` fields decode as empty strings.
///
/// # Errors
///
/// - [`CodecError::Json`] if `bytes` is not a single valid JSON value.
/// - [`CodecError::NotAnObject`] if the value is not an object.
/// - [`CodecError::MissingEvent`] if there is no string `event` field.
pub fn decode(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;
    envelope_from_value(value)
}

pub(crate) fn envelope_from_value(value: Value) -> Result<Envelope, CodecError> {
    let Value::Object(mut map) = value else {
        return Err(CodecError::NotAnObject);
    };

    let mut take = |key: &str| match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    let event = take("event").ok_or(CodecError::MissingEvent)?;
    Ok(Envelope {
        event,
        state: take("state").unwrap_or_default(),
        user: take("user").unwrap_or_default(),
        password: take("password").unwrap_or_default(),
    })
}

fn bounded(bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    if bytes.len() > MAX_ENVELOPE_LEN {
        return Err(CodecError::Oversized { len: bytes.len() });
    }
    Ok(bytes)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::{INPUT_COUNT, OUTPUT_COUNT};

    #[test]
    fn test_encode_event_has_exactly_four_keys() {
        // Arrange / Act
        let bytes = encode_event("GPI-2", "LOW", "", "").unwrap();

        // Assert
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 4);
        assert_eq!(map["event"], "GPI-2");
        assert_eq!(map["state"], "LOW");
        assert_eq!(map["user"], "");
        assert_eq!(map["password"], "");
    }

    #[test]
    fn test_encode_event_refuses_oversized_envelope() {
        let long = "u".repeat(MAX_ENVELOPE_LEN);

        let result = encode_event("GPI-1", "HIGH", &long, "");

        assert!(matches!(result, Err(CodecError::Oversized { len }) if len > MAX_ENVELOPE_LEN));
    }

    #[test]
    fn test_encode_event_at_exact_limit_is_accepted() {
        // {"event":"","state":"","user":"","password":""} is 47 bytes.
        let user = "a".repeat(MAX_ENVELOPE_LEN - 47);

        let bytes = encode_event("", "", &user, "").unwrap();

        assert_eq!(bytes.len(), MAX_ENVELOPE_LEN);
    }

    #[test]
    fn test_encode_sync_covers_every_channel() {
        // Arrange
        let mut inputs = vec![Level::Low; INPUT_COUNT];
        inputs[0] = Level::High;
        let outputs = vec![Level::High; OUTPUT_COUNT];

        // Act
        let bytes = encode_sync(&inputs, &outputs).unwrap();

        // Assert
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["event"], SYNC_RESPONSE_EVENT);
        let gpi = value["gpi"].as_object().unwrap();
        let gpo = value["gpo"].as_object().unwrap();
        assert_eq!(gpi.len(), INPUT_COUNT);
        assert_eq!(gpo.len(), OUTPUT_COUNT);
        assert_eq!(gpi["GPI-1"], "HIGH");
        assert_eq!(gpi["GPI-8"], "LOW");
        assert_eq!(gpo["GPO-5"], "HIGH");
        assert!(bytes.len() <= MAX_ENVELOPE_LEN);
    }

    #[test]
    fn test_encode_sync_lists_channels_in_index_order() {
        let bytes = encode_sync(&[Level::Low, Level::High], &[Level::Low]).unwrap();

        assert_eq!(
            bytes,
            br#"{"event":"sync-response","gpi":{"GPI-1":"LOW","GPI-2":"HIGH"},"gpo":{"GPO-1":"LOW"}}"#
        );
    }

    #[test]
    fn test_decode_ignores_unknown_keys() {
        let envelope =
            decode(br#"{"event":"GPO-1","state":"HIGH","extra":42,"nested":{"a":1}}"#).unwrap();

        assert_eq!(envelope, Envelope::new("GPO-1", "HIGH", "", ""));
    }

    #[test]
    fn test_decode_missing_event_fails() {
        let result = decode(br#"{"state":"HIGH"}"#);
        assert!(matches!(result, Err(CodecError::MissingEvent)));
    }

    #[test]
    fn test_decode_non_string_event_fails() {
        let result = decode(br#"{"event":3}"#);
        assert!(matches!(result, Err(CodecError::MissingEvent)));
    }

    #[test]
    fn test_decode_invalid_json_fails() {
        let result = decode(br#"{"event":"GPO-1""#);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn test_decode_array_is_not_an_object() {
        let result = decode(br#"["event"]"#);
        assert!(matches!(result, Err(CodecError::NotAnObject)));
    }

    #[test]
    fn test_decode_non_string_optional_fields_default_to_empty() {
        let envelope = decode(br#"{"event":"sync","state":1,"user":null}"#).unwrap();

        assert_eq!(envelope.state, "");
        assert_eq!(envelope.user, "");
    }
}
