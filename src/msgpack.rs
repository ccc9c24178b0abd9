//! Thin boundary over the external MessagePack codec.
//!
//! RexPro payloads are MessagePack arrays. This module is the only place in
//! the crate that talks directly to the `rmpv` crate; everything above it
//! deals in [`Value`] only. `rmpv::Value` already distinguishes
//! [`Value::String`] from [`Value::Binary`], which is the distinction this
//! crate depends on to carry session/request ids as raw bytes rather than
//! text (see [`crate::message`]).

use crate::errors::Error;

/// The JSON-ish value universe MessagePack messages are decoded into:
/// booleans, signed/unsigned integers up to 64 bits, doubles, UTF-8 strings,
/// opaque byte strings, ordered sequences, and string-keyed mappings. `nil`
/// is [`Value::Nil`].
pub type Value = rmpv::Value;

/// Encodes `value` into its MessagePack wire representation.
pub(crate) fn encode(value: &Value) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value)
        .map_err(|e| Error::MalformedPayload(format!("failed to encode msgpack value: {e}")))?;
    Ok(buf)
}

/// Decodes a single MessagePack value from `bytes`.
///
/// Trailing bytes after the value are ignored, matching `rmpv`'s reader
/// semantics; callers that need to assert on exact consumption should check
/// the cursor position themselves.
pub(crate) fn decode(bytes: &[u8]) -> Result<Value, Error> {
    let mut cursor = std::io::Cursor::new(bytes);
    rmpv::decode::read_value(&mut cursor)
        .map_err(|e| Error::MalformedPayload(format!("failed to decode msgpack value: {e}")))
}

/// Decodes a MessagePack array payload, returning an error if the top-level
/// value is not an array.
pub(crate) fn decode_array(bytes: &[u8]) -> Result<Vec<Value>, Error> {
    match decode(bytes)? {
        Value::Array(items) => Ok(items),
        other => Err(Error::MalformedPayload(format!(
            "expected a msgpack array, got {other:?}"
        ))),
    }
}

/// Extension helpers for plucking typed values out of a generic [`Value`],
/// used throughout [`crate::message`] to parse response payloads.
pub(crate) trait ValueExt {
    /// Returns the raw bytes if this value is a string or a binary blob.
    fn as_bytes_loose(&self) -> Option<&[u8]>;
}

impl ValueExt for Value {
    fn as_bytes_loose(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => s.as_bytes(),
            Value::Binary(b) => Some(b.as_slice()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_integer() {
        let v = Value::from(1982);
        let bytes = encode(&v).unwrap();
        assert_eq!(decode(&bytes).unwrap(), v);
    }

    #[test]
    fn round_trips_nil() {
        let bytes = encode(&Value::Nil).unwrap();
        assert_eq!(decode(&bytes).unwrap(), Value::Nil);
    }

    #[test]
    fn round_trips_float() {
        let v = Value::F64(3.14);
        let bytes = encode(&v).unwrap();
        assert_eq!(decode(&bytes).unwrap(), v);
    }

    #[test]
    fn round_trips_binary_distinct_from_string() {
        let bin = Value::Binary(vec![1, 2, 3]);
        let text = Value::String("\u{1}\u{2}\u{3}".into());

        let bin_bytes = encode(&bin).unwrap();
        let text_bytes = encode(&text).unwrap();

        assert_ne!(bin_bytes, text_bytes);
        assert_eq!(decode(&bin_bytes).unwrap(), bin);
        assert_eq!(decode(&text_bytes).unwrap(), text);
    }

    #[test]
    fn decode_array_rejects_non_array() {
        let bytes = encode(&Value::from(1)).unwrap();
        assert!(decode_array(&bytes).is_err());
    }

    #[test]
    fn decode_array_unwraps_top_level_array() {
        let arr = Value::Array(vec![Value::from(1), Value::from("two")]);
        let bytes = encode(&arr).unwrap();
        let items = decode_array(&bytes).unwrap();
        assert_eq!(items.len(), 2);
    }
}
