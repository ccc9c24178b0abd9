//! Shared helpers used by every message type: request/session id
//! generation, and the `[session, request, meta?]` payload head both
//! protocol variants carry.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::{Context, Timestamp, Uuid};

use crate::errors::Error;
use crate::frame::ProtocolVariant;
use crate::msgpack::{Value, ValueExt};

/// V0's payload-wide `version` field. Distinct from the V1 envelope's
/// `proto_ver` byte - this one lives inside the msgpack array itself.
const V0_PAYLOAD_VERSION: i64 = 1;
/// V0's payload-wide `flag` field. This crate never sets any payload flags.
const V0_PAYLOAD_FLAG: i64 = 0;

/// An arbitrary, fixed 6-byte "node id" for v1 UUID generation.
///
/// RexPro has no MAC-address concept and this crate isn't tied to a NIC, so
/// every v1 UUID minted by this process shares the same node id;
/// uniqueness comes from the timestamp and the monotonic counter below.
const NODE_ID: [u8; 6] = *b"rexpro";

fn clock_context() -> &'static Context {
    static CONTEXT: OnceLock<Context> = OnceLock::new();
    CONTEXT.get_or_init(|| Context::new(0))
}

/// A fresh time-ordered (v1) UUID, used as a request id.
pub(crate) fn new_request_id() -> [u8; 16] {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let ts = Timestamp::from_unix(clock_context(), now.as_secs(), now.subsec_nanos());
    *Uuid::new_v1(ts, &NODE_ID).as_bytes()
}

/// A fresh random (v4) UUID, used as a client-proposed session id when
/// opening a new session.
pub(crate) fn new_session_id() -> [u8; 16] {
    *Uuid::new_v4().as_bytes()
}

/// Builds the payload-wide head shared by every message: session id,
/// request id, and (V1 only) `meta_map`.
pub(crate) fn build_head(
    variant: ProtocolVariant,
    session: [u8; 16],
    request: [u8; 16],
    meta: Vec<(Value, Value)>,
) -> Vec<Value> {
    match variant {
        ProtocolVariant::V0 => vec![
            Value::from(V0_PAYLOAD_VERSION),
            Value::from(V0_PAYLOAD_FLAG),
            Value::Binary(session.to_vec()),
            Value::Binary(request.to_vec()),
        ],
        ProtocolVariant::V1 => vec![
            Value::Binary(session.to_vec()),
            Value::Binary(request.to_vec()),
            Value::Map(meta),
        ],
    }
}

/// The parsed payload head plus an iterator over the message-specific tail.
pub(crate) struct Head {
    pub session: [u8; 16],
    pub request: [u8; 16],
    pub meta: Vec<(Value, Value)>,
    pub tail: std::vec::IntoIter<Value>,
}

/// Splits a parsed payload array into its shared head and message-specific
/// tail, for either protocol variant.
pub(crate) fn parse_head(variant: ProtocolVariant, items: Vec<Value>) -> Result<Head, Error> {
    let mut iter = items.into_iter();

    match variant {
        ProtocolVariant::V0 => {
            let _version = next(&mut iter)?;
            let _flag = next(&mut iter)?;
            let session = as_uuid_bytes(next(&mut iter)?)?;
            let request = as_uuid_bytes(next(&mut iter)?)?;
            Ok(Head {
                session,
                request,
                meta: Vec::new(),
                tail: iter,
            })
        }
        ProtocolVariant::V1 => {
            let session = as_uuid_bytes(next(&mut iter)?)?;
            let request = as_uuid_bytes(next(&mut iter)?)?;
            let meta = as_map(next(&mut iter)?)?;
            Ok(Head {
                session,
                request,
                meta,
                tail: iter,
            })
        }
    }
}

/// Pulls the next tail field, erroring if the payload array ended early.
pub(crate) fn next(iter: &mut std::vec::IntoIter<Value>) -> Result<Value, Error> {
    iter.next()
        .ok_or_else(|| Error::MalformedPayload("payload array ended early".into()))
}

pub(crate) fn as_uuid_bytes(v: Value) -> Result<[u8; 16], Error> {
    let bytes = v
        .as_bytes_loose()
        .ok_or_else(|| Error::MalformedPayload(format!("expected a 16-byte id, got {v:?}")))?
        .to_vec();
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| Error::MalformedPayload(format!("expected a 16-byte id, got {} bytes", b.len())))
}

pub(crate) fn as_string(v: Value) -> Result<String, Error> {
    match v {
        Value::String(s) => s
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| Error::MalformedPayload("expected a utf-8 string".into())),
        Value::Binary(b) => {
            String::from_utf8(b).map_err(|e| Error::MalformedPayload(format!("expected a utf-8 string: {e}")))
        }
        other => Err(Error::MalformedPayload(format!("expected a string, got {other:?}"))),
    }
}

pub(crate) fn as_map(v: Value) -> Result<Vec<(Value, Value)>, Error> {
    match v {
        Value::Map(m) => Ok(m),
        other => Err(Error::MalformedPayload(format!("expected a map, got {other:?}"))),
    }
}

pub(crate) fn as_array(v: Value) -> Result<Vec<Value>, Error> {
    match v {
        Value::Array(a) => Ok(a),
        other => Err(Error::MalformedPayload(format!("expected an array, got {other:?}"))),
    }
}

pub(crate) fn meta_get<'a>(meta: &'a [(Value, Value)], key: &str) -> Option<&'a Value> {
    meta.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
}

pub(crate) fn meta_bool(meta: &[(Value, Value)], key: &str, default: bool) -> bool {
    meta_get(meta, key).and_then(Value::as_bool).unwrap_or(default)
}

pub(crate) fn meta_str(meta: &[(Value, Value)], key: &str) -> Option<String> {
    meta_get(meta, key).and_then(Value::as_str).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_ne!(a, b);
    }

    #[test]
    fn session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }

    #[test]
    fn head_round_trips_v1() {
        let session = new_session_id();
        let request = new_request_id();
        let meta = vec![(Value::from("isolate"), Value::from(false))];
        let head_values = build_head(ProtocolVariant::V1, session, request, meta.clone());

        let parsed = parse_head(ProtocolVariant::V1, head_values).unwrap();
        assert_eq!(parsed.session, session);
        assert_eq!(parsed.request, request);
        assert_eq!(parsed.meta, meta);
        assert_eq!(parsed.tail.count(), 0);
    }

    #[test]
    fn head_round_trips_v0() {
        let session = new_session_id();
        let request = new_request_id();
        let head_values = build_head(ProtocolVariant::V0, session, request, Vec::new());

        let parsed = parse_head(ProtocolVariant::V0, head_values).unwrap();
        assert_eq!(parsed.session, session);
        assert_eq!(parsed.request, request);
        assert!(parsed.meta.is_empty());
    }

    #[test]
    fn meta_bool_falls_back_to_default() {
        let meta = vec![(Value::from("isolate"), Value::from(false))];
        assert!(!meta_bool(&meta, "isolate", true));
        assert!(meta_bool(&meta, "transaction", true));
    }
}
