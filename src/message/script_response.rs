//! `SCRIPT_RESPONSE` (V1) / `MSGPACK_SCRIPT_RESPONSE` (V0) - the results of
//! a successful `SCRIPT_REQUEST`.

use crate::errors::Error;
use crate::frame::ProtocolVariant;
use crate::msgpack::{Value, ValueExt};

use super::common;

/// Results of a script execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResponse {
    pub(crate) request_id: [u8; 16],
    /// The decoded results value - may be `Nil`, a scalar, a sequence, or a
    /// mapping, inheriting whatever shape the server produced.
    pub results: Value,
    /// Variable bindings the script produced, if any.
    pub bindings: Value,
}

impl ScriptResponse {
    pub(crate) fn parse_payload(variant: ProtocolVariant, bytes: &[u8]) -> Result<Self, Error> {
        let items = crate::msgpack::decode_array(bytes)?;
        let head = common::parse_head(variant, items)?;
        let mut tail = head.tail;

        let results_value = common::next(&mut tail)?;
        let results = match variant {
            ProtocolVariant::V0 => {
                let blob = results_value
                    .as_bytes_loose()
                    .ok_or_else(|| Error::MalformedPayload("expected a msgpack blob for V0 results".into()))?;
                crate::msgpack::decode(blob)?
            }
            ProtocolVariant::V1 => results_value,
        };

        let bindings = common::next(&mut tail)?;

        Ok(Self {
            request_id: head.request,
            results,
            bindings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_response(variant: ProtocolVariant, results: Value) -> Vec<u8> {
        let mut items = common::build_head(variant, common::new_session_id(), common::new_request_id(), Vec::new());

        match variant {
            ProtocolVariant::V0 => items.push(Value::Binary(crate::msgpack::encode(&results).unwrap())),
            ProtocolVariant::V1 => items.push(results),
        }
        items.push(Value::Map(Vec::new()));

        crate::msgpack::encode(&Value::Array(items)).unwrap()
    }

    #[test]
    fn parses_scalar_results_v1() {
        let bytes = encode_response(ProtocolVariant::V1, Value::from(1982));
        let resp = ScriptResponse::parse_payload(ProtocolVariant::V1, &bytes).unwrap();
        assert_eq!(resp.results, Value::from(1982));
    }

    #[test]
    fn parses_nested_blob_results_v0() {
        let bytes = encode_response(ProtocolVariant::V0, Value::from("yea boyeeee"));
        let resp = ScriptResponse::parse_payload(ProtocolVariant::V0, &bytes).unwrap();
        assert_eq!(resp.results, Value::from("yea boyeeee"));
    }

    #[test]
    fn parses_nil_results() {
        let bytes = encode_response(ProtocolVariant::V1, Value::Nil);
        let resp = ScriptResponse::parse_payload(ProtocolVariant::V1, &bytes).unwrap();
        assert_eq!(resp.results, Value::Nil);
    }
}
