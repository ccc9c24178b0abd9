//! `ERROR` - a server-signalled failure, carrying a message and (on V1) an
//! error-class flag.

use crate::errors::{Error, ErrorFlag};
use crate::frame::ProtocolVariant;

use super::common;

/// A server `ERROR` response.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse {
    pub(crate) request_id: [u8; 16],
    /// The server's human-readable error message.
    pub message: String,
    /// The V1 error classification, if the connection is bound to V1.
    pub flag: Option<ErrorFlag>,
}

impl ErrorResponse {
    pub(crate) fn parse_payload(variant: ProtocolVariant, bytes: &[u8]) -> Result<Self, Error> {
        let items = crate::msgpack::decode_array(bytes)?;
        let head = common::parse_head(variant, items)?;
        let mut tail = head.tail;

        let message = common::as_string(common::next(&mut tail)?)?;

        let flag = match variant {
            ProtocolVariant::V0 => None,
            ProtocolVariant::V1 => common::meta_get(&head.meta, "flag")
                .and_then(crate::msgpack::Value::as_u64)
                .map(|v| ErrorFlag::from(v as u32)),
        };

        Ok(Self {
            request_id: head.request,
            message,
            flag,
        })
    }
}
