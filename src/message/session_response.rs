//! `SESSION_RESPONSE` - the server's reply to a successful
//! `SESSION_REQUEST`.

use crate::errors::Error;
use crate::frame::ProtocolVariant;

use super::common;

/// A `SESSION_RESPONSE`: carries the session key the server assigned (or
/// confirmed) and the scripting languages it reports support for.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResponse {
    /// The 16-byte session key. Non-zero on success (§3 invariants).
    pub session_key: [u8; 16],
    pub(crate) request_id: [u8; 16],
    /// The scripting languages the server reports support for.
    pub languages: Vec<String>,
}

impl SessionResponse {
    pub(crate) fn parse_payload(variant: ProtocolVariant, bytes: &[u8]) -> Result<Self, Error> {
        let items = crate::msgpack::decode_array(bytes)?;
        let head = common::parse_head(variant, items)?;
        let mut tail = head.tail;

        let languages = common::as_array(common::next(&mut tail)?)?
            .into_iter()
            .map(common::as_string)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            session_key: head.session,
            request_id: head.request,
            languages,
        })
    }
}
