//! C3: the message catalogue - typed records for each RexPro wire message.
//!
//! Each concrete request type knows how to serialise its own payload body
//! (the array placed after the envelope's `msg_type`/`msg_len`, see
//! [`crate::frame`]) for either protocol variant; each response type knows
//! how to parse itself back out of the bytes [`crate::frame::read_frame`]
//! hands it.

mod common;
mod error_response;
mod script_request;
mod script_response;
mod session_request;
mod session_response;

pub use error_response::ErrorResponse;
pub use script_request::ScriptRequest;
pub use script_response::ScriptResponse;
pub use session_request::SessionRequest;
pub use session_response::SessionResponse;

use crate::errors::Error;
use crate::frame::{MessageTag, ProtocolVariant};

/// Any RexPro wire message this crate can send or receive.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A server `ERROR` response.
    Error(ErrorResponse),
    /// A client `SESSION_REQUEST`.
    SessionRequest(SessionRequest),
    /// A server `SESSION_RESPONSE`.
    SessionResponse(SessionResponse),
    /// A client `SCRIPT_REQUEST`.
    ScriptRequest(ScriptRequest),
    /// A server `SCRIPT_RESPONSE` / `MSGPACK_SCRIPT_RESPONSE`.
    ScriptResponse(ScriptResponse),
    /// `CONSOLE_SCRIPT_RESPONSE` (V0 only). This client never asks for the
    /// console channel, so it never constructs one; parsed only so that an
    /// unsolicited console reply doesn't fail the connection outright.
    ConsoleScriptResponse,
}

impl Message {
    pub(crate) fn tag(&self) -> MessageTag {
        match self {
            Self::Error(_) => MessageTag::Error,
            Self::SessionRequest(_) => MessageTag::SessionRequest,
            Self::SessionResponse(_) => MessageTag::SessionResponse,
            Self::ScriptRequest(_) => MessageTag::ScriptRequest,
            Self::ScriptResponse(_) => MessageTag::ScriptResponse,
            Self::ConsoleScriptResponse => MessageTag::ConsoleScriptResponse,
        }
    }

    pub(crate) fn serialize_payload(&self, variant: ProtocolVariant) -> Result<Vec<u8>, Error> {
        match self {
            Self::SessionRequest(m) => m.serialize_payload(variant),
            Self::ScriptRequest(m) => m.serialize_payload(variant),
            Self::Error(_) | Self::SessionResponse(_) | Self::ScriptResponse(_) => Err(Error::Connection(
                "this message type is only ever received, never sent, by this client".into(),
            )),
            Self::ConsoleScriptResponse => Err(Error::Connection(
                "CONSOLE_SCRIPT_RESPONSE is never sent by this client".into(),
            )),
        }
    }

    pub(crate) fn parse_payload(tag: MessageTag, variant: ProtocolVariant, bytes: &[u8]) -> Result<Self, Error> {
        match tag {
            MessageTag::Error => Ok(Self::Error(ErrorResponse::parse_payload(variant, bytes)?)),
            MessageTag::SessionRequest => Ok(Self::SessionRequest(SessionRequest::parse_payload(variant, bytes)?)),
            MessageTag::SessionResponse => Ok(Self::SessionResponse(SessionResponse::parse_payload(variant, bytes)?)),
            MessageTag::ScriptRequest => Ok(Self::ScriptRequest(ScriptRequest::parse_payload(variant, bytes)?)),
            MessageTag::ScriptResponse => Ok(Self::ScriptResponse(ScriptResponse::parse_payload(variant, bytes)?)),
            MessageTag::ConsoleScriptResponse => Ok(Self::ConsoleScriptResponse),
        }
    }
}
