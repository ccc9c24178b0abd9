//! The outer envelope (C4): `write_frame`/`read_frame` and the message type
//! tag catalogue.
//!
//! A [`crate::Connection`] is bound to exactly one [`ProtocolVariant`],
//! chosen at construction time; this module never attempts runtime
//! auto-detection of the server's envelope flavour - the server generation
//! is a deployment fact, not something to sniff from the wire.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::errors::Error;
use crate::message::Message;

/// The two on-the-wire envelope formats RexPro speaks.
///
/// "V0" prefixes every message with `[msg_type:1][msg_len:4-be][payload]`.
/// "V1" prefixes with
/// `[proto_ver:1 = 1][serializer:1 = 0][reserved:4][msg_type:1][msg_len:4-be][payload]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVariant {
    /// The legacy envelope format: no protocol/serializer header bytes.
    V0,
    /// The current envelope format, carrying an explicit protocol version
    /// and serializer id ahead of the message type tag.
    V1,
}

const V1_PROTO_VERSION: u8 = 1;
const V1_SERIALIZER: u8 = 0;
const V1_RESERVED: [u8; 4] = [0, 0, 0, 0];

const TAG_ERROR: u8 = 0;
const TAG_SESSION_REQUEST: u8 = 1;
const TAG_SESSION_RESPONSE: u8 = 2;
const TAG_SCRIPT_REQUEST: u8 = 3;
const TAG_CONSOLE_SCRIPT_RESPONSE: u8 = 4;
const TAG_SCRIPT_RESPONSE: u8 = 5;

/// Wire message type tags (stable across both envelope variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MessageTag {
    /// `ERROR` (0).
    Error,
    /// `SESSION_REQUEST` (1).
    SessionRequest,
    /// `SESSION_RESPONSE` (2).
    SessionResponse,
    /// `SCRIPT_REQUEST` (3).
    ScriptRequest,
    /// `CONSOLE_SCRIPT_RESPONSE` (4, V0 only, ignored on input).
    ConsoleScriptResponse,
    /// `SCRIPT_RESPONSE` (V1) / `MSGPACK_SCRIPT_RESPONSE` (V0) (5).
    ScriptResponse,
}

impl MessageTag {
    /// The stable wire integer for this tag.
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Error => TAG_ERROR,
            Self::SessionRequest => TAG_SESSION_REQUEST,
            Self::SessionResponse => TAG_SESSION_RESPONSE,
            Self::ScriptRequest => TAG_SCRIPT_REQUEST,
            Self::ConsoleScriptResponse => TAG_CONSOLE_SCRIPT_RESPONSE,
            Self::ScriptResponse => TAG_SCRIPT_RESPONSE,
        }
    }
}

impl TryFrom<u8> for MessageTag {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            TAG_ERROR => Ok(Self::Error),
            TAG_SESSION_REQUEST => Ok(Self::SessionRequest),
            TAG_SESSION_RESPONSE => Ok(Self::SessionResponse),
            TAG_SCRIPT_REQUEST => Ok(Self::ScriptRequest),
            TAG_CONSOLE_SCRIPT_RESPONSE => Ok(Self::ConsoleScriptResponse),
            TAG_SCRIPT_RESPONSE => Ok(Self::ScriptResponse),
            v => Err(Error::UnknownMessageType(v)),
        }
    }
}

/// Writes `msg`'s envelope and payload for the given `variant` to `w`.
pub(crate) fn write_frame<W: Write>(w: &mut W, variant: ProtocolVariant, msg: &Message) -> Result<(), Error> {
    let payload = msg.serialize_payload(variant)?;

    match variant {
        ProtocolVariant::V0 => {
            w.write_u8(msg.tag().as_u8())?;
        }
        ProtocolVariant::V1 => {
            w.write_u8(V1_PROTO_VERSION)?;
            w.write_u8(V1_SERIALIZER)?;
            w.write_all(&V1_RESERVED)?;
            w.write_u8(msg.tag().as_u8())?;
        }
    }

    w.write_all(&crate::byte_helpers::u32_be_encode(payload.len() as u32))?;
    w.write_all(&payload)?;

    Ok(())
}

/// Reads one framed message for the given `variant` from `r`.
///
/// Validates the fixed envelope fields (V1: `proto_ver == 1`,
/// `serializer == 0`), reads exactly `msg_len` bytes, and dispatches to the
/// catalogue entry keyed by `msg_type`. Unknown message types are a
/// [`Error::UnknownMessageType`] connection-level error.
pub(crate) fn read_frame<R: Read>(r: &mut R, variant: ProtocolVariant) -> Result<Message, Error> {
    let tag_byte = match variant {
        ProtocolVariant::V0 => read_leading_byte(r)?,
        ProtocolVariant::V1 => {
            let proto_ver = read_leading_byte(r)?;
            if proto_ver != V1_PROTO_VERSION {
                return Err(Error::UnsupportedProtocolVersion(proto_ver));
            }

            let serializer = r.read_u8()?;
            if serializer != V1_SERIALIZER {
                return Err(Error::UnsupportedSerializer(serializer));
            }

            let mut reserved = [0u8; 4];
            r.read_exact(&mut reserved)?;

            r.read_u8()?
        }
    };

    let tag = MessageTag::try_from(tag_byte)?;

    let mut len_bytes = [0u8; 4];
    r.read_exact(&mut len_bytes)?;
    let msg_len = crate::byte_helpers::u32_be_decode(len_bytes);

    let mut payload = vec![0u8; msg_len as usize];
    r.read_exact(&mut payload)?;

    Message::parse_payload(tag, variant, &payload)
}

/// Reads the single leading byte of a frame, distinguishing a clean
/// peer-closed connection (a zero-byte read right at the frame boundary)
/// from any other I/O failure (§4.5).
fn read_leading_byte<R: Read>(r: &mut R) -> Result<u8, Error> {
    let mut buf = [0u8; 1];
    match r.read(&mut buf) {
        Ok(0) => Err(Error::Connection("peer closed the connection".into())),
        Ok(_) => Ok(buf[0]),
        Err(e) => Err(Error::from(e)),
    }
}
