use thiserror::Error;

/// The server-side error classification carried by a V1 `ERROR` response's
/// `meta_map.flag` field.
///
/// Mirrors the V0/V1 error-flag enumeration RexPro servers report, with an
/// `Unknown` catch-all for any code outside that taxonomy.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorFlag {
    /// The request itself was malformed.
    InvalidMessage,
    /// The session referenced by the request does not exist (or has expired).
    ///
    /// A [`Error::Script`] carrying this flag forces the caller to discard the
    /// owning [`crate::Connection`] - see [`Error::is_fatal`].
    InvalidSession,
    /// The Gremlin script itself failed to execute.
    ScriptFailure,
    /// The supplied username/password were rejected.
    AuthFailure,
    /// The named graph does not exist or is misconfigured.
    GraphConfig,
    /// The requested channel is not supported by this server.
    ChannelConfig,
    /// The server could not serialise the result into MessagePack.
    ResultSerialization,
    /// A flag value outside the known taxonomy; the raw code is preserved.
    Unknown(u32),
}

impl From<u32> for ErrorFlag {
    fn from(v: u32) -> Self {
        match v {
            0 => Self::InvalidMessage,
            1 => Self::InvalidSession,
            2 => Self::ScriptFailure,
            3 => Self::AuthFailure,
            4 => Self::GraphConfig,
            5 => Self::ChannelConfig,
            6 => Self::ResultSerialization,
            v => Self::Unknown(v),
        }
    }
}

/// Error types returned by this crate.
///
/// These correspond to the three error kinds in the RexPro client design: a
/// transport-level [`Error::Connection`], a server-signalled
/// [`Error::Script`], and a local precondition failure in [`Error::Usage`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The transport closed unexpectedly, an envelope was malformed, or a
    /// server `ERROR` response was received during session setup or graph
    /// binding.
    ///
    /// Always terminal for the owning [`crate::Connection`].
    #[error("rexpro connection error: {0}")]
    Connection(String),

    /// The server responded with an `ERROR` to a `SCRIPT_REQUEST`.
    ///
    /// Carries the server's message and, for V1 connections, the
    /// [`ErrorFlag`] taxonomy. Leaves the connection usable unless
    /// `flag` is [`ErrorFlag::InvalidSession`].
    #[error("rexpro script error: {message}")]
    Script {
        /// The server-supplied error message.
        message: String,
        /// The V1 error classification, if the connection is bound to V1.
        flag: Option<ErrorFlag>,
    },

    /// A local precondition failed before any wire traffic was sent: an
    /// already-open transaction was reopened, a closed transaction was
    /// closed again, or a script parameter had an invalid key or value type.
    ///
    /// Never touches the socket; the connection remains fully usable.
    #[error("rexpro usage error: {0}")]
    Usage(String),

    /// The frame header declared a `proto_ver` other than `1` (V1 envelopes
    /// only).
    #[error("unsupported rexpro protocol version byte {0}")]
    UnsupportedProtocolVersion(u8),

    /// The frame header declared a `serializer` other than `0` (V1 envelopes
    /// only).
    #[error("unsupported rexpro serializer byte {0}")]
    UnsupportedSerializer(u8),

    /// The frame header named a message type tag this crate does not know
    /// how to parse.
    #[error("unknown rexpro message type {0}")]
    UnknownMessageType(u8),

    /// A MessagePack value could not be decoded, or had an unexpected shape
    /// for the message being parsed.
    #[error("malformed msgpack payload: {0}")]
    MalformedPayload(String),

    /// An I/O error occurred while reading or writing a frame.
    #[error("i/o error ({0:?}): {1}")]
    Io(std::io::ErrorKind, String),
}

impl Error {
    /// Returns `true` if this error means the owning [`crate::Connection`]
    /// must be discarded rather than reused.
    ///
    /// [`Error::Connection`] is always fatal. [`Error::Script`] is fatal only
    /// when it carries [`ErrorFlag::InvalidSession`]. [`Error::Usage`] is
    /// never fatal, since it is raised before any I/O takes place. The
    /// remaining framing-level variants are all transport-terminal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Script { flag, .. } => matches!(flag, Some(ErrorFlag::InvalidSession)),
            Self::Usage(_) => false,
            Self::UnsupportedProtocolVersion(_)
            | Self::UnsupportedSerializer(_)
            | Self::UnknownMessageType(_)
            | Self::Io(_, _) => true,
            Self::MalformedPayload(_) => true,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::Io(v.kind(), v.to_string())
    }
}
