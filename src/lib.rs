//! A client for RexPro, the binary wire protocol Rexster graph-database
//! gateways use to accept Gremlin scripts over a plain TCP socket.
//!
//! This crate owns three things: the framing codec for RexPro's two
//! envelope generations ([`frame`]), the typed message catalogue carried
//! inside that envelope ([`message`], re-exported at the crate root), and
//! the session/transaction state machine layered on top
//! ([`Connection`], [`Pool`]).
//!
//! ```no_run
//! use rexpro::{Connection, ProtocolVariant};
//!
//! # fn main() -> Result<(), rexpro::Error> {
//! let mut conn = Connection::open("127.0.0.1", 8184, "graph", "", "", ProtocolVariant::V1)?;
//! let result = conn.execute("values", Default::default(), true, true, false)?;
//! println!("{result:?}");
//! conn.close();
//! # Ok(())
//! # }
//! ```
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unused_crate_dependencies,
    unreachable_pub,
    missing_docs
)]

mod errors;
pub use errors::{Error, ErrorFlag};

mod byte_helpers;

mod msgpack;
pub use msgpack::Value;

mod params;
pub use params::ParamMap;

mod message;
pub use message::{ErrorResponse, Message, ScriptRequest, ScriptResponse, SessionRequest, SessionResponse};

mod frame;
pub use frame::ProtocolVariant;

mod transport;
pub use transport::{DuplexStream, Transport};

mod connection;
pub use connection::{Connection, TransactionGuard};

mod pool;
pub use pool::Pool;

// Exercised only by `src/connection.rs`'s test module, to enable log output
// while debugging a failing test; unused outside `cfg(test)`.
#[cfg(test)]
use tracing_subscriber as _;
