//! C6: the session- and transaction-bearing connection state machine.
//!
//! `close_transaction`'s precondition is `if !in_transaction` (rejecting a
//! close when nothing is open), and a successful `close_transaction` clears
//! `in_transaction` so the state machine always reflects which transaction,
//! if any, is currently open.

use std::net::TcpStream;
use std::ops::{Deref, DerefMut};

use crate::errors::Error;
use crate::frame::{self, ProtocolVariant};
use crate::message::{Message, ScriptRequest, SessionRequest};
use crate::msgpack::Value;
use crate::params::ParamMap;
use crate::transport::Transport;

/// A live RexPro session bound to a single [`Transport`].
///
/// Not `Sync`; a `Connection` is meant to be driven by one thread at a time
/// (§5). Defaults to [`TcpStream`] so most callers never need to name the
/// type parameter; tests substitute [`crate::transport::DuplexStream`].
#[derive(Debug)]
pub struct Connection<T: Transport = TcpStream> {
    transport: Option<T>,
    variant: ProtocolVariant,
    session_key: [u8; 16],
    graph_name: String,
    in_transaction: bool,
    graph_features: Value,
}

/// The pieces of a successful `SCRIPT_RESPONSE` `execute_raw` needs to hand
/// back up to its two callers (`execute` and `execute_setup`).
struct ScriptOutcome {
    results: Value,
    #[allow(dead_code)]
    bindings: Value,
}

impl Connection<TcpStream> {
    /// Dials `host:port` and opens a session bound to `graph_name`,
    /// authenticating with `username`/`password`.
    ///
    /// `variant` fixes the envelope flavour for the lifetime of the
    /// connection; servers never auto-negotiate it (§9).
    pub fn open(
        host: &str,
        port: u16,
        graph_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        variant: ProtocolVariant,
    ) -> Result<Self, Error> {
        tracing::debug!(host, port, ?variant, "dialing rexpro server");
        let transport = TcpStream::connect((host, port))?;
        Self::open_on(transport, graph_name, username, password, variant)
    }
}

impl<T: Transport> Connection<T> {
    /// As [`Connection::open`], but against an already-established
    /// transport. The generic entry point, used directly by tests against
    /// [`crate::transport::DuplexStream`].
    pub fn open_on(
        mut transport: T,
        graph_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        variant: ProtocolVariant,
    ) -> Result<Self, Error> {
        let graph_name = graph_name.into();

        let mut session_req = SessionRequest::open(username, password);
        if variant == ProtocolVariant::V1 {
            session_req = session_req.with_graph(graph_name.clone(), None);
        }

        frame::write_frame(&mut transport, variant, &Message::SessionRequest(session_req))?;
        let session_key = match frame::read_frame(&mut transport, variant)? {
            Message::SessionResponse(resp) => resp.session_key,
            Message::Error(e) => return Err(Error::Connection(e.message)),
            other => return Err(Error::Connection(format!("unexpected reply to SESSION_REQUEST: {other:?}"))),
        };
        tracing::debug!(?variant, "rexpro session opened");

        let mut conn = Self {
            transport: Some(transport),
            variant,
            session_key,
            graph_name: graph_name.clone(),
            in_transaction: false,
            graph_features: Value::Nil,
        };

        if variant == ProtocolVariant::V0 {
            let mut params = ParamMap::new();
            params.insert("graphname".to_string(), Value::from(graph_name.as_str()));
            let req = ScriptRequest::new(conn.session_key, "g = rexster.getGraph(graphname)")
                .with_params(params)
                .in_session(true)
                .isolate(false);
            conn.execute_setup(req)?;
        }

        let features_req = ScriptRequest::new(conn.session_key, "g.getFeatures().toMap()")
            .in_session(true)
            .isolate(false);
        conn.graph_features = conn.execute_setup(features_req)?;

        Ok(conn)
    }

    fn transport(&mut self) -> Result<&mut T, Error> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Connection("connection is closed".into()))
    }

    fn send(&mut self, msg: &Message) -> Result<(), Error> {
        let variant = self.variant;
        frame::write_frame(self.transport()?, variant, msg)
    }

    fn receive(&mut self) -> Result<Message, Error> {
        let variant = self.variant;
        frame::read_frame(self.transport()?, variant)
    }

    /// Drops the transport without sending anything further; used both by
    /// [`Connection::close`] and whenever a fatal error leaves the socket in
    /// an unknown state.
    fn discard(&mut self) {
        self.transport = None;
    }

    /// Sends a `SCRIPT_REQUEST` and interprets the reply as either a result
    /// pair or a server [`Error::Script`]. Discards the connection whenever
    /// the failure is transport-level or the script error is fatal
    /// ([`Error::is_fatal`]).
    fn execute_raw(&mut self, req: ScriptRequest) -> Result<ScriptOutcome, Error> {
        let reply = self.send(&Message::ScriptRequest(req)).and_then(|_| self.receive());

        match reply {
            Ok(Message::ScriptResponse(r)) => Ok(ScriptOutcome {
                results: r.results,
                bindings: r.bindings,
            }),
            Ok(Message::Error(e)) => {
                let err = Error::Script {
                    message: e.message,
                    flag: e.flag,
                };
                if err.is_fatal() {
                    tracing::warn!(error = %err, "discarding rexpro connection after fatal script error");
                    self.discard();
                }
                Err(err)
            }
            Ok(other) => {
                self.discard();
                Err(Error::Connection(format!("unexpected reply to SCRIPT_REQUEST: {other:?}")))
            }
            Err(e) => {
                if e.is_fatal() {
                    self.discard();
                }
                Err(e)
            }
        }
    }

    /// Like [`Connection::execute_raw`], but for scripts run during
    /// [`Connection::open_on`] itself (graph binding, the features query):
    /// any server `ERROR` here is a session-setup failure, so it's reported
    /// as [`Error::Connection`] rather than [`Error::Script`] (§7 item 1).
    fn execute_setup(&mut self, req: ScriptRequest) -> Result<Value, Error> {
        match self.execute_raw(req) {
            Ok(outcome) => Ok(outcome.results),
            Err(Error::Script { message, .. }) => Err(Error::Connection(message)),
            Err(e) => Err(e),
        }
    }

    /// Executes `script`, bound to this connection's session, with `params`.
    ///
    /// `isolate` and `transaction` control the server-side wrapping
    /// described in §4.3 (on a V0 connection `isolate` instead drives the
    /// client-side closure rewrite in [`crate::message::ScriptRequest`]).
    /// When `pretty` is set, `script` is first run through [`dedent`].
    pub fn execute(
        &mut self,
        script: &str,
        params: ParamMap,
        isolate: bool,
        transaction: bool,
        pretty: bool,
    ) -> Result<Value, Error> {
        let script = if pretty { dedent(script) } else { script.to_string() };

        let req = ScriptRequest::new(self.session_key, script)
            .with_params(params)
            .in_session(true)
            .isolate(isolate)
            .transaction(transaction);

        self.execute_raw(req).map(|o| o.results)
    }

    /// Opens a transaction. Fails with [`Error::Usage`] - no wire traffic -
    /// if one is already open.
    pub fn open_transaction(&mut self) -> Result<(), Error> {
        if self.in_transaction {
            return Err(Error::Usage("transaction is already open".into()));
        }

        let req = ScriptRequest::new(self.session_key, "g.stopTransaction(FAILURE)")
            .in_session(true)
            .isolate(false)
            .transaction(false);
        self.execute_raw(req)?;
        self.in_transaction = true;
        Ok(())
    }

    /// Closes the open transaction, committing on `success` and rolling back
    /// otherwise. Fails with [`Error::Usage`] if none is open.
    pub fn close_transaction(&mut self, success: bool) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(Error::Usage("transaction is not open".into()));
        }

        let script = format!("g.stopTransaction({})", if success { "SUCCESS" } else { "FAILURE" });
        let req = ScriptRequest::new(self.session_key, script)
            .in_session(true)
            .isolate(false)
            .transaction(false);
        self.execute_raw(req)?;
        self.in_transaction = false;
        Ok(())
    }

    /// Opens a transaction and returns a guard that closes it on every exit
    /// path, including an early return or panic inside the caller's block
    /// (see [`TransactionGuard`]).
    pub fn transaction(&mut self) -> Result<TransactionGuard<'_, T>, Error> {
        self.open_transaction()?;
        Ok(TransactionGuard {
            conn: self,
            closed: false,
        })
    }

    /// Releases the transport. Safe to call more than once.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            tracing::debug!("closing rexpro connection");
        }
    }

    /// The decoded `g.getFeatures().toMap()` value captured while opening
    /// this connection.
    pub fn graph_features(&self) -> &Value {
        &self.graph_features
    }

    pub(crate) fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Builds a connection directly from its parts, skipping the handshake
    /// in [`Connection::open_on`]. Used by [`crate::pool`]'s tests, which
    /// need idle connections without a live server to dial.
    #[cfg(test)]
    pub(crate) fn for_testing(transport: T, variant: ProtocolVariant, session_key: [u8; 16]) -> Self {
        Self {
            transport: Some(transport),
            variant,
            session_key,
            graph_name: String::new(),
            in_transaction: false,
            graph_features: Value::Nil,
        }
    }
}

/// A scoped transaction, opened by [`Connection::transaction`].
///
/// `Deref`s to the underlying [`Connection`] so callers can keep issuing
/// `execute` calls through the guard. Dropping it without calling
/// [`TransactionGuard::commit`] or [`TransactionGuard::rollback`] commits the
/// transaction, so a panic or early return inside the guarded block still
/// closes the transaction rather than leaving it open.
#[derive(Debug)]
pub struct TransactionGuard<'a, T: Transport = TcpStream> {
    conn: &'a mut Connection<T>,
    closed: bool,
}

impl<T: Transport> TransactionGuard<'_, T> {
    /// Commits the transaction.
    pub fn commit(mut self) -> Result<(), Error> {
        self.closed = true;
        self.conn.close_transaction(true)
    }

    /// Rolls the transaction back.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.closed = true;
        self.conn.close_transaction(false)
    }
}

impl<T: Transport> Deref for TransactionGuard<'_, T> {
    type Target = Connection<T>;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl<T: Transport> DerefMut for TransactionGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
    }
}

impl<T: Transport> Drop for TransactionGuard<'_, T> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.conn.close_transaction(true) {
                tracing::warn!(error = %e, "failed to close transaction while dropping guard");
            }
        }
    }
}

/// Strips the common leading whitespace shared by every non-blank line of
/// `script`, mirroring Python's `textwrap.dedent` (§4.6), so a Gremlin
/// script written as an indented Rust string literal reads naturally over
/// the wire.
fn dedent(script: &str) -> String {
    let indent = script
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    script
        .lines()
        .map(|line| {
            if line.len() >= indent {
                &line[indent..]
            } else {
                line.trim_start()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorFlag;
    use crate::frame::MessageTag;
    use crate::transport::DuplexStream;

    fn head(variant: ProtocolVariant, session: [u8; 16]) -> Vec<Value> {
        let request = [9u8; 16];
        match variant {
            ProtocolVariant::V0 => vec![
                Value::from(1),
                Value::from(0),
                Value::Binary(session.to_vec()),
                Value::Binary(request.to_vec()),
            ],
            ProtocolVariant::V1 => vec![
                Value::Binary(session.to_vec()),
                Value::Binary(request.to_vec()),
                Value::Map(Vec::new()),
            ],
        }
    }

    fn encode_frame(variant: ProtocolVariant, tag: MessageTag, payload: Vec<Value>) -> Vec<u8> {
        let body = crate::msgpack::encode(&Value::Array(payload)).unwrap();
        let mut buf = Vec::new();
        match variant {
            ProtocolVariant::V0 => buf.push(tag.as_u8()),
            ProtocolVariant::V1 => {
                buf.push(1);
                buf.push(0);
                buf.extend_from_slice(&[0, 0, 0, 0]);
                buf.push(tag.as_u8());
            }
        }
        buf.extend_from_slice(&crate::byte_helpers::u32_be_encode(body.len() as u32));
        buf.extend_from_slice(&body);
        buf
    }

    fn session_response(variant: ProtocolVariant, session: [u8; 16]) -> Vec<u8> {
        let mut items = head(variant, session);
        items.push(Value::Array(vec![Value::from("groovy")]));
        encode_frame(variant, MessageTag::SessionResponse, items)
    }

    fn script_response(variant: ProtocolVariant, session: [u8; 16], results: Value) -> Vec<u8> {
        let mut items = head(variant, session);
        items.push(results);
        items.push(Value::Nil);
        encode_frame(variant, MessageTag::ScriptResponse, items)
    }

    fn open_session_connection(variant: ProtocolVariant, inbound: Vec<u8>) -> Connection<DuplexStream> {
        Connection {
            transport: Some(DuplexStream::new(inbound)),
            variant,
            session_key: [1u8; 16],
            graph_name: "g".to_string(),
            in_transaction: false,
            graph_features: Value::Nil,
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn open_on_v1_binds_graph_via_meta_and_fetches_features() {
        init_tracing();
        let variant = ProtocolVariant::V1;
        let session_key = [7u8; 16];

        let mut inbound = session_response(variant, session_key);
        let features = Value::Map(vec![(Value::from("supportsTransactions"), Value::from(true))]);
        inbound.extend(script_response(variant, session_key, features.clone()));

        let conn = Connection::open_on(DuplexStream::new(inbound), "graph", "alice", "pw", variant).unwrap();

        assert_eq!(conn.session_key, session_key);
        assert_eq!(conn.graph_features, features);
    }

    #[test]
    fn open_on_v0_binds_graph_via_script_then_fetches_features() {
        let variant = ProtocolVariant::V0;
        let session_key = [8u8; 16];

        let mut inbound = session_response(variant, session_key);
        inbound.extend(script_response(variant, session_key, Value::Nil));
        inbound.extend(script_response(variant, session_key, Value::Map(Vec::new())));

        let conn = Connection::open_on(DuplexStream::new(inbound), "graph", "bob", "", variant).unwrap();
        assert_eq!(conn.graph_features, Value::Map(Vec::new()));
    }

    #[test]
    fn open_on_fails_when_server_rejects_session_request() {
        let variant = ProtocolVariant::V1;
        let mut items = head(variant, [0u8; 16]);
        items.push(Value::from("bad credentials"));
        let inbound = encode_frame(variant, MessageTag::Error, items);

        let err = Connection::open_on(DuplexStream::new(inbound), "graph", "alice", "wrong", variant).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn execute_returns_decoded_results() {
        let variant = ProtocolVariant::V1;
        let inbound = script_response(variant, [1u8; 16], Value::from(1982));
        let mut conn = open_session_connection(variant, inbound);

        let result = conn.execute("values", ParamMap::new(), true, true, false).unwrap();
        assert_eq!(result, Value::from(1982));
    }

    #[test]
    fn execute_script_error_is_not_fatal_and_keeps_connection_open() {
        let variant = ProtocolVariant::V1;
        let mut items = head(variant, [1u8; 16]);
        items.push(Value::from("bad groovy"));
        let inbound = encode_frame(variant, MessageTag::Error, items);

        let mut conn = open_session_connection(variant, inbound);
        let err = conn.execute("oops", ParamMap::new(), true, true, false).unwrap_err();

        assert!(matches!(err, Error::Script { flag: None, .. }));
        assert!(conn.transport.is_some());
    }

    #[test]
    fn execute_invalid_session_error_discards_connection() {
        let variant = ProtocolVariant::V1;
        let meta = vec![(Value::from("flag"), Value::from(1))];
        let items = vec![
            Value::Binary([1u8; 16].to_vec()),
            Value::Binary([9u8; 16].to_vec()),
            Value::Map(meta),
            Value::from("session expired"),
        ];
        let inbound = encode_frame(variant, MessageTag::Error, items);

        let mut conn = open_session_connection(variant, inbound);
        let err = conn.execute("x", ParamMap::new(), true, true, false).unwrap_err();

        assert!(matches!(
            err,
            Error::Script {
                flag: Some(ErrorFlag::InvalidSession),
                ..
            }
        ));
        assert!(conn.transport.is_none());
    }

    #[test]
    fn execute_rejects_invalid_params_without_touching_socket() {
        let variant = ProtocolVariant::V1;
        let mut conn = open_session_connection(variant, Vec::new());

        let mut params = ParamMap::new();
        params.insert("1bad".to_string(), Value::from(1));

        let err = conn.execute("values", params, true, true, false).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert!(conn.transport.as_ref().unwrap().written().is_empty());
    }

    #[test]
    fn open_transaction_twice_is_a_usage_error() {
        let variant = ProtocolVariant::V1;
        let inbound = script_response(variant, [1u8; 16], Value::Nil);
        let mut conn = open_session_connection(variant, inbound);

        conn.open_transaction().unwrap();
        let err = conn.open_transaction().unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn close_transaction_without_one_open_is_a_usage_error() {
        let variant = ProtocolVariant::V1;
        let mut conn = open_session_connection(variant, Vec::new());
        let err = conn.close_transaction(true).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn transaction_guard_closes_on_drop_without_explicit_commit() {
        let variant = ProtocolVariant::V1;
        let mut inbound = script_response(variant, [1u8; 16], Value::Nil);
        inbound.extend(script_response(variant, [1u8; 16], Value::Nil));

        let mut conn = open_session_connection(variant, inbound);
        {
            let _guard = conn.transaction().unwrap();
        }
        assert!(!conn.in_transaction);
    }

    #[test]
    fn transaction_guard_rollback_sends_failure_and_clears_state() {
        let variant = ProtocolVariant::V1;
        let mut inbound = script_response(variant, [1u8; 16], Value::Nil);
        inbound.extend(script_response(variant, [1u8; 16], Value::Nil));

        let mut conn = open_session_connection(variant, inbound);
        let guard = conn.transaction().unwrap();
        guard.rollback().unwrap();
        assert!(!conn.in_transaction);
    }

    #[test]
    fn close_is_idempotent() {
        let variant = ProtocolVariant::V1;
        let mut conn = open_session_connection(variant, Vec::new());
        conn.close();
        conn.close();
        assert!(conn.transport.is_none());
    }

    #[test]
    fn dedent_strips_common_leading_whitespace() {
        let script = "    a = 1\n    b = 2";
        assert_eq!(dedent(script), "a = 1\nb = 2");
    }

    #[test]
    fn dedent_is_a_no_op_without_leading_whitespace() {
        assert_eq!(dedent("a\nb"), "a\nb");
    }
}
