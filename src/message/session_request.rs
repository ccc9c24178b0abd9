//! `SESSION_REQUEST` - opens, or kills, a server-side session.

use crate::errors::Error;
use crate::frame::ProtocolVariant;
use crate::msgpack::Value;

use super::common;

/// The RexPro "msgpack" console channel. V0's `SESSION_REQUEST` tail
/// carries a `channel` integer ahead of the username/password pair; this
/// crate only ever requests `2` (msgpack), never `1` (the plain-text
/// console channel, which this client has no representation for).
const CHANNEL_MSGPACK: i64 = 2;

/// A `SESSION_REQUEST`: opens a new session, or - with `kill_session` set -
/// tears down an existing one.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub(crate) session_id: [u8; 16],
    pub(crate) request_id: [u8; 16],
    /// The username to authenticate with (may be empty).
    pub username: String,
    /// The password to authenticate with (may be empty).
    pub password: String,
    /// The graph to bind, if set (V1 only - carried in `meta_map`).
    pub graph_name: Option<String>,
    /// The variable name to bind the graph object to.
    pub graph_obj_name: Option<String>,
    /// Whether this request kills the referenced session rather than
    /// opening a new one.
    pub kill_session: bool,
}

impl SessionRequest {
    /// Builds a request to open a new session, generating a fresh
    /// client-proposed session id (random v4 UUID).
    pub fn open(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            session_id: common::new_session_id(),
            request_id: common::new_request_id(),
            username: username.into(),
            password: password.into(),
            graph_name: None,
            graph_obj_name: None,
            kill_session: false,
        }
    }

    /// Builds a request to kill an existing session.
    pub fn kill(session_id: [u8; 16]) -> Self {
        Self {
            session_id,
            request_id: common::new_request_id(),
            username: String::new(),
            password: String::new(),
            graph_name: None,
            graph_obj_name: None,
            kill_session: true,
        }
    }

    /// Binds the named graph (and, optionally, the variable name it's bound
    /// to) to this request. Only meaningful on V1; silently ignored on V0,
    /// where graph binding is a script the connection issues separately.
    pub fn with_graph(mut self, graph_name: impl Into<String>, graph_obj_name: Option<String>) -> Self {
        self.graph_name = Some(graph_name.into());
        self.graph_obj_name = graph_obj_name;
        self
    }

    fn meta(&self) -> Vec<(Value, Value)> {
        if self.kill_session {
            return vec![(Value::from("killSession"), Value::from(true))];
        }

        let mut meta = Vec::new();
        if let Some(graph_name) = &self.graph_name {
            meta.push((Value::from("graphName"), Value::from(graph_name.as_str())));
            if let Some(graph_obj_name) = &self.graph_obj_name {
                meta.push((Value::from("graphObjName"), Value::from(graph_obj_name.as_str())));
            }
        }
        meta
    }

    pub(crate) fn serialize_payload(&self, variant: ProtocolVariant) -> Result<Vec<u8>, Error> {
        let mut items = common::build_head(variant, self.session_id, self.request_id, self.meta());

        if variant == ProtocolVariant::V0 {
            items.push(Value::from(CHANNEL_MSGPACK));
        }
        items.push(Value::from(self.username.as_str()));
        items.push(Value::from(self.password.as_str()));

        crate::msgpack::encode(&Value::Array(items))
    }

    pub(crate) fn parse_payload(variant: ProtocolVariant, bytes: &[u8]) -> Result<Self, Error> {
        let items = crate::msgpack::decode_array(bytes)?;
        let head = common::parse_head(variant, items)?;
        let mut tail = head.tail;

        if variant == ProtocolVariant::V0 {
            let _channel = common::next(&mut tail)?;
        }

        let username = common::as_string(common::next(&mut tail)?)?;
        let password = common::as_string(common::next(&mut tail)?)?;

        Ok(Self {
            session_id: head.session,
            request_id: head.request,
            username,
            password,
            graph_name: common::meta_str(&head.meta, "graphName"),
            graph_obj_name: common::meta_str(&head.meta, "graphObjName"),
            kill_session: common::meta_bool(&head.meta, "killSession", false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_round_trips_v1() {
        let req = SessionRequest::open("alice", "hunter2");
        let bytes = req.serialize_payload(ProtocolVariant::V1).unwrap();
        let got = SessionRequest::parse_payload(ProtocolVariant::V1, &bytes).unwrap();

        assert_eq!(got.username, "alice");
        assert_eq!(got.password, "hunter2");
        assert_eq!(got.session_id, req.session_id);
        assert!(!got.kill_session);
    }

    #[test]
    fn open_round_trips_v0() {
        let req = SessionRequest::open("bob", "");
        let bytes = req.serialize_payload(ProtocolVariant::V0).unwrap();
        let got = SessionRequest::parse_payload(ProtocolVariant::V0, &bytes).unwrap();

        assert_eq!(got.username, "bob");
        assert_eq!(got.password, "");
    }

    #[test]
    fn graph_binding_round_trips_as_meta() {
        let req = SessionRequest::open("alice", "pw").with_graph("tinkergraph", Some("g2".into()));
        let bytes = req.serialize_payload(ProtocolVariant::V1).unwrap();
        let got = SessionRequest::parse_payload(ProtocolVariant::V1, &bytes).unwrap();

        assert_eq!(got.graph_name.as_deref(), Some("tinkergraph"));
        assert_eq!(got.graph_obj_name.as_deref(), Some("g2"));
    }

    #[test]
    fn kill_session_round_trips() {
        let key = common::new_session_id();
        let req = SessionRequest::kill(key);
        let bytes = req.serialize_payload(ProtocolVariant::V1).unwrap();
        let got = SessionRequest::parse_payload(ProtocolVariant::V1, &bytes).unwrap();

        assert!(got.kill_session);
        assert_eq!(got.session_id, key);
    }
}
