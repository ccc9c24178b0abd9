//! `SCRIPT_REQUEST` - executes a Gremlin script, optionally parameterised,
//! isolated, and/or transaction-wrapped.

use md5::{Digest, Md5};

use crate::errors::Error;
use crate::frame::ProtocolVariant;
use crate::msgpack::{Value, ValueExt};
use crate::params::{self, ParamMap};

use super::common;

/// A `SCRIPT_REQUEST`.
///
/// `isolate`, `transaction`, `in_session`, and the graph-binding fields
/// surface only via V1's `meta_map` (§4.3); on V0 `isolate` instead drives
/// [`isolate_rewrite`] on the script text itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRequest {
    pub(crate) session_id: [u8; 16],
    pub(crate) request_id: [u8; 16],
    /// The Gremlin (or other supported language) script text.
    pub script: String,
    /// Parameter bindings for the script.
    pub params: ParamMap,
    /// The scripting language, e.g. `"groovy"`.
    pub language: String,
    /// Whether the server should resolve `session_uuid` for this request.
    pub in_session: bool,
    /// Whether top-level bindings should be isolated from subsequent
    /// requests.
    pub isolate: bool,
    /// Whether the script is wrapped in an implicit transaction
    /// commit/rollback.
    pub transaction: bool,
    /// The graph to bind, if set.
    pub graph_name: Option<String>,
    /// The variable name to bind the graph object to.
    pub graph_obj_name: Option<String>,
}

impl ScriptRequest {
    /// Builds a script request bound to `session_id`, with the protocol
    /// defaults from §4.3: groovy, not `in_session`, isolated, and
    /// transaction-wrapped.
    pub fn new(session_id: [u8; 16], script: impl Into<String>) -> Self {
        Self {
            session_id,
            request_id: common::new_request_id(),
            script: script.into(),
            params: ParamMap::new(),
            language: "groovy".to_string(),
            in_session: false,
            isolate: true,
            transaction: true,
            graph_name: None,
            graph_obj_name: None,
        }
    }

    /// Sets the parameter bindings for this request.
    pub fn with_params(mut self, params: ParamMap) -> Self {
        self.params = params;
        self
    }

    /// Sets whether the server should resolve `session_uuid` for this
    /// request.
    pub fn in_session(mut self, v: bool) -> Self {
        self.in_session = v;
        self
    }

    /// Sets whether top-level bindings are isolated from later requests.
    pub fn isolate(mut self, v: bool) -> Self {
        self.isolate = v;
        self
    }

    /// Sets whether the script runs inside an implicit transaction.
    pub fn transaction(mut self, v: bool) -> Self {
        self.transaction = v;
        self
    }

    /// Binds the named graph (and, optionally, the variable it's bound to)
    /// to this request.
    pub fn with_graph(mut self, graph_name: impl Into<String>, graph_obj_name: Option<String>) -> Self {
        self.graph_name = Some(graph_name.into());
        self.graph_obj_name = graph_obj_name;
        self
    }

    fn meta(&self) -> Vec<(Value, Value)> {
        let mut meta = Vec::new();

        if let Some(graph_name) = &self.graph_name {
            meta.push((Value::from("graphName"), Value::from(graph_name.as_str())));
            if let Some(graph_obj_name) = &self.graph_obj_name {
                meta.push((Value::from("graphObjName"), Value::from(graph_obj_name.as_str())));
            }
        }
        // Defaults to false.
        if self.in_session {
            meta.push((Value::from("inSession"), Value::from(true)));
        }
        // Defaults to true.
        if !self.isolate {
            meta.push((Value::from("isolate"), Value::from(false)));
        }
        // Defaults to true.
        if !self.transaction {
            meta.push((Value::from("transaction"), Value::from(false)));
        }

        meta
    }

    /// The script text actually placed on the wire: for V0 with `isolate`
    /// set, rewritten into a stably-named closure (§4.3) since V0 has no
    /// `isolate` meta flag for the server to honour; unchanged otherwise.
    fn wire_script(&self, variant: ProtocolVariant) -> String {
        if variant == ProtocolVariant::V0 && self.isolate {
            isolate_rewrite(&self.script)
        } else {
            self.script.clone()
        }
    }

    pub(crate) fn serialize_payload(&self, variant: ProtocolVariant) -> Result<Vec<u8>, Error> {
        params::validate(&self.params)?;

        let mut items = common::build_head(variant, self.session_id, self.request_id, self.meta());

        items.push(Value::from(self.language.as_str()));
        items.push(Value::Binary(self.wire_script(variant).into_bytes()));

        let params_value = params_to_value(&self.params);
        match variant {
            ProtocolVariant::V0 => items.push(Value::Binary(crate::msgpack::encode(&params_value)?)),
            ProtocolVariant::V1 => items.push(params_value),
        }

        crate::msgpack::encode(&Value::Array(items))
    }

    pub(crate) fn parse_payload(variant: ProtocolVariant, bytes: &[u8]) -> Result<Self, Error> {
        let items = crate::msgpack::decode_array(bytes)?;
        let head = common::parse_head(variant, items)?;
        let mut tail = head.tail;

        let language = common::as_string(common::next(&mut tail)?)?;
        let script = common::as_string(common::next(&mut tail)?)?;

        let params_value = common::next(&mut tail)?;
        let params_value = match variant {
            ProtocolVariant::V0 => {
                let blob = params_value
                    .as_bytes_loose()
                    .ok_or_else(|| Error::MalformedPayload("expected a msgpack blob for V0 params".into()))?;
                crate::msgpack::decode(blob)?
            }
            ProtocolVariant::V1 => params_value,
        };
        let params = value_to_params(params_value)?;

        Ok(Self {
            session_id: head.session,
            request_id: head.request,
            script,
            params,
            language,
            in_session: common::meta_bool(&head.meta, "inSession", false),
            isolate: common::meta_bool(&head.meta, "isolate", true),
            transaction: common::meta_bool(&head.meta, "transaction", true),
            graph_name: common::meta_str(&head.meta, "graphName"),
            graph_obj_name: common::meta_str(&head.meta, "graphObjName"),
        })
    }
}

fn params_to_value(params: &ParamMap) -> Value {
    Value::Map(params.iter().map(|(k, v)| (Value::from(k.as_str()), v.clone())).collect())
}

fn value_to_params(v: Value) -> Result<ParamMap, Error> {
    match v {
        Value::Map(entries) => entries
            .into_iter()
            .map(|(k, v)| common::as_string(k).map(|k| (k, v)))
            .collect(),
        other => Err(Error::MalformedPayload(format!("expected a params map, got {other:?}"))),
    }
}

/// Rewrites `script` into `def q_<md5hex> = { <script> }\n q_<md5hex>()`.
///
/// The identifier is stable across identical scripts (it's the script's own
/// MD5 digest), so a server too old to understand the V1 `isolate` meta
/// flag still sees each request as an isolated closure invocation (§4.3,
/// (S4)).
fn isolate_rewrite(script: &str) -> String {
    let digest = Md5::digest(script.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("def q_{hex} = {{ {script} }}\n q_{hex}()")
}
