//! Validation for the dynamic parameter map carried by `SCRIPT_REQUEST`.
//!
//! Parameters are a heterogeneous map of primitives, sequences, and nested
//! mappings; this crate reuses [`crate::msgpack::Value`] as that sum type
//! rather than defining a parallel one (see `DESIGN.md`).

use std::collections::BTreeMap;

use crate::errors::Error;
use crate::msgpack::Value;

/// A script parameter map: string keys to arbitrary MessagePack-ish values.
///
/// A `BTreeMap` is used (rather than a `HashMap`) so that parameter
/// serialisation order is deterministic, which keeps wire fixtures in tests
/// reproducible.
pub type ParamMap = BTreeMap<String, Value>;

/// Validates a parameter map against the rules in the message catalogue:
///
/// - keys must not start with an ASCII digit;
/// - keys must not contain whitespace or `.`;
/// - values must be integers, floats, strings, sequences, or mappings.
///
/// Returns [`Error::Usage`] on the first violation found, in key order, and
/// never touches the socket - precondition checks happen before any I/O.
pub(crate) fn validate(params: &ParamMap) -> Result<(), Error> {
    for (key, value) in params {
        validate_key(key)?;
        validate_value(key, value)?;
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<(), Error> {
    if key.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(Error::Usage(format!(
            "parameter name {key:?} can't begin with a number"
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c == '.') {
        return Err(Error::Usage(format!(
            "parameter name {key:?} can't contain whitespace or '.'"
        )));
    }
    Ok(())
}

fn validate_value(key: &str, value: &Value) -> Result<(), Error> {
    match value {
        Value::Integer(_) | Value::F32(_) | Value::F64(_) | Value::String(_) => Ok(()),
        Value::Array(items) => items.iter().try_for_each(|v| validate_value(key, v)),
        Value::Map(entries) => entries.iter().try_for_each(|(_, v)| validate_value(key, v)),
        other => Err(Error::Usage(format!(
            "parameter {key:?} has an unsupported value type: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Value)]) -> ParamMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn accepts_scalar_types() {
        let params = map(&[
            ("age", Value::from(30)),
            ("ratio", Value::F64(1.5)),
            ("name", Value::from("blake")),
        ]);
        assert!(validate(&params).is_ok());
    }

    #[test]
    fn accepts_nested_sequences_and_maps() {
        let params = map(&[
            ("list", Value::Array(vec![Value::from(1), Value::from(2)])),
            (
                "nested",
                Value::Map(vec![(Value::from("a"), Value::from(1))]),
            ),
        ]);
        assert!(validate(&params).is_ok());
    }

    #[test]
    fn rejects_key_starting_with_digit() {
        let params = map(&[("1bad", Value::from(1))]);
        let err = validate(&params).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn rejects_key_with_whitespace() {
        let params = map(&[("bad key", Value::from(1))]);
        assert!(validate(&params).is_err());
    }

    #[test]
    fn rejects_key_with_dot() {
        let params = map(&[("bad.key", Value::from(1))]);
        assert!(validate(&params).is_err());
    }

    #[test]
    fn rejects_unsupported_value_type() {
        let params = map(&[("flag", Value::Boolean(true))]);
        assert!(validate(&params).is_err());
    }

    #[test]
    fn rejects_unsupported_nested_value_type() {
        let params = map(&[("list", Value::Array(vec![Value::Boolean(false)]))]);
        assert!(validate(&params).is_err());
    }

    #[test]
    fn empty_map_is_valid() {
        assert!(validate(&ParamMap::new()).is_ok());
    }
}
