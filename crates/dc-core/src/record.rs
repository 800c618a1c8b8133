use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;

/// Unit of data exchanged with connectors. No schema is enforced here.
pub type Record = HashMap<String, Value>;

/// Convert a JSON value into a record. Only JSON objects qualify.
pub fn record_from_value(value: Value) -> Result<Record> {
    match value {
        Value::Object(map) => Ok(map.into_iter().collect()),
        other => Err(Error::Operation(format!(
            "expected a JSON object, got {}",
            value_kind(&other)
        ))),
    }
}

/// Convert a record back into a JSON object value.
pub fn record_to_value(record: &Record) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
