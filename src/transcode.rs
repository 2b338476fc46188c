//! Conversion of event `extra` values into JSON with valid UTF-8 text.

use crate::event::FieldValue;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Recursively convert a [`FieldValue`] into a JSON value.
///
/// Byte strings are decoded as UTF-8 with invalid sequences replaced by
/// U+FFFD. Non-finite floats become `null`. Never fails.
pub fn utfize(value: FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(b) => Value::Bool(b),
        FieldValue::Int(i) => Value::from(i),
        FieldValue::UInt(u) => Value::from(u),
        FieldValue::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Str(s) => Value::String(s),
        FieldValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        FieldValue::List(items) => Value::Array(items.into_iter().map(utfize).collect()),
        FieldValue::Map(map) => Value::Object(utfize_map(map)),
    }
}

pub fn utfize_map(map: BTreeMap<String, FieldValue>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (k, utfize(v))).collect()
}
