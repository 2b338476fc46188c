use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Numeric priorities understood by the logging façade, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warn = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl Priority {
    /// Short name carried in [`LogEvent::priority_name`].
    pub fn name(self) -> &'static str {
        match self {
            Priority::Emerg => "EMERG",
            Priority::Alert => "ALERT",
            Priority::Crit => "CRIT",
            Priority::Err => "ERR",
            Priority::Warn => "WARN",
            Priority::Notice => "NOTICE",
            Priority::Info => "INFO",
            Priority::Debug => "DEBUG",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "EMERG" => Some(Priority::Emerg),
            "ALERT" => Some(Priority::Alert),
            "CRIT" => Some(Priority::Crit),
            "ERR" => Some(Priority::Err),
            "WARN" => Some(Priority::Warn),
            "NOTICE" => Some(Priority::Notice),
            "INFO" => Some(Priority::Info),
            "DEBUG" => Some(Priority::Debug),
            _ => None,
        }
    }
}

/// Value stored in [`LogEvent::extra`].
///
/// Mirrors the JSON data model with one addition: [`FieldValue::Bytes`]
/// carries raw bytes that are not guaranteed to be valid UTF-8. Writers
/// repair those when they transcode the event (see [`crate::transcode`]).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::UInt(value as u64)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::List(value)
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldValue {
    fn from(value: BTreeMap<String, FieldValue>) -> Self {
        FieldValue::Map(value)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => FieldValue::Str(s),
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// A structured log event as produced by the logging façade.
///
/// `priority_name` is usually one of the [`Priority`] names, but any string
/// is accepted and passed through by writers that do not recognise it.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub priority_name: String,
    pub message: String,
    pub extra: BTreeMap<String, FieldValue>,
}

impl LogEvent {
    pub fn new(priority: Priority, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            priority: priority as u8,
            priority_name: priority.name().to_string(),
            message: message.into(),
            extra: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach one `extra` entry.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
