use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// A video's metadata: schema fields first, then any pass-through keys.
pub type Metadata = IndexMap<String, FieldValue>;

/// One metadata value as read from (or written to) a sidecar.
///
/// Scalars that the schema cares about get their own variants; mappings and
/// sequences (event tags, ROI lists) are `Nested`; everything else (booleans,
/// floats, nulls, tagged values) is carried verbatim as `Raw` so it survives a
/// read/write cycle untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Nested(Value),
    Raw(Value),
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn empty_text() -> Self {
        FieldValue::Text(String::new())
    }

    pub fn empty_mapping() -> Self {
        FieldValue::Nested(Value::Mapping(Mapping::new()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Event-tag style mapping, if this value is one.
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            FieldValue::Nested(Value::Mapping(mapping)) => Some(mapping),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Raw(Value::Null))
    }

    /// Short label used in type-mismatch reports.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Nested(Value::Sequence(_)) => "sequence",
            FieldValue::Nested(_) => "mapping",
            FieldValue::Raw(Value::Bool(_)) => "boolean",
            FieldValue::Raw(Value::Number(_)) => "number",
            FieldValue::Raw(Value::Null) => "null",
            FieldValue::Raw(Value::Tagged(_)) => "tagged value",
            FieldValue::Raw(_) => "value",
        }
    }

    /// Text rendering of a scalar, used when a string-typed field holds a
    /// number or boolean.
    pub(crate) fn scalar_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(text) => Some(text.clone()),
            FieldValue::Integer(value) => Some(value.to_string()),
            FieldValue::Raw(Value::Number(number)) => Some(number.to_string()),
            FieldValue::Raw(Value::Bool(flag)) => Some(flag.to_string()),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => FieldValue::Text(text),
            Value::Number(number) => match number.as_i64() {
                Some(int) => FieldValue::Integer(int),
                None => FieldValue::Raw(Value::Number(number)),
            },
            nested @ (Value::Mapping(_) | Value::Sequence(_)) => FieldValue::Nested(nested),
            other => FieldValue::Raw(other),
        }
    }
}

impl From<FieldValue> for Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Text(text) => Value::String(text),
            FieldValue::Integer(int) => Value::Number(int.into()),
            FieldValue::Nested(inner) | FieldValue::Raw(inner) => inner,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Nested(inner) | FieldValue::Raw(inner) => {
                let rendered = serde_yaml::to_string(inner).map_err(|_| fmt::Error)?;
                f.write_str(rendered.trim_end())
            }
        }
    }
}
