//! Core data types for the colstore event store
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `Value`: A single typed field value
//! - `ValueKind`: The type tag carried by a column file's extension
//! - `Event`: An ingested record reassembled from the index and column files
//! - `IndexEntry`: One `(id, timestamp)` record of the index log

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Field values of one event, keyed by field name
pub type Fields = BTreeMap<String, Value>;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl Value {
    /// Type tag this value is stored under
    pub fn kind(&self) -> ValueKind {
        ValueKind::of(self)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the two values can be ordered against each other
    pub fn is_comparable_with(&self, other: &Value) -> bool {
        (self.kind().is_numeric() && other.kind().is_numeric()) || self.kind() == other.kind()
    }

    /// Order two values.
    ///
    /// Integers and floats compare numerically with each other, text compares
    /// lexicographically and booleans order `false < true`. Returns `None`
    /// for incomparable kinds and for NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => {
                let (a, b) = (self.as_f64()?, other.as_f64()?);
                a.partial_cmp(&b)
            }
        }
    }
}

/// Column text form: decimal numbers, `true`/`false`, text verbatim
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Type tag of a column file, encoded as its extension
///
/// Variant order matches the lexical order of the extensions, so sorting
/// column keys gives the same order as a sorted directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "string")]
    Text,
}

impl ValueKind {
    /// Infer the type tag for a value. Never fails.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Float(_) => ValueKind::Float,
            Value::Integer(_) => ValueKind::Int,
            Value::Boolean(_) => ValueKind::Bool,
            Value::Text(_) => ValueKind::Text,
        }
    }

    /// File extension for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Float => "float",
            ValueKind::Int => "int",
            ValueKind::Text => "string",
        }
    }

    /// Parse a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "bool" => Some(ValueKind::Bool),
            "float" => Some(ValueKind::Float),
            "int" => Some(ValueKind::Int),
            "string" => Some(ValueKind::Text),
            _ => None,
        }
    }

    /// Whether `avg` can aggregate this kind
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Float)
    }

    /// Convert column text back into a value of this kind
    pub fn decode(&self, text: &str) -> Option<Value> {
        match self {
            ValueKind::Int => text.parse().ok().map(Value::Integer),
            ValueKind::Float => text.parse().ok().map(Value::Float),
            ValueKind::Bool => match text {
                "true" => Some(Value::Boolean(true)),
                "false" => Some(Value::Boolean(false)),
                _ => None,
            },
            ValueKind::Text => Some(Value::Text(text.to_string())),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingested event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned id, starting at 1
    pub id: u64,
    /// Ingestion time in unix seconds
    pub timestamp: i64,
    /// Fields present on this event
    #[serde(default)]
    pub fields: Fields,
}

impl Event {
    pub fn new(id: u64, timestamp: i64) -> Self {
        Self {
            id,
            timestamp,
            fields: Fields::new(),
        }
    }

    /// Builder method: add a field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Get a field value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// One record of the index log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub id: u64,
    pub timestamp: i64,
}

impl IndexEntry {
    pub fn new(id: u64, timestamp: i64) -> Self {
        Self { id, timestamp }
    }

    /// Render as an index row, including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{},{}\n", self.id, self.timestamp)
    }

    /// Parse an index row without its newline
    pub fn parse(line: &str) -> Option<Self> {
        let (id, timestamp) = line.split_once(',')?;
        Some(Self {
            id: id.parse().ok()?,
            timestamp: timestamp.parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let text = value.to_string();
        let decoded = value.kind().decode(&text);
        assert_eq!(decoded, Some(value), "text form was {text:?}");
    }

    #[test]
    fn test_kind_inference() {
        assert_eq!(ValueKind::of(&Value::Float(46.3)), ValueKind::Float);
        assert_eq!(ValueKind::of(&Value::Integer(200)), ValueKind::Int);
        assert_eq!(ValueKind::of(&Value::Boolean(true)), ValueKind::Bool);
        assert_eq!(ValueKind::of(&Value::from("tea pot")), ValueKind::Text);
    }

    #[test]
    fn test_format_parse_roundtrip() {
        roundtrip(Value::Integer(0));
        roundtrip(Value::Integer(-17));
        roundtrip(Value::Integer(i64::MAX));
        roundtrip(Value::Float(0.0));
        roundtrip(Value::Float(46.3));
        roundtrip(Value::Float(-0.125));
        roundtrip(Value::Float(200.0));
        roundtrip(Value::Float(1e-300));
        roundtrip(Value::Boolean(true));
        roundtrip(Value::Boolean(false));
        roundtrip(Value::from(""));
        roundtrip(Value::from("a,b,c"));
    }

    #[test]
    fn test_float_text_form() {
        assert_eq!(Value::Float(200.0).to_string(), "200");
        assert_eq!(Value::Float(46.3).to_string(), "46.3");
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(ValueKind::Int.decode("12.5"), None);
        assert_eq!(ValueKind::Float.decode("abc"), None);
        assert_eq!(ValueKind::Bool.decode("yes"), None);
        assert_eq!(ValueKind::Text.decode("yes"), Some(Value::from("yes")));
    }

    #[test]
    fn test_extension_roundtrip() {
        for kind in [ValueKind::Bool, ValueKind::Float, ValueKind::Int, ValueKind::Text] {
            assert_eq!(ValueKind::from_extension(kind.as_str()), Some(kind));
        }
        assert_eq!(ValueKind::from_extension("keep"), None);
    }

    #[test]
    fn test_kind_order_matches_extension_order() {
        let mut kinds = vec![ValueKind::Text, ValueKind::Int, ValueKind::Float, ValueKind::Bool];
        kinds.sort();
        let names: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Integer(3).compare(&Value::Float(2.5)), Some(Ordering::Greater));
        assert_eq!(Value::Float(2.0).compare(&Value::Integer(2)), Some(Ordering::Equal));
        assert_eq!(Value::from("a").compare(&Value::from("b")), Some(Ordering::Less));
        assert_eq!(Value::Boolean(false).compare(&Value::Boolean(true)), Some(Ordering::Less));
        assert_eq!(Value::from("1").compare(&Value::Integer(1)), None);
        assert_eq!(Value::Float(f64::NAN).compare(&Value::Float(1.0)), None);

        assert!(Value::Integer(1).is_comparable_with(&Value::Float(1.0)));
        assert!(!Value::from("1").is_comparable_with(&Value::Integer(1)));
        assert!(!Value::Boolean(true).is_comparable_with(&Value::Integer(1)));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(1, 200)
            .field("status", 200)
            .field("response_time", 46.3)
            .field("error", "tea pot")
            .field("success", true);

        let json = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_index_entry_line() {
        let entry = IndexEntry::new(2, 210);
        assert_eq!(entry.to_line(), "2,210\n");
        assert_eq!(IndexEntry::parse("2,210"), Some(entry));
        assert_eq!(IndexEntry::parse("2;210"), None);
        assert_eq!(IndexEntry::parse("x,210"), None);
    }
}
