// used for the datetime field type
use chrono::{NaiveDate, NaiveDateTime};
// field types are named in schema descriptors
use serde::{Deserialize, Serialize};
// row values arrive and leave as JSON
use serde_json::Value as Json;

// used when parsing a string to a NaiveDateTime
use std::str::FromStr;
// used to print out readable forms of a value
use std::fmt;

/// Format used when a datetime value is serialized or indexed.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

// ------------- Field Types --------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    Bool,
    DateTime,
}

impl FieldType {
    pub fn data_type(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::DateTime => "datetime",
        }
    }
    /// The value a non-nullable field takes when a row omits it.
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::String => Value::String(String::new()),
            FieldType::Int => Value::Int(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::DateTime => Value::DateTime(NaiveDateTime::default()),
        }
    }
    /// Converts a JSON input to a value of this type, or `None` on a mismatch.
    /// JSON `null` is never converted here; nullability is the caller's call.
    pub fn convert(&self, json: &Json) -> Option<Value> {
        match (self, json) {
            (FieldType::String, Json::String(s)) => Some(Value::String(s.clone())),
            (FieldType::Int, Json::Number(n)) => n.as_i64().map(Value::Int),
            (FieldType::Float, Json::Number(n)) => n.as_f64().map(Value::Float),
            (FieldType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
            (FieldType::DateTime, Json::String(s)) => parse_datetime(s).map(Value::DateTime),
            _ => None,
        }
    }
    /// Accepts a query value for a field of this type, or `None` when the
    /// value is of another type. Integers widen to floats, as on input.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (FieldType::String, v @ Value::String(_)) => Some(v),
            (FieldType::Int, v @ Value::Int(_)) => Some(v),
            (FieldType::Float, v @ Value::Float(_)) => Some(v),
            (FieldType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
            (FieldType::Bool, v @ Value::Bool(_)) => Some(v),
            (FieldType::DateTime, v @ Value::DateTime(_)) => Some(v),
            _ => None,
        }
    }
}
impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.data_type())
    }
}

pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::from_str(s) {
        Ok(datetime) => Some(datetime),
        Err(_) => NaiveDate::from_str(s)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0)),
    }
}

/// Short name of a JSON input's kind, used in type errors.
pub fn describe(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

// ------------- Values --------------
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Value {
    /// Name of the value's type, as used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => FieldType::String.data_type(),
            Value::Int(_) => FieldType::Int.data_type(),
            Value::Float(_) => FieldType::Float.data_type(),
            Value::Bool(_) => FieldType::Bool.data_type(),
            Value::DateTime(_) => FieldType::DateTime.data_type(),
        }
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
    pub fn as_datetime(&self) -> Option<&NaiveDateTime> {
        match self {
            Value::DateTime(d) => Some(d),
            _ => None,
        }
    }
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::String(s) => Json::String(s.clone()),
            Value::Int(i) => Json::from(*i),
            // NaN and infinities have no JSON form
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Bool(b) => Json::Bool(*b),
            Value::DateTime(d) => Json::String(d.format(DATETIME_FORMAT).to_string()),
        }
    }
    /// Canonical text under which a value is kept in an exact-match index.
    /// Null values are not indexed.
    pub(crate) fn index_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::String(s) => write!(f, "{}", s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::DateTime(d) => write!(f, "{}", d.format(DATETIME_FORMAT)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}
impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::DateTime(d)
    }
}

impl PartialEq<str> for Value {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}
impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}
