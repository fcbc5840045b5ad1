use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Declared type of a stored value. Serialized as `"int" | "float" | "str" | "bool"`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Int,
    Float,
    Str,
    Bool,
}

impl TypeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::Bool => "bool",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "int" => Some(TypeTag::Int),
            "float" => Some(TypeTag::Float),
            "str" => Some(TypeTag::Str),
            "bool" => Some(TypeTag::Bool),
            _ => None,
        }
    }

    /// Whether `value` has the runtime shape this tag declares.
    pub fn matches(self, value: &Value) -> bool {
        classify(value) == Some(self)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a JSON value into one of the four tags.
///
/// Numbers with a whole value are `Int` even when written as a float (`3.0`);
/// only numbers with a fractional part are `Float`. Null, arrays and objects
/// have no tag.
pub fn classify(value: &Value) -> Option<TypeTag> {
    match value {
        Value::Bool(_) => Some(TypeTag::Bool),
        Value::String(_) => Some(TypeTag::Str),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(TypeTag::Int),
        Value::Number(n) => n.as_f64().map(|f| {
            if f.is_finite() && f.fract() == 0.0 {
                TypeTag::Int
            } else {
                TypeTag::Float
            }
        }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Human-readable shape of a value, used in validation errors.
pub(crate) fn describe(value: &Value) -> String {
    match classify(value) {
        Some(tag) => tag.to_string(),
        None => match value {
            Value::Array(_) => "array".to_string(),
            Value::Object(_) => "object".to_string(),
            _ => "null".to_string(),
        },
    }
}

/// Closed union of the values a typed store can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl TypedValue {
    pub fn tag(&self) -> TypeTag {
        match self {
            TypedValue::Int(_) => TypeTag::Int,
            TypedValue::Float(_) => TypeTag::Float,
            TypedValue::Str(_) => TypeTag::Str,
            TypedValue::Bool(_) => TypeTag::Bool,
        }
    }

    /// JSON form of the value. Non-finite floats have no JSON form and map to null.
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::Int(i) => Value::from(*i),
            TypedValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            TypedValue::Str(s) => Value::String(s.clone()),
            TypedValue::Bool(b) => Value::Bool(*b),
        }
    }

    /// Rebuild a typed value from a JSON value and the tag it was stored with.
    /// Returns `None` when the value does not classify as `tag`.
    pub fn from_tagged(tag: TypeTag, value: &Value) -> Option<Self> {
        if !tag.matches(value) {
            return None;
        }
        match tag {
            TypeTag::Int => value
                .as_i64()
                .or_else(|| value.as_f64().and_then(whole_to_i64))
                .map(TypedValue::Int),
            TypeTag::Float => value.as_f64().map(TypedValue::Float),
            TypeTag::Str => value.as_str().map(|s| TypedValue::Str(s.to_string())),
            TypeTag::Bool => value.as_bool().map(TypedValue::Bool),
        }
    }
}

fn whole_to_i64(f: f64) -> Option<i64> {
    // i64::MAX is not exactly representable; 2^63 is the first value out of range.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    (f >= -LIMIT && f < LIMIT).then_some(f as i64)
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Int(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        TypedValue::Float(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::Str(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::Str(value.to_string())
    }
}
