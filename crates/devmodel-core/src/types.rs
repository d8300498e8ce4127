/*!
 * Core data types for devmodel.
 *
 * This module defines the value representation exchanged with clients and the
 * request identifiers used for observability.
 */
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Field map of a struct value
pub type StructFields = BTreeMap<String, Value>;

/// A parameter value as carried on the wire
///
/// The variant names follow the message schema's field names, so a value
/// serializes as e.g. `{"int32_value": 5}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value
    #[serde(rename = "empty_value")]
    Empty,
    /// 32-bit integer
    #[serde(rename = "int32_value")]
    Int32(i32),
    /// 32-bit float
    #[serde(rename = "float32_value")]
    Float32(f32),
    /// UTF-8 string
    #[serde(rename = "string_value")]
    String(String),
    /// Struct with named fields
    #[serde(rename = "struct_value")]
    Struct(StructFields),
    /// Array of 32-bit integers
    #[serde(rename = "int32_array_values")]
    Int32Array(Vec<i32>),
    /// Array of 32-bit floats
    #[serde(rename = "float32_array_values")]
    Float32Array(Vec<f32>),
    /// Array of strings
    #[serde(rename = "string_array_values")]
    StringArray(Vec<String>),
    /// Array of structs
    #[serde(rename = "struct_array_values")]
    StructArray(Vec<StructFields>),
}

impl Value {
    /// Short name of the variant, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::Int32(_) => "int32",
            Value::Float32(_) => "float32",
            Value::String(_) => "string",
            Value::Struct(_) => "struct",
            Value::Int32Array(_) => "int32 array",
            Value::Float32Array(_) => "float32 array",
            Value::StringArray(_) => "string array",
            Value::StructArray(_) => "struct array",
        }
    }

    /// Check if the value is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Check if the value is one of the array variants
    pub fn is_array(&self) -> bool {
        self.array_len().is_some()
    }

    /// Try to get an integer value
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get a float value
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::Float32(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get the fields of a struct value
    pub fn as_struct(&self) -> Option<&StructFields> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Number of elements if this is an array
    pub fn array_len(&self) -> Option<usize> {
        match self {
            Value::Int32Array(a) => Some(a.len()),
            Value::Float32Array(a) => Some(a.len()),
            Value::StringArray(a) => Some(a.len()),
            Value::StructArray(a) => Some(a.len()),
            _ => None,
        }
    }

    /// Element `index` of an array, as a scalar value
    pub fn element(&self, index: usize) -> Option<Value> {
        match self {
            Value::Int32Array(a) => a.get(index).map(|v| Value::Int32(*v)),
            Value::Float32Array(a) => a.get(index).map(|v| Value::Float32(*v)),
            Value::StringArray(a) => a.get(index).map(|v| Value::String(v.clone())),
            Value::StructArray(a) => a.get(index).map(|v| Value::Struct(v.clone())),
            _ => None,
        }
    }

    /// Iterate over the elements of an array as scalar values
    ///
    /// Non-array values yield nothing.
    pub fn elements(&self) -> Vec<Value> {
        (0..self.array_len().unwrap_or(0))
            .filter_map(|i| self.element(i))
            .collect()
    }

    /// Copy of this array with element `index` replaced
    ///
    /// Returns `None` if this is not an array, the index is out of bounds or
    /// the element type does not match.
    pub fn with_element(&self, index: usize, element: Value) -> Option<Value> {
        let mut out = self.clone();
        match (&mut out, element) {
            (Value::Int32Array(a), Value::Int32(v)) if index < a.len() => a[index] = v,
            (Value::Float32Array(a), Value::Float32(v)) if index < a.len() => a[index] = v,
            (Value::StringArray(a), Value::String(v)) if index < a.len() => a[index] = v,
            (Value::StructArray(a), Value::Struct(v)) if index < a.len() => a[index] = v,
            _ => return None,
        }
        Some(out)
    }

    /// Copy of this array with `element` appended
    ///
    /// Returns `None` if this is not an array or the element type does not match.
    pub fn with_appended(&self, element: Value) -> Option<Value> {
        let mut out = self.clone();
        match (&mut out, element) {
            (Value::Int32Array(a), Value::Int32(v)) => a.push(v),
            (Value::Float32Array(a), Value::Float32(v)) => a.push(v),
            (Value::StringArray(a), Value::String(v)) => a.push(v),
            (Value::StructArray(a), Value::Struct(v)) => a.push(v),
            _ => return None,
        }
        Some(out)
    }

    /// Rebuild an array of the same kind from scalar elements
    ///
    /// Elements of the wrong kind are dropped.
    pub fn array_like(&self, elements: Vec<Value>) -> Value {
        match self {
            Value::Int32Array(_) => {
                Value::Int32Array(elements.iter().filter_map(Value::as_i32).collect())
            }
            Value::Float32Array(_) => {
                Value::Float32Array(elements.iter().filter_map(Value::as_f32).collect())
            }
            Value::StringArray(_) => Value::StringArray(
                elements
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            Value::StructArray(_) => Value::StructArray(
                elements
                    .into_iter()
                    .filter_map(|v| match v {
                        Value::Struct(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Empty
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "<empty>"),
            Value::Int32(i) => write!(f, "{}", i),
            Value::Float32(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "\"{}\"", s),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => write!(f, "<{}>", other.kind_name()),
            },
        }
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int32(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Float32(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<i32>> for Value {
    fn from(a: Vec<i32>) -> Self {
        Value::Int32Array(a)
    }
}

impl From<Vec<f32>> for Value {
    fn from(a: Vec<f32>) -> Self {
        Value::Float32Array(a)
    }
}

impl From<Vec<String>> for Value {
    fn from(a: Vec<String>) -> Self {
        Value::StringArray(a)
    }
}

impl From<StructFields> for Value {
    fn from(fields: StructFields) -> Self {
        Value::Struct(fields)
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide, monotonically increasing request identifier
///
/// Only used to correlate log lines belonging to one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocate the next request id
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value of the id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_wire_names() {
        let json = serde_json::to_string(&Value::Int32(5)).unwrap();
        assert_eq!(json, r#"{"int32_value":5}"#);

        let v: Value = serde_json::from_str(r#"{"string_value":"hi"}"#).unwrap();
        assert_eq!(v, Value::String("hi".to_string()));

        let v: Value = serde_json::from_str(r#"{"int32_array_values":[1,2,3]}"#).unwrap();
        assert_eq!(v, Value::Int32Array(vec![1, 2, 3]));

        let v: Value = serde_json::from_str(r#""empty_value""#).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn test_struct_value() {
        let v: Value =
            serde_json::from_str(r#"{"struct_value":{"x":{"float32_value":1.5}}}"#).unwrap();
        let fields = v.as_struct().unwrap();
        assert_eq!(fields.get("x"), Some(&Value::Float32(1.5)));
    }

    #[test]
    fn test_array_helpers() {
        let v = Value::from(vec![1, 2, 3]);
        assert_eq!(v.array_len(), Some(3));
        assert_eq!(v.element(1), Some(Value::Int32(2)));
        assert_eq!(v.element(3), None);

        let replaced = v.with_element(0, Value::Int32(9)).unwrap();
        assert_eq!(replaced, Value::Int32Array(vec![9, 2, 3]));
        assert!(v.with_element(5, Value::Int32(9)).is_none());
        assert!(v.with_element(0, Value::from("x")).is_none());

        let appended = v.with_appended(Value::Int32(4)).unwrap();
        assert_eq!(appended.array_len(), Some(4));

        let rebuilt = v.array_like(vec![Value::Int32(7), Value::from("skip")]);
        assert_eq!(rebuilt, Value::Int32Array(vec![7]));
    }

    #[test]
    fn test_scalar_accessors() {
        assert_eq!(Value::from(3).as_i32(), Some(3));
        assert_eq!(Value::from(2.5f32).as_f32(), Some(2.5));
        assert_eq!(Value::from("a").as_str(), Some("a"));
        assert_eq!(Value::from("a").as_i32(), None);
        assert!(!Value::from(1).is_array());
        assert!(Value::from(vec!["a".to_string()]).is_array());
    }

    #[test]
    fn test_request_ids_increase() {
        let a = RequestId::next();
        let b = RequestId::next();
        assert!(b > a);
        assert_eq!(format!("{}", a), a.get().to_string());
    }
}
