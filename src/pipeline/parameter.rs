//! Filter parameters, as found in graph description files.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A parameter value for a filter instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParameterValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParameterValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

/// Why a filter rejected a parameter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("unknown parameter")]
    Unknown,

    #[error("expected {expected}, got {actual}")]
    WrongType {
        expected: &'static str,
        actual: ParameterValue,
    },

    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_untagged_parsing() {
        let params: BTreeMap<String, ParameterValue> =
            serde_json::from_str(r#"{"a": true, "b": 3, "c": 0.5, "d": "left"}"#).unwrap();
        assert_eq!(params["a"], ParameterValue::Bool(true));
        assert_eq!(params["b"], ParameterValue::Int(3));
        assert_eq!(params["c"], ParameterValue::Float(0.5));
        assert_eq!(params["d"].as_str(), Some("left"));
    }

    #[test]
    fn test_int_widens_to_float() {
        assert_eq!(ParameterValue::Int(2).as_f64(), Some(2.0));
        assert_eq!(ParameterValue::Text("x".into()).as_f64(), None);
    }

    #[test]
    fn test_wrong_type_message() {
        let err = ParameterError::WrongType {
            expected: "integer",
            actual: ParameterValue::Text("ten".into()),
        };
        assert_eq!(err.to_string(), "expected integer, got \"ten\"");
    }
}
