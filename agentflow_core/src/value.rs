//! Scalar values and parameter references.
//!
//! Behavior parameters in a model are either literals or references to a
//! named model parameter. On the editor's JSON wire a reference is a string
//! starting with `$`; inside the compiler it is always the explicit
//! [`ParamValue::ParamRef`] variant.

use serde::{Deserialize, Serialize};

/// Marker that introduces a parameter reference in model JSON.
pub const PARAM_REF_PREFIX: char = '$';

/// A dynamically typed scalar: property values, parameter values, thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Numeric view of the value.
    ///
    /// Booleans map to 1/0 and numeric text is parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Text(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }

    /// Converts a raw JSON scalar. Arrays, objects and null yield `None`.
    pub fn from_json(raw: &serde_json::Value) -> Option<Self> {
        match raw {
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A behavior parameter: a literal or a symbolic reference to a model parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Literal(Value),
    ParamRef(String),
}

/// Reasons a raw JSON parameter could not become a [`ParamValue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamParseError {
    /// `$` with nothing usable after it
    MalformedRef(String),
    /// Not a scalar (array, object, null)
    NotScalar,
}

impl ParamValue {
    /// Parses a raw JSON parameter from a behavior's parameter map.
    pub fn parse(raw: &serde_json::Value) -> Result<Self, ParamParseError> {
        if let serde_json::Value::String(s) = raw {
            if let Some(name) = s.strip_prefix(PARAM_REF_PREFIX) {
                let name = name.trim();
                if name.is_empty() || name.starts_with(PARAM_REF_PREFIX) {
                    return Err(ParamParseError::MalformedRef(s.clone()));
                }
                return Ok(ParamValue::ParamRef(name.to_string()));
            }
        }
        Value::from_json(raw)
            .map(ParamValue::Literal)
            .ok_or(ParamParseError::NotScalar)
    }

    /// Returns the referenced parameter name, if this is a reference.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ParamValue::ParamRef(name) => Some(name),
            ParamValue::Literal(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(n: f64) -> Self {
        ParamValue::Literal(Value::Number(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reference() {
        let value = ParamValue::parse(&json!("$speed")).unwrap();
        assert_eq!(value, ParamValue::ParamRef("speed".to_string()));
        assert_eq!(value.reference(), Some("speed"));
    }

    #[test]
    fn test_parse_literals() {
        assert_eq!(ParamValue::parse(&json!(2.5)).unwrap(), ParamValue::from(2.5));
        assert_eq!(
            ParamValue::parse(&json!(true)).unwrap(),
            ParamValue::Literal(Value::Bool(true))
        );
        assert_eq!(
            ParamValue::parse(&json!("sheep")).unwrap(),
            ParamValue::Literal(Value::Text("sheep".to_string()))
        );
    }

    #[test]
    fn test_bare_marker_is_malformed() {
        assert_eq!(
            ParamValue::parse(&json!("$")),
            Err(ParamParseError::MalformedRef("$".to_string()))
        );
        assert_eq!(
            ParamValue::parse(&json!("$ ")),
            Err(ParamParseError::MalformedRef("$ ".to_string()))
        );
    }

    #[test]
    fn test_non_scalar_rejected() {
        assert_eq!(ParamValue::parse(&json!([1, 2])), Err(ParamParseError::NotScalar));
        assert_eq!(ParamValue::parse(&json!(null)), Err(ParamParseError::NotScalar));
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(Value::Bool(true).as_number(), Some(1.0));
        assert_eq!(Value::from("3.5").as_number(), Some(3.5));
        assert_eq!(Value::Number(0.0).as_bool(), Some(false));
        assert_eq!(Value::from("maybe").as_bool(), None);
    }

    #[test]
    fn test_untagged_deserialize() {
        let values: Vec<Value> = serde_json::from_str(r#"[1.5, false, "red"]"#).unwrap();
        assert_eq!(
            values,
            vec![Value::Number(1.5), Value::Bool(false), Value::from("red")]
        );
    }
}
