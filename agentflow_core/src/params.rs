//! The runtime parameter table and step-time parameter resolution.
//!
//! Behaviors never capture parameter values at compile time. Each compiled
//! step holds a [`NumberInput`] or [`ValueInput`] and resolves it against
//! the environment's [`ParameterTable`] every time it runs, which is what
//! lets a slider edit reach a running simulation on the very next tick.

use crate::model::{Parameter, ParameterKind};
use crate::value::{ParamValue, Value};
use std::collections::HashMap;
use tracing::debug;

/// One live parameter slot.
#[derive(Debug, Clone)]
struct ParameterEntry {
    kind: ParameterKind,
    value: Value,
    min: Option<f64>,
    max: Option<f64>,
    options: Vec<String>,
}

impl ParameterEntry {
    fn from_definition(param: &Parameter) -> Self {
        let mut entry = Self {
            kind: param.kind,
            value: Value::default(),
            min: param.min,
            max: param.max,
            options: param.options.clone(),
        };
        entry.assign(param.value.clone());
        entry
    }

    /// Stores `value`, coerced to the declared kind and clamped to the
    /// declared range. Returns false if the value was rejected.
    fn assign(&mut self, value: Value) -> bool {
        let coerced = match self.kind {
            ParameterKind::Number => value.as_number().map(|n| {
                let n = self.min.map_or(n, |min| n.max(min));
                Value::Number(self.max.map_or(n, |max| n.min(max)))
            }),
            ParameterKind::Boolean => value.as_bool().map(Value::Bool),
            ParameterKind::Choice => {
                let text = value.to_string();
                if self.options.is_empty() || self.options.contains(&text) {
                    Some(Value::Text(text))
                } else {
                    None
                }
            }
        };
        match coerced {
            Some(v) => {
                self.value = v;
                true
            }
            None => false,
        }
    }
}

/// Named, typed scalars readable by behaviors and writable between ticks.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    entries: HashMap<String, ParameterEntry>,
}

impl ParameterTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from a model's parameter definitions.
    pub fn from_definitions(params: &[Parameter]) -> Self {
        let entries = params
            .iter()
            .map(|p| (p.name.clone(), ParameterEntry::from_definition(p)))
            .collect();
        Self { entries }
    }

    /// Returns the current value of a parameter.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|e| &e.value)
    }

    /// Returns the numeric view of a parameter.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    /// Writes a parameter value.
    ///
    /// Known parameters are coerced to their declared kind and clamped to
    /// their range; a value that cannot be coerced is rejected and `false`
    /// returned. Unknown names are added as untyped numeric/boolean/text
    /// slots so a reference added in the editor resolves without a
    /// recompile.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        match self.entries.get_mut(name) {
            Some(entry) => entry.assign(value),
            None => {
                debug!("Adding runtime parameter '{}'", name);
                let kind = match value {
                    Value::Bool(_) => ParameterKind::Boolean,
                    Value::Text(_) => ParameterKind::Choice,
                    Value::Number(_) => ParameterKind::Number,
                };
                self.entries.insert(
                    name.to_string(),
                    ParameterEntry {
                        kind,
                        value,
                        min: None,
                        max: None,
                        options: Vec::new(),
                    },
                );
                true
            }
        }
    }

    /// Applies a batch of parameter definitions.
    ///
    /// Existing entries take the new definition wholesale (range, options,
    /// value); new names are added. Entries not mentioned are kept.
    pub fn sync(&mut self, params: &[Parameter]) {
        for param in params {
            self.entries
                .insert(param.name.clone(), ParameterEntry::from_definition(param));
        }
    }

    /// Overlays the current values of `other` onto matching entries.
    pub fn overlay_values(&mut self, other: &ParameterTable) {
        for (name, entry) in &other.entries {
            self.set(name, entry.value.clone());
        }
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A numeric behavior input resolved at step-execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberInput {
    source: ParamValue,
    default: f64,
}

impl NumberInput {
    /// Creates an input from an optional source, falling back to `default`.
    pub fn new(source: Option<ParamValue>, default: f64) -> Self {
        Self {
            source: source.unwrap_or(ParamValue::Literal(Value::Number(default))),
            default,
        }
    }

    /// A constant input.
    pub fn literal(value: f64) -> Self {
        Self::new(Some(ParamValue::from(value)), value)
    }

    /// Returns the parameter this input refers to, if any.
    pub fn reference(&self) -> Option<&str> {
        self.source.reference()
    }

    /// Resolves the input against the current parameter table.
    ///
    /// A reference that does not resolve, or a value with no numeric view,
    /// falls back to the behavior's documented default.
    pub fn resolve(&self, params: &ParameterTable) -> f64 {
        match &self.source {
            ParamValue::Literal(v) => v.as_number().unwrap_or(self.default),
            ParamValue::ParamRef(name) => match params.number(name) {
                Some(n) if n.is_finite() => n,
                _ => {
                    debug!(
                        "Parameter '{}' unresolved, using default {}",
                        name, self.default
                    );
                    self.default
                }
            },
        }
    }
}

/// A scalar behavior input of any kind, resolved at step-execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInput {
    source: ParamValue,
    default: Value,
}

impl ValueInput {
    /// Creates an input from an optional source, falling back to `default`.
    pub fn new(source: Option<ParamValue>, default: Value) -> Self {
        Self {
            source: source.unwrap_or_else(|| ParamValue::Literal(default.clone())),
            default,
        }
    }

    /// Resolves the input against the current parameter table.
    pub fn resolve(&self, params: &ParameterTable) -> Value {
        match &self.source {
            ParamValue::Literal(v) => v.clone(),
            ParamValue::ParamRef(name) => match params.get(name) {
                Some(v) => v.clone(),
                None => {
                    debug!("Parameter '{}' unresolved, using default {}", name, self.default);
                    self.default.clone()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ParameterTable {
        ParameterTable::from_definitions(&[
            Parameter::number("speed", 2.0, 0.0, 5.0),
            Parameter::boolean("hungry", true),
        ])
    }

    #[test]
    fn test_number_set_is_clamped() {
        let mut params = table();
        assert!(params.set("speed", Value::Number(9.0)));
        assert_eq!(params.number("speed"), Some(5.0));
        assert!(params.set("speed", Value::Number(-1.0)));
        assert_eq!(params.number("speed"), Some(0.0));
    }

    #[test]
    fn test_uncoercible_write_rejected() {
        let mut params = table();
        assert!(!params.set("speed", Value::from("fast")));
        assert_eq!(params.number("speed"), Some(2.0));
    }

    #[test]
    fn test_unknown_name_is_added() {
        let mut params = table();
        assert!(params.set("fresh", Value::Number(3.0)));
        assert_eq!(params.number("fresh"), Some(3.0));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_choice_respects_options() {
        let mut choice = Parameter::boolean("mode", false);
        choice.kind = ParameterKind::Choice;
        choice.value = Value::from("calm");
        choice.options = vec!["calm".to_string(), "panic".to_string()];

        let mut params = ParameterTable::from_definitions(&[choice]);
        assert!(params.set("mode", Value::from("panic")));
        assert!(!params.set("mode", Value::from("other")));
        assert_eq!(params.get("mode"), Some(&Value::from("panic")));
    }

    #[test]
    fn test_reference_resolves_live_value() {
        let mut params = table();
        let input = NumberInput::new(Some(ParamValue::ParamRef("speed".into())), 1.0);
        assert_eq!(input.resolve(&params), 2.0);

        params.set("speed", Value::Number(4.0));
        assert_eq!(input.resolve(&params), 4.0);
    }

    #[test]
    fn test_missing_reference_falls_back_to_default() {
        let params = table();
        let input = NumberInput::new(Some(ParamValue::ParamRef("nope".into())), 1.5);
        assert_eq!(input.resolve(&params), 1.5);

        let value = ValueInput::new(Some(ParamValue::ParamRef("nope".into())), Value::Bool(false));
        assert_eq!(value.resolve(&params), Value::Bool(false));
    }

    #[test]
    fn test_overlay_keeps_runtime_edits() {
        let mut live = table();
        live.set("speed", Value::Number(3.5));

        let mut fresh = table();
        fresh.overlay_values(&live);
        assert_eq!(fresh.number("speed"), Some(3.5));
    }
}
