//! Typed per-agent property bags.

use crate::model::{PropertyDef, PropertyKind};
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
struct PropertySlot {
    kind: PropertyKind,
    value: Value,
    min: Option<f64>,
    max: Option<f64>,
}

impl PropertySlot {
    /// Coerces `value` into this slot's declared kind.
    fn coerce(&self, value: Value) -> Option<Value> {
        match self.kind {
            PropertyKind::Number => value.as_number().map(|n| {
                let n = self.min.map_or(n, |min| n.max(min));
                Value::Number(self.max.map_or(n, |max| n.min(max)))
            }),
            PropertyKind::Boolean => value.as_bool().map(Value::Bool),
            PropertyKind::String => Some(Value::Text(value.to_string())),
        }
    }
}

/// An agent's custom properties, keyed by name.
///
/// Each slot remembers the kind declared by its [`PropertyDef`]. Writes are
/// coerced to that kind (and clamped into `[min, max]` for numbers); a write
/// that cannot be coerced leaves the old value in place. Cloning a bag yields
/// a structurally independent copy, which is what reproduction relies on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag {
    slots: BTreeMap<String, PropertySlot>,
}

impl PropertyBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a bag from an agent type's property definitions.
    pub fn from_defs(defs: &[PropertyDef]) -> Self {
        let mut bag = Self::new();
        for def in defs {
            let mut slot = PropertySlot {
                kind: def.kind,
                value: Value::default(),
                min: def.min,
                max: def.max,
            };
            slot.value = slot.coerce(def.default.clone()).unwrap_or_else(|| match def.kind {
                PropertyKind::Number => Value::Number(0.0),
                PropertyKind::Boolean => Value::Bool(false),
                PropertyKind::String => Value::Text(String::new()),
            });
            bag.slots.insert(def.name.clone(), slot);
        }
        bag
    }

    /// Returns a property value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(name).map(|s| &s.value)
    }

    /// Returns the numeric view of a property.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    /// Writes a property. Undeclared names become slots typed by `value`.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.slots.get_mut(name) {
            Some(slot) => match slot.coerce(value) {
                Some(v) => slot.value = v,
                None => warn!("Rejected write to property '{}': kind mismatch", name),
            },
            None => {
                let kind = match value {
                    Value::Number(_) => PropertyKind::Number,
                    Value::Bool(_) => PropertyKind::Boolean,
                    Value::Text(_) => PropertyKind::String,
                };
                self.slots.insert(
                    name.to_string(),
                    PropertySlot {
                        kind,
                        value,
                        min: None,
                        max: None,
                    },
                );
            }
        }
    }

    /// `property += amount`, treating a missing or non-numeric value as 0.
    pub fn increment(&mut self, name: &str, amount: f64) {
        let current = self.number(name).unwrap_or(0.0);
        match self.slots.get_mut(name) {
            Some(slot) if slot.kind != PropertyKind::Number => {
                slot.kind = PropertyKind::Number;
                slot.value = Value::Number(current + amount);
            }
            _ => self.set(name, Value::Number(current + amount)),
        }
    }

    /// Iterates over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(k, s)| (k.as_str(), &s.value))
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the bag has no properties.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
