//! Typed behavior descriptors parsed from raw editor specs.

use crate::error::CompileError;
use crate::model::BehaviorSpec;
use crate::params::{NumberInput, ValueInput};
use crate::value::{ParamParseError, ParamValue, Value};

// =============================================================================
// DOCUMENTED DEFAULTS
// =============================================================================

pub const DEFAULT_SPEED: f64 = 1.0;
pub const DEFAULT_FLOCK_RADIUS: f64 = 25.0;
pub const DEFAULT_COLLISION_RADIUS: f64 = 10.0;
pub const DEFAULT_STRENGTH: f64 = 1.0;
pub const DEFAULT_WIGGLE_ANGLE: f64 = 15.0;
pub const DEFAULT_PROBABILITY: f64 = 0.01;
pub const DEFAULT_AMOUNT: f64 = 1.0;
pub const DEFAULT_THRESHOLD: f64 = 0.0;

/// One behavior, with every parameter typed but not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorKind {
    RandomWalk { speed: NumberInput },
    MoveForward { speed: NumberInput },
    MoveToward { target: String, speed: NumberInput },
    MoveAway { target: String, speed: NumberInput },
    Separate { radius: NumberInput, strength: NumberInput },
    Align { radius: NumberInput, strength: NumberInput },
    Cohere { radius: NumberInput, strength: NumberInput },
    Wiggle { angle: NumberInput },
    Bounce,
    Die { probability: NumberInput },
    Reproduce { probability: NumberInput },
    OnCollision {
        target: String,
        radius: NumberInput,
        action: Action,
    },
    OnProperty {
        property: String,
        condition: Condition,
        threshold: ValueInput,
        action: Action,
    },
    IncrementProperty { property: String, amount: NumberInput },
}

/// What an event behavior does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    RemoveSelf,
    RemoveTarget,
    SetProperty { property: String, value: ValueInput },
    IncrementProperty { property: String, amount: NumberInput },
}

/// Comparison used by `on-property`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Condition {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "eq" | "==" | "equals" => Some(Condition::Eq),
            "neq" | "!=" | "not-equals" => Some(Condition::Neq),
            "lt" | "<" => Some(Condition::Lt),
            "lte" | "<=" => Some(Condition::Lte),
            "gt" | ">" => Some(Condition::Gt),
            "gte" | ">=" => Some(Condition::Gte),
            _ => None,
        }
    }

    /// Evaluates `lhs <op> rhs`.
    ///
    /// Numeric views are compared when both sides have one. Otherwise only
    /// `eq`/`neq` are meaningful and compare the textual forms.
    pub fn evaluate(&self, lhs: &Value, rhs: &Value) -> bool {
        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            return match self {
                Condition::Eq => a == b,
                Condition::Neq => a != b,
                Condition::Lt => a < b,
                Condition::Lte => a <= b,
                Condition::Gt => a > b,
                Condition::Gte => a >= b,
            };
        }
        match self {
            Condition::Eq => lhs.to_string() == rhs.to_string(),
            Condition::Neq => lhs.to_string() != rhs.to_string(),
            _ => false,
        }
    }
}

/// Reads typed parameters out of a raw behavior spec.
struct ParamReader<'a> {
    spec: &'a BehaviorSpec,
    agent_type: &'a str,
}

impl<'a> ParamReader<'a> {
    fn behavior(&self) -> String {
        if self.spec.id.is_empty() {
            self.spec.kind.clone()
        } else {
            self.spec.id.clone()
        }
    }

    fn parse(&self, key: &str, raw: &serde_json::Value) -> Result<ParamValue, CompileError> {
        ParamValue::parse(raw).map_err(|e| match e {
            ParamParseError::MalformedRef(reference) => CompileError::MalformedParameterRef {
                behavior: self.behavior(),
                param: key.to_string(),
                reference,
            },
            ParamParseError::NotScalar => {
                CompileError::invalid(self.behavior(), key, "expected a scalar or $reference")
            }
        })
    }

    fn number_from(
        &self,
        key: &str,
        raw: Option<&serde_json::Value>,
        default: f64,
    ) -> Result<NumberInput, CompileError> {
        let Some(raw) = raw else {
            return Ok(NumberInput::new(None, default));
        };
        let source = self.parse(key, raw)?;
        if let ParamValue::Literal(v) = &source {
            if v.as_number().is_none() {
                return Err(CompileError::invalid(
                    self.behavior(),
                    key,
                    format!("'{}' is not a number", v),
                ));
            }
        }
        Ok(NumberInput::new(Some(source), default))
    }

    fn number(&self, key: &str, default: f64) -> Result<NumberInput, CompileError> {
        self.number_from(key, self.spec.params.get(key), default)
    }

    fn value_from(
        &self,
        key: &str,
        raw: Option<&serde_json::Value>,
        default: Value,
    ) -> Result<ValueInput, CompileError> {
        let source = raw.map(|raw| self.parse(key, raw)).transpose()?;
        Ok(ValueInput::new(source, default))
    }

    fn text_from(&self, key: &str, raw: Option<&serde_json::Value>) -> Result<String, CompileError> {
        match raw {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(_) => Err(CompileError::invalid(self.behavior(), key, "expected a non-empty string")),
            None => Err(CompileError::invalid(self.behavior(), key, "missing")),
        }
    }

    fn text(&self, key: &str) -> Result<String, CompileError> {
        self.text_from(key, self.spec.params.get(key))
    }

    /// Parses the `action` parameter.
    ///
    /// Accepts an object (`{"type": "set-property", "property": "x", "value": 1}`)
    /// or a bare kind string whose arguments live in sibling `actionProperty`,
    /// `actionValue` and `actionAmount` parameters.
    fn action(&self) -> Result<Action, CompileError> {
        let raw = self
            .spec
            .params
            .get("action")
            .ok_or_else(|| CompileError::invalid(self.behavior(), "action", "missing"))?;

        let (kind, property, value, amount) = match raw {
            serde_json::Value::String(kind) => (
                kind.clone(),
                self.spec.params.get("actionProperty"),
                self.spec.params.get("actionValue"),
                self.spec.params.get("actionAmount"),
            ),
            serde_json::Value::Object(map) => {
                let kind = map
                    .get("type")
                    .and_then(|k| k.as_str())
                    .ok_or_else(|| CompileError::invalid(self.behavior(), "action", "missing type"))?;
                (
                    kind.to_string(),
                    map.get("property"),
                    map.get("value"),
                    map.get("amount"),
                )
            }
            _ => {
                return Err(CompileError::invalid(
                    self.behavior(),
                    "action",
                    "expected a string or object",
                ))
            }
        };

        match kind.as_str() {
            "remove-self" => Ok(Action::RemoveSelf),
            "remove-target" => Ok(Action::RemoveTarget),
            "set-property" => Ok(Action::SetProperty {
                property: self.text_from("action.property", property)?,
                value: self.value_from("action.value", value, Value::Number(0.0))?,
            }),
            "increment-property" => Ok(Action::IncrementProperty {
                property: self.text_from("action.property", property)?,
                amount: self.number_from("action.amount", amount, DEFAULT_AMOUNT)?,
            }),
            other => Err(CompileError::UnknownAction {
                agent_type: self.agent_type.to_string(),
                behavior: self.behavior(),
                action: other.to_string(),
            }),
        }
    }
}

impl BehaviorKind {
    /// Parses a raw spec belonging to `agent_type`.
    pub fn parse(spec: &BehaviorSpec, agent_type: &str) -> Result<Self, CompileError> {
        let r = ParamReader { spec, agent_type };
        let kind = match spec.kind.as_str() {
            "random-walk" => BehaviorKind::RandomWalk {
                speed: r.number("speed", DEFAULT_SPEED)?,
            },
            "move-forward" => BehaviorKind::MoveForward {
                speed: r.number("speed", DEFAULT_SPEED)?,
            },
            "move-toward" => BehaviorKind::MoveToward {
                target: r.text("target")?,
                speed: r.number("speed", DEFAULT_SPEED)?,
            },
            "move-away" => BehaviorKind::MoveAway {
                target: r.text("target")?,
                speed: r.number("speed", DEFAULT_SPEED)?,
            },
            "separate" => BehaviorKind::Separate {
                radius: r.number("radius", DEFAULT_FLOCK_RADIUS)?,
                strength: r.number("strength", DEFAULT_STRENGTH)?,
            },
            "align" => BehaviorKind::Align {
                radius: r.number("radius", DEFAULT_FLOCK_RADIUS)?,
                strength: r.number("strength", DEFAULT_STRENGTH)?,
            },
            "cohere" => BehaviorKind::Cohere {
                radius: r.number("radius", DEFAULT_FLOCK_RADIUS)?,
                strength: r.number("strength", DEFAULT_STRENGTH)?,
            },
            "wiggle" => BehaviorKind::Wiggle {
                angle: r.number("angle", DEFAULT_WIGGLE_ANGLE)?,
            },
            "bounce" => BehaviorKind::Bounce,
            "die" => BehaviorKind::Die {
                probability: r.number("probability", DEFAULT_PROBABILITY)?,
            },
            "reproduce" => BehaviorKind::Reproduce {
                probability: r.number("probability", DEFAULT_PROBABILITY)?,
            },
            "on-collision" => BehaviorKind::OnCollision {
                target: r.text("target")?,
                radius: r.number("radius", DEFAULT_COLLISION_RADIUS)?,
                action: r.action()?,
            },
            "on-property" => {
                let condition_raw = r.text("condition")?;
                let condition = Condition::parse(&condition_raw).ok_or_else(|| {
                    CompileError::invalid(
                        r.behavior(),
                        "condition",
                        format!("unknown condition '{}'", condition_raw),
                    )
                })?;
                BehaviorKind::OnProperty {
                    property: r.text("property")?,
                    condition,
                    threshold: r.value_from(
                        "threshold",
                        spec.params.get("threshold"),
                        Value::Number(DEFAULT_THRESHOLD),
                    )?,
                    action: r.action()?,
                }
            }
            "increment-property" => BehaviorKind::IncrementProperty {
                property: r.text("property")?,
                amount: r.number("amount", DEFAULT_AMOUNT)?,
            },
            other => {
                return Err(CompileError::UnknownBehavior {
                    agent_type: agent_type.to_string(),
                    kind: other.to_string(),
                })
            }
        };
        Ok(kind)
    }

    /// Agent type this behavior queries for, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            BehaviorKind::MoveToward { target, .. }
            | BehaviorKind::MoveAway { target, .. }
            | BehaviorKind::OnCollision { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Movement and flocking behaviors; their presence gives agents an
    /// initial velocity at setup.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            BehaviorKind::RandomWalk { .. }
                | BehaviorKind::MoveForward { .. }
                | BehaviorKind::MoveToward { .. }
                | BehaviorKind::MoveAway { .. }
                | BehaviorKind::Separate { .. }
                | BehaviorKind::Align { .. }
                | BehaviorKind::Cohere { .. }
                | BehaviorKind::Wiggle { .. }
        )
    }

    /// Speed input of a movement behavior.
    pub fn speed(&self) -> Option<&NumberInput> {
        match self {
            BehaviorKind::RandomWalk { speed }
            | BehaviorKind::MoveForward { speed }
            | BehaviorKind::MoveToward { speed, .. }
            | BehaviorKind::MoveAway { speed, .. } => Some(speed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BehaviorKind::RandomWalk { .. } => "random-walk",
            BehaviorKind::MoveForward { .. } => "move-forward",
            BehaviorKind::MoveToward { .. } => "move-toward",
            BehaviorKind::MoveAway { .. } => "move-away",
            BehaviorKind::Separate { .. } => "separate",
            BehaviorKind::Align { .. } => "align",
            BehaviorKind::Cohere { .. } => "cohere",
            BehaviorKind::Wiggle { .. } => "wiggle",
            BehaviorKind::Bounce => "bounce",
            BehaviorKind::Die { .. } => "die",
            BehaviorKind::Reproduce { .. } => "reproduce",
            BehaviorKind::OnCollision { .. } => "on-collision",
            BehaviorKind::OnProperty { .. } => "on-property",
            BehaviorKind::IncrementProperty { .. } => "increment-property",
        }
    }
}
