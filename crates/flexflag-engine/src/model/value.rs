use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A typed flag value.
///
/// Raw bytes-on-the-wire is a transport concern; internally the engine
/// always works with a typed value so the evaluator never has to guess
/// how to interpret a `default_value` or variation payload. `Variant`
/// carries both the id of the variation it came from and its underlying
/// value, since a variant-typed flag's answer is meaningless without
/// knowing which variation produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FlagValue {
    Bool(bool),
    String(String),
    Number(f64),
    Json(serde_json::Value),
    Variant {
        variation_id: String,
        value: serde_json::Value,
    },
}

impl FlagValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FlagValue::Bool(_) => "bool",
            FlagValue::String(_) => "string",
            FlagValue::Number(_) => "number",
            FlagValue::Json(_) => "json",
            FlagValue::Variant { .. } => "variant",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FlagValue::Bool(b) => serde_json::Value::Bool(*b),
            FlagValue::String(s) => serde_json::Value::String(s.clone()),
            FlagValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FlagValue::Json(v) => v.clone(),
            FlagValue::Variant { value, .. } => value.clone(),
        }
    }
}

/// One candidate value a variant-typed flag may resolve to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variation {
    pub id: String,
    pub value: FlagValue,
    /// Relative weight used only when the flag relies on declaration-order
    /// variation listing for documentation purposes; rollout weighting
    /// itself lives on the `RolloutPlan`, not here.
    #[serde(default)]
    pub weight: Option<u32>,
}

pub type AttributeBag = HashMap<String, AttributeValue>;

/// Dynamically-typed attribute bag value.
///
/// Operators dispatch on this tag; a non-matching type fails the operator
/// rather than panicking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<AttributeValue>),
    Object(HashMap<String, AttributeValue>),
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Canonical decimal string form, used by `equals`/`not_equals` to
    /// compare numbers and strings uniformly.
    pub fn canonical_string(&self) -> Option<String> {
        match self {
            AttributeValue::String(s) => Some(s.clone()),
            AttributeValue::Number(n) => Some(canonical_decimal(*n)),
            AttributeValue::Bool(b) => Some(b.to_string().to_lowercase()),
            _ => None,
        }
    }
}

/// Renders a float without a trailing `.0` for whole numbers, so `1` and
/// `1.0` compare equal under `equals`.
pub fn canonical_decimal(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
