//! Rule matcher: evaluates a single targeting condition, then a whole
//! rule (AND across conditions), against an attribute bag.
//!
//! Operators are inlined into a native `match` over `Operator` rather
//! than an expression tree, since a rule's condition list is a flat,
//! explicit-operator list, not an arbitrary expression language.

use crate::model::{AttributeBag, AttributeValue, Condition, Operator, TargetingRule};
use semver::Version;

/// Evaluates whether every condition in `rule` matches `attributes`.
///
/// Conditions are ANDed; the first condition that fails short-circuits
/// the rule to a non-match. A single operator error (bad regex, bad
/// semver) is isolated to that condition — the rule simply doesn't match,
/// evaluation continues at the flag level.
pub fn rule_matches(rule: &TargetingRule, attributes: &AttributeBag) -> bool {
    rule.conditions
        .iter()
        .all(|condition| condition_matches(condition, attributes))
}

fn condition_matches(condition: &Condition, attributes: &AttributeBag) -> bool {
    let attr = attributes.get(&condition.attribute);

    match condition.operator {
        Operator::Exists => attr.is_some_and(|v| !matches!(v, AttributeValue::Null)),
        Operator::NotExists => attr.is_none_or(|v| matches!(v, AttributeValue::Null)),

        Operator::Equals => match attr {
            Some(value) => condition
                .values
                .first()
                .is_some_and(|v| values_equal(value, v)),
            None => false,
        },
        Operator::NotEquals => match attr {
            Some(value) => condition
                .values
                .first()
                .is_none_or(|v| !values_equal(value, v)),
            None => true,
        },

        Operator::In => match attr {
            Some(value) => condition.values.iter().any(|v| values_equal(value, v)),
            None => false,
        },
        Operator::NotIn => match attr {
            Some(value) => !condition.values.iter().any(|v| values_equal(value, v)),
            None => true,
        },

        Operator::Contains => match attr.and_then(AttributeValue::as_str) {
            Some(actual) => condition.values.first().is_some_and(|v| actual.contains(v.as_str())),
            None => false,
        },
        Operator::StartsWith => match attr.and_then(AttributeValue::as_str) {
            Some(actual) => condition
                .values
                .first()
                .is_some_and(|v| actual.starts_with(v.as_str())),
            None => false,
        },
        Operator::EndsWith => match attr.and_then(AttributeValue::as_str) {
            Some(actual) => condition
                .values
                .first()
                .is_some_and(|v| actual.ends_with(v.as_str())),
            None => false,
        },

        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
            numeric_compare(condition, attr)
        }

        Operator::Regex => match attr.and_then(AttributeValue::as_str) {
            Some(actual) => condition.regex().is_some_and(|re| re.is_match(actual)),
            None => false,
        },

        Operator::SemverGt
        | Operator::SemverGte
        | Operator::SemverLt
        | Operator::SemverLte
        | Operator::SemverEq => semver_compare(condition, attr),
    }
}

/// Compares an attribute value against a rule-supplied operand string for
/// `equals`/`not_equals`/`in`/`not_in`. Booleans compare case-insensitively
/// (`"True"`, `"true"`, and `"TRUE"` all match `AttributeValue::Bool(true)`);
/// every other type goes through the canonical decimal/string coercion and
/// compares exactly.
fn values_equal(attr: &AttributeValue, operand: &str) -> bool {
    match attr {
        AttributeValue::Bool(b) => operand.eq_ignore_ascii_case(&b.to_string()),
        other => other.canonical_string().is_some_and(|actual| actual == operand),
    }
}

fn numeric_compare(condition: &Condition, attr: Option<&AttributeValue>) -> bool {
    let (Some(actual), Some(operand)) = (
        attr.and_then(AttributeValue::as_f64),
        condition.values.first().and_then(|v| v.parse::<f64>().ok()),
    ) else {
        return false;
    };

    match condition.operator {
        Operator::Gt => actual > operand,
        Operator::Gte => actual >= operand,
        Operator::Lt => actual < operand,
        Operator::Lte => actual <= operand,
        _ => unreachable!("numeric_compare called with non-numeric operator"),
    }
}

fn semver_compare(condition: &Condition, attr: Option<&AttributeValue>) -> bool {
    let Some(actual_str) = attr.and_then(AttributeValue::as_str) else {
        return false;
    };
    let Some(operand_str) = condition.values.first() else {
        return false;
    };

    let (Ok(actual), Ok(operand)) = (Version::parse(actual_str), Version::parse(operand_str))
    else {
        return false;
    };

    match condition.operator {
        Operator::SemverGt => actual > operand,
        Operator::SemverGte => actual >= operand,
        Operator::SemverLt => actual < operand,
        Operator::SemverLte => actual <= operand,
        Operator::SemverEq => actual == operand,
        _ => unreachable!("semver_compare called with non-semver operator"),
    }
}
