use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A single operator supported by the rule matcher.
///
/// Semantics are fixed by the wire contract — see `matcher::matches` for
/// the evaluation of each variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    Regex,
    SemverGt,
    SemverGte,
    SemverLt,
    SemverLte,
    SemverEq,
    Exists,
    NotExists,
}

/// A single targeting condition: `attribute OP values`.
///
/// `regex` conditions lazily compile and cache their pattern in `compiled`
/// so a condition only ever pays the compilation cost once; the cache
/// lives on the condition itself (not a process-global map) so that
/// replacing the owning flag snapshot reclaims it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Condition {
    pub attribute: String,
    pub operator: Operator,
    pub values: Vec<String>,
    #[serde(skip)]
    compiled_regex: OnceLock<Option<regex::Regex>>,
    #[serde(skip)]
    regex_warned: OnceLock<()>,
}

impl Clone for Condition {
    fn clone(&self) -> Self {
        Self {
            attribute: self.attribute.clone(),
            operator: self.operator.clone(),
            values: self.values.clone(),
            compiled_regex: OnceLock::new(),
            regex_warned: OnceLock::new(),
        }
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.attribute == other.attribute
            && self.operator == other.operator
            && self.values == other.values
    }
}

impl Condition {
    pub fn new(attribute: impl Into<String>, operator: Operator, values: Vec<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            values,
            compiled_regex: OnceLock::new(),
            regex_warned: OnceLock::new(),
        }
    }

    /// Returns the compiled pattern for a `regex` condition, compiling and
    /// caching it on first use. An invalid pattern compiles to `None` and
    /// is reported exactly once via `tracing::warn!`.
    pub fn regex(&self) -> Option<&regex::Regex> {
        self.compiled_regex
            .get_or_init(|| match self.values.first() {
                Some(pattern) => match regex::Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(err) => {
                        self.regex_warned.get_or_init(|| {
                            tracing::warn!(
                                attribute = %self.attribute,
                                pattern = %pattern,
                                error = %err,
                                "targeting rule regex failed to compile; rule will never match"
                            );
                        });
                        None
                    }
                },
                None => None,
            })
            .as_ref()
    }
}

/// An ordered, AND-combined list of conditions with the variation to
/// select on a full match. Rules are evaluated in declared order; the
/// first fully-matching rule wins at the flag level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetingRule {
    pub conditions: Vec<Condition>,
    pub variation_id_on_match: String,
}

impl TargetingRule {
    pub fn new(conditions: Vec<Condition>, variation_id_on_match: impl Into<String>) -> Self {
        Self {
            conditions,
            variation_id_on_match: variation_id_on_match.into(),
        }
    }
}
