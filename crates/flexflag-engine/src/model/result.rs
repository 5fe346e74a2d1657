use super::value::{AttributeBag, FlagValue};
use serde::{Deserialize, Serialize};

/// The labelled explanation of why a value was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Disabled,
    Default,
    TargetingMatch,
    Rollout,
    FlagNotFound,
    Error,
}

/// `{ flag_key, environment_key, subject_key, attributes }` — the entity
/// an evaluation is about, plus the flag to resolve for it.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub flag_key: String,
    pub environment_key: String,
    pub subject_key: String,
    pub attributes: AttributeBag,
    /// Caller-supplied fallback used whenever the engine cannot resolve a
    /// value (flag missing, catalog unavailable, internal error).
    pub default_value: FlagValue,
}

impl EvaluationRequest {
    pub fn new(
        flag_key: impl Into<String>,
        environment_key: impl Into<String>,
        subject_key: impl Into<String>,
        default_value: FlagValue,
    ) -> Self {
        Self {
            flag_key: flag_key.into(),
            environment_key: environment_key.into(),
            subject_key: subject_key.into(),
            attributes: AttributeBag::new(),
            default_value,
        }
    }

    pub fn with_attributes(mut self, attributes: AttributeBag) -> Self {
        self.attributes = attributes;
        self
    }
}

/// `{ value, variation_id?, reason, flag_version, cached, evaluation_nanos }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub value: FlagValue,
    pub variation_id: Option<String>,
    pub reason: Reason,
    pub flag_version: u64,
    pub cached: bool,
    pub evaluation_nanos: u64,
}

impl EvaluationResult {
    pub fn is_default_or_error(&self) -> bool {
        matches!(
            self.reason,
            Reason::Default | Reason::FlagNotFound | Reason::Error | Reason::Disabled
        )
    }
}
