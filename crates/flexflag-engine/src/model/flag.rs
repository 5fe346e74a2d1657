use super::rollout::RolloutPlan;
use super::rule::TargetingRule;
use super::value::{FlagValue, Variation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    Bool,
    String,
    Number,
    Json,
    Variant,
}

impl FlagType {
    /// Whether `value`'s discriminant is the one this flag type expects.
    /// A `Bool`-typed flag must carry `FlagValue::Bool` everywhere (default
    /// value and every variation); mixing types within a single flag is a
    /// structural error, not a runtime one.
    fn matches(self, value: &FlagValue) -> bool {
        matches!(
            (self, value),
            (FlagType::Bool, FlagValue::Bool(_))
                | (FlagType::String, FlagValue::String(_))
                | (FlagType::Number, FlagValue::Number(_))
                | (FlagType::Json, FlagValue::Json(_))
                | (FlagType::Variant, FlagValue::Variant { .. })
        )
    }
}

/// A flag's full configuration at a point in time.
///
/// Identity is the triple `(project_id, environment_key, key)`; the cache
/// partitions by `environment_key` and keys its maps by `(environment_key,
/// key)` alone (a process serves one project at a time per partition).
/// `version` strictly increases on every mutation and is the tie-break the
/// cache uses to reject a stale `put`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flag {
    pub project_id: String,
    pub environment_key: String,
    pub key: String,
    pub flag_type: FlagType,
    pub enabled: bool,
    pub default_value: FlagValue,
    pub targeting_rules: Vec<TargetingRule>,
    pub rollout_plan: Option<RolloutPlan>,
    pub variations: Vec<Variation>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Flag {
    /// Looks up a variation's value by id, falling back to `default_value`
    /// when the id is unknown (a rule or rollout pointing at a stale
    /// variation id should never panic the evaluator).
    pub fn variation_value(&self, variation_id: &str) -> &FlagValue {
        self.variations
            .iter()
            .find(|v| v.id == variation_id)
            .map(|v| &v.value)
            .unwrap_or(&self.default_value)
    }

    /// Validates the structural invariants that must hold before a flag is
    /// allowed into the cache. A flag failing this check never reaches
    /// the hot path.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(plan) = &self.rollout_plan
            && plan.total_weight() != 10_000
        {
            return Err(format!(
                "rollout plan for {}/{} has weights summing to {} (must be exactly 10000)",
                self.environment_key,
                self.key,
                plan.total_weight()
            ));
        }

        if self.flag_type == FlagType::Variant {
            for rule in &self.targeting_rules {
                if !self
                    .variations
                    .iter()
                    .any(|v| v.id == rule.variation_id_on_match)
                {
                    return Err(format!(
                        "rule in {}/{} targets unknown variation id {:?}",
                        self.environment_key, self.key, rule.variation_id_on_match
                    ));
                }
            }
        }

        if !self.flag_type.matches(&self.default_value) {
            return Err(format!(
                "default value for {}/{} is {} but flag_type is {:?}",
                self.environment_key,
                self.key,
                self.default_value.type_name(),
                self.flag_type
            ));
        }

        for variation in &self.variations {
            if !self.flag_type.matches(&variation.value) {
                return Err(format!(
                    "variation {:?} in {}/{} is {} but flag_type is {:?}",
                    variation.id,
                    self.environment_key,
                    self.key,
                    variation.value.type_name(),
                    self.flag_type
                ));
            }
        }

        Ok(())
    }
}
