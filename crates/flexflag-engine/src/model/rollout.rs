use super::rule::TargetingRule;
use serde::{Deserialize, Serialize};

/// One variation's share of a rollout, in basis points (parts per 10000).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutVariation {
    pub variation_id: String,
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RolloutType {
    Percentage,
    Segmented,
}

/// A weighted assignment of subjects to variations via bucketing.
///
/// Declaration order of `variations` is part of the contract: the rollout
/// evaluator walks them in order and the first cumulative-weight boundary
/// a subject's bucket falls under wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolloutPlan {
    pub rollout_type: RolloutType,
    pub salt: String,
    pub variations: Vec<RolloutVariation>,
    /// Segment rules a subject must match before the rollout even applies.
    /// Only meaningful when `rollout_type == Segmented`.
    #[serde(default)]
    pub segment_rules: Vec<TargetingRule>,
}

impl RolloutPlan {
    /// Sum of all variation weights. A well-formed plan sums to exactly
    /// 10000; anything else is rejected at flag load.
    pub fn total_weight(&self) -> u64 {
        self.variations.iter().map(|v| v.weight as u64).sum()
    }
}
