//! Rollout evaluator: given a rollout plan and a subject, selects a
//! variation by weighted bucketing.
//!
//! Walks a cumulative-weight distribution against a murmur-hashed
//! bucket, over the explicit `RolloutPlan`/`RolloutVariation` model, with
//! a strict `b < c` tie-break on the declared boundary.

use crate::hash::bucket;
use crate::matcher::rule_matches;
use crate::model::{AttributeBag, RolloutPlan, RolloutType};

/// Selects a variation id for `subject_key` under `plan`, or `None` when
/// the subject falls outside the declared rollout (weights summing to
/// less than 10000) or fails the segment rules of a `segmented` rollout.
pub fn select(
    plan: &RolloutPlan,
    hash_seed: u32,
    subject_key: &str,
    attributes: &AttributeBag,
) -> Option<String> {
    if plan.rollout_type == RolloutType::Segmented
        && !plan.segment_rules.iter().any(|rule| rule_matches(rule, attributes))
    {
        return None;
    }

    let b = bucket(hash_seed, &plan.salt, subject_key);

    let mut cumulative: u64 = 0;
    for variation in &plan.variations {
        cumulative += variation.weight as u64;
        if (b as u64) < cumulative {
            return Some(variation.variation_id.clone());
        }
    }

    None
}
