//! Flag evaluator: orchestrates lookup → enabled check → targeting rules
//! → rollout → default, producing a typed value and a labelled reason.

use crate::cache::FlagCache;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::matcher::rule_matches;
use crate::model::{EvaluationRequest, EvaluationResult, Flag, Reason};
use crate::rollout;
use std::time::Instant;

/// Evaluates a single request against the cache (falling back to T3 read-
/// through, then the catalog, on a miss), following the six steps of the
/// evaluation contract. Never panics: any unexpected internal fault
/// degrades to `Reason::Error` with the caller's default value
/// substituted.
pub async fn evaluate(
    cache: &FlagCache,
    catalog: &dyn Catalog,
    config: &EngineConfig,
    request: &EvaluationRequest,
) -> EvaluationResult {
    let start = Instant::now();

    let (flag, cached) = match cache.get(&request.environment_key, &request.flag_key) {
        Some((flag, _tier)) => (flag, true),
        None => match cache
            .get_through_shared(&request.environment_key, &request.flag_key)
            .await
        {
            Some(flag) => (flag, true),
            None => {
                let load = catalog.load_flag(&request.environment_key, &request.flag_key);
                match tokio::time::timeout(config.evaluation_deadline, load).await {
                    Ok(Ok(Some(flag))) => {
                        cache.put(request.environment_key.clone(), (*flag).clone());
                        cache
                            .backfill_shared(&request.environment_key, &flag)
                            .await;
                        (flag, false)
                    }
                    Ok(Ok(None)) => {
                        return finish(
                            &request.default_value,
                            None,
                            Reason::FlagNotFound,
                            0,
                            false,
                            start,
                        );
                    }
                    // Catalog transport error or deadline exceeded both
                    // degrade to the caller's default: never block the
                    // application waiting on a slow or unavailable catalog.
                    Ok(Err(_)) | Err(_) => {
                        return finish(&request.default_value, None, Reason::Error, 0, false, start);
                    }
                }
            }
        },
    };

    // Step 2 (§4.4): empty subject terminates with ERROR, but only once
    // step 1's lookup has resolved a flag — an empty subject against a
    // flag that doesn't exist still reports FLAG_NOT_FOUND, and a flag
    // that does exist reports the real `flag_version` in its ERROR result.
    if request.subject_key.is_empty() {
        return finish(&request.default_value, None, Reason::Error, flag.version, cached, start);
    }

    evaluate_flag(&flag, config.hash_seed, request, cached, start)
}

/// Pure evaluation of an already-resolved flag snapshot — split out so the
/// ultra-fast (T1-only) API path can call it directly without re-deriving
/// the lookup/miss logic.
pub fn evaluate_flag(
    flag: &Flag,
    hash_seed: u32,
    request: &EvaluationRequest,
    cached: bool,
    start: Instant,
) -> EvaluationResult {
    if !flag.enabled {
        return finish(
            &flag.default_value,
            None,
            Reason::Disabled,
            flag.version,
            cached,
            start,
        );
    }

    for rule in &flag.targeting_rules {
        if rule_matches(rule, &request.attributes) {
            let value = flag.variation_value(&rule.variation_id_on_match);
            return finish(
                value,
                Some(rule.variation_id_on_match.clone()),
                Reason::TargetingMatch,
                flag.version,
                cached,
                start,
            );
        }
    }

    if let Some(plan) = &flag.rollout_plan
        && let Some(variation_id) =
            rollout::select(plan, hash_seed, &request.subject_key, &request.attributes)
    {
        let value = flag.variation_value(&variation_id);
        return finish(
            value,
            Some(variation_id),
            Reason::Rollout,
            flag.version,
            cached,
            start,
        );
    }

    finish(
        &flag.default_value,
        None,
        Reason::Default,
        flag.version,
        cached,
        start,
    )
}

fn finish(
    value: &crate::model::FlagValue,
    variation_id: Option<String>,
    reason: Reason,
    flag_version: u64,
    cached: bool,
    start: Instant,
) -> EvaluationResult {
    EvaluationResult {
        value: value.clone(),
        variation_id,
        reason,
        flag_version,
        cached,
        evaluation_nanos: start.elapsed().as_nanos() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, FlagCache};
    use crate::catalog::InMemoryCatalog;
    use crate::model::{
        AttributeValue, Condition, FlagType, FlagValue, Operator, RolloutPlan, RolloutType,
        RolloutVariation, TargetingRule, Variation,
    };
    use chrono::Utc;

    fn base_flag(key: &str) -> Flag {
        Flag {
            project_id: "proj".into(),
            environment_key: "production".into(),
            key: key.into(),
            flag_type: FlagType::Bool,
            enabled: true,
            default_value: FlagValue::Bool(false),
            targeting_rules: vec![],
            rollout_plan: None,
            variations: vec![],
            version: 1,
            updated_at: Utc::now(),
        }
    }

    async fn harness() -> (FlagCache, InMemoryCatalog) {
        (FlagCache::new(CacheConfig::default()), InMemoryCatalog::new())
    }

    // S1: rollout scenario.
    #[tokio::test]
    async fn rollout_scenario() {
        let (cache, catalog) = harness().await;
        let mut flag = base_flag("new-feature");
        flag.variations = vec![Variation {
            id: "on".into(),
            value: FlagValue::Bool(true),
            weight: None,
        }];
        flag.rollout_plan = Some(RolloutPlan {
            rollout_type: RolloutType::Percentage,
            salt: "new-feature".into(),
            variations: vec![RolloutVariation {
                variation_id: "on".into(),
                weight: 2500,
            }],
            segment_rules: vec![],
        });
        catalog.put("production", flag).await;

        // Golden table: expected membership for subject keys user000..user019
        // against salt "new-feature" at a 2500/10000 rollout weight, pinned
        // from the bucketing hash so a correct-on-aggregate but
        // wrong-per-key regression in the bucket function is caught.
        const EXPECTED_IN_ROLLOUT: [bool; 20] = [
            false, false, false, true, false, false, true, false, false, false, true, false,
            false, false, false, false, false, false, false, true,
        ];

        for (i, expected) in EXPECTED_IN_ROLLOUT.into_iter().enumerate() {
            let request = EvaluationRequest::new(
                "new-feature",
                "production",
                format!("user{i:03}"),
                FlagValue::Bool(false),
            );
            let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
            if expected {
                assert_eq!(
                    result.reason,
                    Reason::Rollout,
                    "user{i:03} expected in rollout"
                );
                assert_eq!(result.value, FlagValue::Bool(true));
                assert_eq!(result.variation_id.as_deref(), Some("on"));
            } else {
                assert_eq!(
                    result.reason,
                    Reason::Default,
                    "user{i:03} expected out of rollout"
                );
            }
        }
    }

    // S2: targeting match / default scenario.
    #[tokio::test]
    async fn targeting_match_and_default_scenario() {
        let (cache, catalog) = harness().await;
        let mut flag = base_flag("paid-only");
        flag.flag_type = FlagType::String;
        flag.default_value = FlagValue::String("basic".into());
        flag.variations = vec![Variation {
            id: "pro".into(),
            value: FlagValue::String("pro".into()),
            weight: None,
        }];
        flag.targeting_rules = vec![TargetingRule::new(
            vec![Condition::new("plan", Operator::Equals, vec!["premium".into()])],
            "pro",
        )];
        catalog.put("production", flag).await;

        let mut attrs = crate::model::AttributeBag::new();
        attrs.insert("plan".into(), AttributeValue::String("premium".into()));
        let request = EvaluationRequest::new(
            "paid-only",
            "production",
            "alice",
            FlagValue::String("basic".into()),
        )
        .with_attributes(attrs);
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.value, FlagValue::String("pro".into()));
        assert_eq!(result.reason, Reason::TargetingMatch);

        let mut attrs = crate::model::AttributeBag::new();
        attrs.insert("plan".into(), AttributeValue::String("free".into()));
        let request = EvaluationRequest::new(
            "paid-only",
            "production",
            "bob",
            FlagValue::String("basic".into()),
        )
        .with_attributes(attrs);
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.value, FlagValue::String("basic".into()));
        assert_eq!(result.reason, Reason::Default);
    }

    // S3: disabled flag bypasses rules entirely.
    #[tokio::test]
    async fn disabled_flag_bypasses_rules() {
        let (cache, catalog) = harness().await;
        let mut flag = base_flag("killswitch");
        flag.enabled = false;
        flag.targeting_rules = vec![TargetingRule::new(
            vec![Condition::new("anything", Operator::Exists, vec![])],
            "on",
        )];
        catalog.put("production", flag).await;

        let request =
            EvaluationRequest::new("killswitch", "production", "whoever", FlagValue::Bool(false));
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.reason, Reason::Disabled);
        assert_eq!(result.value, FlagValue::Bool(false));
    }

    // S5: missing flag.
    #[tokio::test]
    async fn missing_flag_returns_flag_not_found() {
        let (cache, catalog) = harness().await;
        let request = EvaluationRequest::new(
            "does-not-exist",
            "production",
            "user1",
            FlagValue::Bool(false),
        );
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.reason, Reason::FlagNotFound);
        assert_eq!(result.value, FlagValue::Bool(false));
    }

    // S6: empty subject key, flag found — lookup (step 1) resolves before
    // the empty-subject check (step 2), so the ERROR result still carries
    // the real flag version.
    #[tokio::test]
    async fn empty_subject_key_errors() {
        let (cache, catalog) = harness().await;
        let mut flag = base_flag("any-flag");
        flag.version = 7;
        catalog.put("production", flag).await;
        let request = EvaluationRequest::new("any-flag", "production", "", FlagValue::Bool(false));
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.reason, Reason::Error);
        assert_eq!(result.flag_version, 7);
    }

    // Empty subject key, flag missing — step 1's lookup fails before step
    // 2 is ever reached, so this is FLAG_NOT_FOUND, not ERROR.
    #[tokio::test]
    async fn empty_subject_key_against_missing_flag_is_flag_not_found() {
        let (cache, catalog) = harness().await;
        let request = EvaluationRequest::new(
            "does-not-exist",
            "production",
            "",
            FlagValue::Bool(false),
        );
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.reason, Reason::FlagNotFound);
    }

    #[tokio::test]
    async fn two_evaluations_without_mutation_are_identical() {
        let (cache, catalog) = harness().await;
        catalog.put("production", base_flag("stable-flag")).await;
        let request =
            EvaluationRequest::new("stable-flag", "production", "user1", FlagValue::Bool(false));
        let first = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        let second = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(first.value, second.value);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.variation_id, second.variation_id);
        assert_eq!(first.flag_version, second.flag_version);
    }

    // Variant-typed flag, end to end: each candidate variation carries its
    // own `FlagValue::Variant { variation_id, value }`, and a targeting
    // match resolves to the matched variation's own value, not just its id.
    #[tokio::test]
    async fn variant_flag_resolves_through_targeting_match_and_default() {
        let (cache, catalog) = harness().await;
        let mut flag = base_flag("experiment");
        flag.flag_type = FlagType::Variant;
        flag.default_value = FlagValue::Variant {
            variation_id: "control".into(),
            value: serde_json::json!("A"),
        };
        flag.variations = vec![
            Variation {
                id: "control".into(),
                value: FlagValue::Variant {
                    variation_id: "control".into(),
                    value: serde_json::json!("A"),
                },
                weight: None,
            },
            Variation {
                id: "treatment".into(),
                value: FlagValue::Variant {
                    variation_id: "treatment".into(),
                    value: serde_json::json!("B"),
                },
                weight: None,
            },
        ];
        flag.targeting_rules = vec![TargetingRule::new(
            vec![Condition::new("beta", Operator::Equals, vec!["true".into()])],
            "treatment",
        )];
        catalog.put("production", flag).await;

        let default_value = FlagValue::Variant {
            variation_id: "control".into(),
            value: serde_json::json!("A"),
        };

        let mut attrs = crate::model::AttributeBag::new();
        attrs.insert("beta".into(), AttributeValue::String("true".into()));
        let request =
            EvaluationRequest::new("experiment", "production", "user1", default_value.clone())
                .with_attributes(attrs);
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.reason, Reason::TargetingMatch);
        assert_eq!(result.variation_id.as_deref(), Some("treatment"));
        assert_eq!(
            result.value,
            FlagValue::Variant {
                variation_id: "treatment".into(),
                value: serde_json::json!("B"),
            }
        );

        let request =
            EvaluationRequest::new("experiment", "production", "user2", default_value.clone());
        let result = evaluate(&cache, &catalog, &EngineConfig::default(), &request).await;
        assert_eq!(result.reason, Reason::Default);
        assert_eq!(result.value, default_value);
    }
}
