//! Evaluation API: binds the wire request/response shapes to the
//! evaluator, and exposes the general and "ultra-fast" (T1-only) surfaces.
//! HTTP routing, auth, and API-key issuance live in the service layer
//! that embeds this crate — this module only translates JSON in and out
//! and tracks the counters the stats endpoint reports.
//!
//! This is a thin binding over a typed core: one typed
//! `EvaluationRequest`/`EvaluationResult` pair rather than a method per
//! value type, since `FlagValue` is already a tagged union.

use crate::cache::{FlagCache, TierStats};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::evaluator::{self, evaluate_flag};
use crate::model::{AttributeBag, AttributeValue, EvaluationRequest, FlagValue, Reason};
use crate::stats::{EvaluationStats, ReservoirSampler};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// `{ flag_key, environment_key, user_key, attributes }`.
#[derive(Debug, Clone, Deserialize)]
pub struct WireEvaluationRequest {
    pub flag_key: String,
    pub environment_key: String,
    pub user_key: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    /// Not part of the wire contract's required fields, but every caller
    /// needs a fallback value to hand the evaluator; the HTTP layer
    /// (out of scope) is expected to supply one from the flag's known
    /// type, the same way the client-supplied default flows through
    /// `EvaluationRequest` today.
    #[serde(default)]
    pub default_value: Option<serde_json::Value>,
}

/// `{ flag_key, value, variation_id?, reason, default, flag_version,
/// evaluation_time_ms, cached }`.
#[derive(Debug, Clone, Serialize)]
pub struct WireEvaluationResponse {
    pub flag_key: String,
    pub value: serde_json::Value,
    pub variation_id: Option<String>,
    pub reason: String,
    pub default: bool,
    pub flag_version: u64,
    pub evaluation_time_ms: f64,
    pub cached: bool,
}

/// `{ error, code }`, surfaced with an HTTP 4xx/5xx by the (out-of-scope)
/// transport layer — this module only produces the body.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    pub error: String,
    pub code: &'static str,
}

/// `{ t1, t2, t3, evaluations }` — the stats endpoint's wire shape.
/// `t3` is `None` whenever no shared cache is configured, matching
/// `CacheStats::t3`.
#[derive(Debug, Clone, Serialize)]
pub struct WireStatsResponse {
    pub t1: TierStats,
    pub t2: TierStats,
    pub t3: Option<TierStats>,
    pub evaluations: EvaluationStats,
    pub fast_path_misses: u64,
}

impl From<EngineError> for WireError {
    fn from(err: EngineError) -> Self {
        let code = match &err {
            EngineError::FlagNotFound(_) => "FLAG_NOT_FOUND",
            EngineError::InvalidRequest(_) => "INVALID_REQUEST",
            EngineError::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            EngineError::InvalidFlag(_) => "INVALID_FLAG",
            EngineError::Internal(_) => "INTERNAL",
        };
        Self {
            error: err.to_string(),
            code,
        }
    }
}

fn json_to_attribute(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => AttributeValue::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => AttributeValue::String(s.clone()),
        serde_json::Value::Array(items) => {
            AttributeValue::List(items.iter().map(json_to_attribute).collect())
        }
        serde_json::Value::Object(fields) => AttributeValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

fn json_to_flag_value(value: &Option<serde_json::Value>) -> FlagValue {
    match value {
        Some(serde_json::Value::Bool(b)) => FlagValue::Bool(*b),
        Some(serde_json::Value::String(s)) => FlagValue::String(s.clone()),
        Some(serde_json::Value::Number(n)) => FlagValue::Number(n.as_f64().unwrap_or(0.0)),
        Some(other @ serde_json::Value::Object(_)) | Some(other @ serde_json::Value::Array(_)) => {
            FlagValue::Json(other.clone())
        }
        _ => FlagValue::Bool(false),
    }
}

fn reason_label(reason: Reason) -> &'static str {
    match reason {
        Reason::Disabled => "DISABLED",
        Reason::Default => "DEFAULT",
        Reason::TargetingMatch => "TARGETING_MATCH",
        Reason::Rollout => "ROLLOUT",
        Reason::FlagNotFound => "FLAG_NOT_FOUND",
        Reason::Error => "ERROR",
    }
}

impl WireEvaluationRequest {
    fn into_request(self) -> Result<EvaluationRequest, WireError> {
        if self.flag_key.is_empty() || self.environment_key.is_empty() {
            return Err(WireError {
                error: "flag_key and environment_key are required".into(),
                code: "INVALID_REQUEST",
            });
        }
        let attributes: AttributeBag = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), json_to_attribute(v)))
            .collect();
        Ok(
            EvaluationRequest::new(
                self.flag_key,
                self.environment_key,
                self.user_key,
                json_to_flag_value(&self.default_value),
            )
            .with_attributes(attributes),
        )
    }
}

/// Evaluation counters backing the `evaluations` section of the stats
/// endpoint, shared between the general and ultra-fast surfaces so
/// both contribute to the same latency reservoir.
#[derive(Default)]
pub struct ApiStats {
    pub reservoir: ReservoirSampler,
    /// Requests served by the ultra-fast path that missed T1 and fell
    /// back to the general path — "a dedicated miss counter".
    pub fast_path_misses: AtomicU64,
}

/// Translates wire requests into evaluator calls and back. Exposes both
/// `evaluate` (all tiers, full statistics) and `evaluate_fast` (T1 only,
/// falling back to `evaluate` on a miss). Both MUST return
/// byte-identical `value`/`variation_id`/`reason` for the same (flag
/// state, request) — a hard invariant, not just a convention.
pub struct EvaluationApi {
    cache: Arc<FlagCache>,
    catalog: Arc<dyn Catalog>,
    config: EngineConfig,
    stats: ApiStats,
}

impl EvaluationApi {
    pub fn new(cache: Arc<FlagCache>, catalog: Arc<dyn Catalog>, config: EngineConfig) -> Self {
        Self {
            cache,
            catalog,
            config,
            stats: ApiStats::default(),
        }
    }

    pub fn stats(&self) -> &ApiStats {
        &self.stats
    }

    /// Assembles the stats endpoint's wire shape: `{ t1, t2, t3,
    /// evaluations }`. Cache tier counters come from the cache itself;
    /// `evaluations` comes from this API's own reservoir, which both the
    /// general and ultra-fast paths record into.
    pub fn stats_response(&self) -> WireStatsResponse {
        let cache_stats = self.cache.stats();
        WireStatsResponse {
            t1: cache_stats.t1,
            t2: cache_stats.t2,
            t3: cache_stats.t3,
            evaluations: self.stats.reservoir.snapshot(),
            fast_path_misses: self.stats.fast_path_misses.load(Ordering::Relaxed),
        }
    }

    /// General evaluation path: all tiers, full statistics.
    pub async fn evaluate(
        &self,
        request: WireEvaluationRequest,
    ) -> Result<WireEvaluationResponse, WireError> {
        let request = request.into_request()?;
        let result = evaluator::evaluate(&self.cache, self.catalog.as_ref(), &self.config, &request).await;
        self.stats.reservoir.record(result.evaluation_nanos);
        Ok(to_wire_response(&request.flag_key, result))
    }

    /// Ultra-fast path: T1 only. A miss falls back to the general path
    /// (which will load through T2/T3/catalog and populate T1 over
    /// subsequent hits) and records a dedicated miss counter rather than
    /// silently absorbing the cost into the general path's stats.
    pub async fn evaluate_fast(
        &self,
        request: WireEvaluationRequest,
    ) -> Result<WireEvaluationResponse, WireError> {
        let request = request.into_request()?;
        let start = Instant::now();

        if request.subject_key.is_empty() {
            let result = evaluator::evaluate(&self.cache, self.catalog.as_ref(), &self.config, &request).await;
            self.stats.reservoir.record(result.evaluation_nanos);
            return Ok(to_wire_response(&request.flag_key, result));
        }

        match self.cache.get_hot_only(&request.environment_key, &request.flag_key) {
            Some(flag) => {
                let result = evaluate_flag(&flag, self.config.hash_seed, &request, true, start);
                self.stats.reservoir.record(result.evaluation_nanos);
                Ok(to_wire_response(&request.flag_key, result))
            }
            None => {
                self.stats.fast_path_misses.fetch_add(1, Ordering::Relaxed);
                let result =
                    evaluator::evaluate(&self.cache, self.catalog.as_ref(), &self.config, &request).await;
                self.stats.reservoir.record(result.evaluation_nanos);
                Ok(to_wire_response(&request.flag_key, result))
            }
        }
    }
}

fn to_wire_response(
    flag_key: &str,
    result: crate::model::EvaluationResult,
) -> WireEvaluationResponse {
    WireEvaluationResponse {
        flag_key: flag_key.to_string(),
        value: result.value.to_json(),
        variation_id: result.variation_id,
        reason: reason_label(result.reason).to_string(),
        default: result.is_default_or_error(),
        flag_version: result.flag_version,
        evaluation_time_ms: result.evaluation_nanos as f64 / 1_000_000.0,
        cached: result.cached,
    }
}
