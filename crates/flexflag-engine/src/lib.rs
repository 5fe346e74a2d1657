//! # FlexFlag evaluation engine
//!
//! A feature-flag evaluation engine and multi-tier cache: given a flag
//! catalog and a subject, resolves a typed value through targeting rules
//! and percentage rollouts, with a three-tier cache (hot in-process, TTL,
//! optional shared remote) sitting in front of the catalog so repeat
//! evaluations never pay a network round trip.
//!
//! ## Core components
//!
//! - **Hasher** ([`hash`]) — deterministic bucketing of a subject into one
//!   of 10,000 buckets via a seeded murmur3 variant, shared by every
//!   consistent-hash decision the engine makes.
//! - **Rule Matcher** ([`matcher`]) — evaluates a targeting rule's
//!   conditions against a subject's attribute bag.
//! - **Rollout Evaluator** ([`rollout`]) — splits traffic across a flag's
//!   variations (or nested segments) by cumulative weight over the
//!   hasher's bucket space.
//! - **Flag Evaluator** ([`evaluator`]) — orchestrates lookup, the
//!   disabled check, targeting rules, and rollout into one typed result.
//! - **Flag Cache** ([`cache`]) — the T1 (hot)/T2 (TTL)/T3 (shared) cache
//!   sitting between the evaluator and the catalog.
//! - **Subscription Bus** ([`bus`]) — fans catalog change events out to
//!   interested subscribers (caches, connected clients).
//! - **Evaluation API** ([`api`]) — the wire-shaped request/response
//!   binding over the evaluator, with a general path and a T1-only
//!   "ultra-fast" path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use flexflag_engine::api::{EvaluationApi, WireEvaluationRequest};
//! use flexflag_engine::cache::{CacheConfig, FlagCache};
//! use flexflag_engine::catalog::InMemoryCatalog;
//! use flexflag_engine::config::EngineConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let catalog = Arc::new(InMemoryCatalog::new());
//!     let cache = Arc::new(FlagCache::new(CacheConfig::default()));
//!     let api = EvaluationApi::new(cache, catalog, EngineConfig::from_env());
//!
//!     let response = api
//!         .evaluate(WireEvaluationRequest {
//!             flag_key: "new-checkout".into(),
//!             environment_key: "production".into(),
//!             user_key: "user-123".into(),
//!             attributes: Default::default(),
//!             default_value: Some(serde_json::json!(false)),
//!         })
//!         .await;
//!     println!("{response:?}");
//! }
//! ```

pub mod api;
pub mod bus;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod hash;
pub mod matcher;
pub mod model;
pub mod rollout;
pub mod stats;

pub use cache::{CacheConfig, FlagCache};
pub use catalog::{Catalog, InMemoryCatalog};
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use model::{EvaluationRequest, EvaluationResult, Flag, FlagValue, Reason};
