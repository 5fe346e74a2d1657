//! Engine configuration: every tunable knob, collected into one struct
//! loadable from environment variables with documented defaults.
//!
//! Precedence is always env var present and parseable, else a hardcoded
//! default, under the `FLEXFLAG_*` prefix convention.

use std::time::Duration;

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// `cache.t1.*` — the hot-tier, lock-free-read cache.
#[derive(Debug, Clone)]
pub struct T1Config {
    /// Hot-tier capacity. Default 10000.
    pub max_entries: usize,
}

impl Default for T1Config {
    fn default() -> Self {
        Self {
            max_entries: env_or("FLEXFLAG_CACHE_T1_MAX_ENTRIES", 10_000),
        }
    }
}

/// `cache.t2.*` — the sharded TTL cache.
#[derive(Debug, Clone)]
pub struct T2Config {
    /// TTL-tier entry lifetime. Default 300s.
    pub ttl: Duration,
    /// Shard count, must be a power of two. Default 16.
    pub shards: usize,
    /// Background sweeper cadence. Default 60s.
    pub sweep_interval: Duration,
}

impl Default for T2Config {
    fn default() -> Self {
        let shards = env_or("FLEXFLAG_CACHE_T2_SHARDS", 16usize);
        Self {
            ttl: Duration::from_secs(env_or("FLEXFLAG_CACHE_T2_TTL_SECONDS", 300)),
            shards: shards.next_power_of_two(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// `cache.t3.*` — the optional shared remote cache.
#[derive(Debug, Clone)]
pub struct T3Config {
    pub enabled: bool,
    pub connection_url: Option<String>,
}

impl Default for T3Config {
    fn default() -> Self {
        Self {
            enabled: env_or("FLEXFLAG_CACHE_T3_ENABLED", false),
            connection_url: std::env::var("FLEXFLAG_CACHE_T3_URL").ok(),
        }
    }
}

/// Top-level engine configuration, collecting every tunable knob.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub t1: T1Config,
    pub t2: T2Config,
    pub t3: T3Config,
    /// `hash.seed` — seeds the murmur variant; part of the wire contract,
    /// changing it reassigns every subject's bucket. Default 0.
    pub hash_seed: u32,
    /// `evaluation.deadline_ms` — per-request deadline for the catalog
    /// read on a cache miss. Default 50ms.
    pub evaluation_deadline: Duration,
}

impl EngineConfig {
    /// Reads every `FLEXFLAG_*` variable, falling back to documented
    /// defaults for anything absent or unparseable.
    pub fn from_env() -> Self {
        Self {
            t1: T1Config::default(),
            t2: T2Config::default(),
            t3: T3Config::default(),
            hash_seed: env_or("FLEXFLAG_HASH_SEED", 0),
            evaluation_deadline: Duration::from_millis(env_or(
                "FLEXFLAG_EVALUATION_DEADLINE_MS",
                50,
            )),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
