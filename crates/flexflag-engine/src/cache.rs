//! Flag cache: three read tiers, T1 → T2 → T3, backing the evaluator's
//! lookup step.
//!
//! T1 is copy-on-write snapshot publishing over `ArcSwap`, so reads never
//! take a lock; T2 is a sharded `RwLock` map with lazy expiry-on-read plus
//! a background sweeper; T3 is a pluggable read-through/write-through seam
//! over an external store.

use crate::config::{T1Config, T2Config};
use crate::error::EngineError;
use crate::model::Flag;
use arc_swap::ArcSwap;
use lru::LruCache;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// `(environment_key, flag_key)` — every tier partitions by environment.
pub type CacheKey = (String, String);

/// Which tier satisfied a `get` — carried into `EvaluationResult::cached`
/// by the evaluator (any tier hit counts as `cached = true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Hot,
    Ttl,
    Shared,
}

/// `{ flag snapshot, expires_at, inserted_version }`.
pub struct CachedFlag {
    pub flag: Arc<Flag>,
    pub expires_at: Instant,
    pub inserted_version: u64,
}

/// A flag evaluated this many times through a single T2 hit is promoted
/// into T1 — an internal heuristic for "populated for flags evaluated
/// above a request-rate threshold," not itself an exposed config knob.
const PROMOTE_AFTER_HITS: u32 = 5;

/// T1 — the hot tier. Readers load an `ArcSwap` snapshot and never take
/// a lock; writers build a new `HashMap` and swap the pointer atomically
/// (snapshot replacement over in-place mutation). A `write_lock` mutex
/// serializes concurrent writers around the read-modify-swap sequence —
/// reads are never blocked by it.
struct HotTier {
    snapshot: ArcSwap<HashMap<CacheKey, Arc<CachedFlag>>>,
    access_counts: Mutex<HashMap<CacheKey, u64>>,
    write_lock: Mutex<()>,
    max_entries: usize,
    hits: AtomicU64,
    evictions: AtomicU64,
}

impl HotTier {
    fn new(max_entries: usize) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            access_counts: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
            max_entries,
            hits: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<CachedFlag>> {
        let snapshot = self.snapshot.load();
        let entry = snapshot.get(key)?.clone();
        self.hits.fetch_add(1, Ordering::Relaxed);
        // Access-counter sampling for LRU eviction: best-effort,
        // never blocks a reader waiting on a writer holding this lock.
        if let Ok(mut counts) = self.access_counts.try_lock() {
            *counts.entry(key.clone()).or_insert(0) += 1;
        }
        Some(entry)
    }

    fn peek_version(&self, key: &CacheKey) -> Option<u64> {
        self.snapshot.load().get(key).map(|e| e.inserted_version)
    }

    fn put(&self, key: CacheKey, entry: Arc<CachedFlag>) {
        let _guard = self.write_lock.lock().unwrap();
        let current = self.snapshot.load();
        let mut next: HashMap<CacheKey, Arc<CachedFlag>> = (**current).clone();
        next.insert(key, entry);

        if next.len() > self.max_entries {
            let mut counts = self.access_counts.lock().unwrap();
            let overflow = next.len() - self.max_entries;
            let mut by_access: Vec<(CacheKey, u64)> = next
                .keys()
                .map(|k| (k.clone(), *counts.get(k).unwrap_or(&0)))
                .collect();
            by_access.sort_by_key(|(_, count)| *count);
            for (stale_key, _) in by_access.into_iter().take(overflow) {
                next.remove(&stale_key);
                counts.remove(&stale_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.snapshot.store(Arc::new(next));
    }

    fn remove(&self, key: &CacheKey) {
        let _guard = self.write_lock.lock().unwrap();
        let current = self.snapshot.load();
        if !current.contains_key(key) {
            return;
        }
        let mut next = (**current).clone();
        next.remove(key);
        self.snapshot.store(Arc::new(next));
        self.access_counts.lock().unwrap().remove(key);
    }

    fn remove_env(&self, env: &str) {
        let _guard = self.write_lock.lock().unwrap();
        let current = self.snapshot.load();
        let mut next = (**current).clone();
        next.retain(|(e, _), _| e != env);
        self.snapshot.store(Arc::new(next));
        self.access_counts
            .lock()
            .unwrap()
            .retain(|(e, _), _| e != env);
    }

    fn len(&self) -> usize {
        self.snapshot.load().len()
    }
}

/// One shard of T2: a plain `RwLock<HashMap<..>>` scoped to a fraction
/// of the keyspace, so a write to one shard never blocks a reader or
/// writer on another.
struct TtlShard {
    entries: RwLock<HashMap<CacheKey, Arc<CachedFlag>>>,
}

/// T2 — the TTL tier. Sharded by key hash so concurrent writers to
/// different shards never contend; a background sweeper (spawned by
/// `FlagCache::spawn_sweeper`) periodically drops expired entries instead
/// of relying solely on lazy expiry-on-read.
struct TtlTier {
    shards: Vec<TtlShard>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl TtlTier {
    fn new(config: &T2Config) -> Self {
        let shards = (0..config.shards)
            .map(|_| TtlShard {
                entries: RwLock::new(HashMap::new()),
            })
            .collect();
        Self {
            shards,
            ttl: config.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn shard_for(&self, key: &CacheKey) -> &TtlShard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<CachedFlag>> {
        let shard = self.shard_for(key);
        let entries = shard.entries.read().unwrap();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            // Expired entries read as a miss; the sweeper reclaims the
            // map space later rather than on this read path.
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn peek_version(&self, key: &CacheKey) -> Option<u64> {
        let shard = self.shard_for(key);
        shard
            .entries
            .read()
            .unwrap()
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.inserted_version)
    }

    fn put(&self, key: CacheKey, entry: Arc<CachedFlag>) {
        let shard = self.shard_for(&key);
        shard.entries.write().unwrap().insert(key, entry);
    }

    fn remove(&self, key: &CacheKey) {
        let shard = self.shard_for(key);
        shard.entries.write().unwrap().remove(key);
    }

    fn remove_env(&self, env: &str) {
        for shard in &self.shards {
            shard.entries.write().unwrap().retain(|(e, _), _| e != env);
        }
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| s.entries.read().unwrap().len()).sum()
    }

    /// Scans every shard under its own write lock, dropping expired
    /// entries. Run on a fixed cadence by `FlagCache::spawn_sweeper`.
    fn sweep(&self) {
        let now = Instant::now();
        for shard in &self.shards {
            let mut entries = shard.entries.write().unwrap();
            let before = entries.len();
            entries.retain(|_, entry| entry.expires_at > now);
            let removed = before - entries.len();
            if removed > 0 {
                self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            }
        }
    }
}

/// T3 — the optional shared remote cache. A trait so a real remote
/// client can be swapped in; `load_flag` on the `Catalog` side is the
/// analogous seam for the durable store.
#[async_trait::async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, env: &str, key: &str) -> Result<Option<Flag>, EngineError>;
    async fn put(&self, env: &str, flag: &Flag) -> Result<(), EngineError>;
    async fn invalidate(&self, env: &str, key: &str) -> Result<(), EngineError>;
}

/// In-memory stand-in for a real remote key-value store. The actual
/// backend (e.g. a distributed cache) is out of scope; this adapter
/// exercises the T3 seam and its network-fault-falls-back-to-catalog
/// contract without requiring one. Bounded by an `lru::LruCache` rather
/// than an unbounded map — a stand-in for a remote store should still
/// behave like one under memory pressure, not grow forever.
pub struct InMemorySharedCache {
    entries: tokio::sync::Mutex<LruCache<CacheKey, Flag>>,
}

/// Entry cap for the in-memory T3 stand-in. A real shared cache would
/// size this from its own deployment; this is just large enough that
/// tests and local development never observe eviction.
const DEFAULT_SHARED_CACHE_CAPACITY: usize = 50_000;

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SHARED_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            entries: tokio::sync::Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, env: &str, key: &str) -> Result<Option<Flag>, EngineError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(env.to_string(), key.to_string()))
            .cloned())
    }

    async fn put(&self, env: &str, flag: &Flag) -> Result<(), EngineError> {
        self.entries
            .lock()
            .await
            .put((env.to_string(), flag.key.clone()), flag.clone());
        Ok(())
    }

    async fn invalidate(&self, env: &str, key: &str) -> Result<(), EngineError> {
        self.entries
            .lock()
            .await
            .pop(&(env.to_string(), key.to_string()));
        Ok(())
    }
}

/// `cache.t1.*` / `cache.t2.*` configuration, grouped for `FlagCache::new`.
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    pub t1: T1Config,
    pub t2: T2Config,
}

/// `{ hits, size, evictions }` / `{ hits, misses, expirations, size }` —
/// the per-tier shape the stats endpoint returns.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub t1: TierStats,
    pub t2: TierStats,
    pub t3: Option<TierStats>,
}

/// The full three-tier cache the evaluator reads through.
///
/// `get` only ever touches T1/T2 and never suspends: T1 reads use an
/// atomic pointer load, T2 reads acquire a shared read lock briefly. T3
/// is reached only through `get_through_shared`, a separate async method
/// the evaluator calls on a T1/T2 miss before falling back to the
/// catalog — T3 is explicitly off the hot path.
pub struct FlagCache {
    config: CacheConfig,
    hot: HotTier,
    ttl: TtlTier,
    shared: Option<Arc<dyn SharedCache>>,
    promote_counts: Mutex<HashMap<CacheKey, u32>>,
}

impl FlagCache {
    pub fn new(config: CacheConfig) -> Self {
        let hot = HotTier::new(config.t1.max_entries);
        let ttl = TtlTier::new(&config.t2);
        Self {
            config,
            hot,
            ttl,
            shared: None,
            promote_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_shared(config: CacheConfig, shared: Arc<dyn SharedCache>) -> Self {
        let mut cache = Self::new(config);
        cache.shared = Some(shared);
        cache
    }

    /// T1 → T2 lookup. Never touches T3 or the catalog; a full miss here
    /// just means "not resident," not "doesn't exist."
    pub fn get(&self, env: &str, key: &str) -> Option<(Arc<Flag>, CacheTier)> {
        let cache_key = (env.to_string(), key.to_string());

        if let Some(entry) = self.hot.get(&cache_key) {
            return Some((entry.flag.clone(), CacheTier::Hot));
        }

        if let Some(entry) = self.ttl.get(&cache_key) {
            self.maybe_promote(&cache_key, &entry);
            return Some((entry.flag.clone(), CacheTier::Ttl));
        }

        None
    }

    /// T1-only lookup for the ultra-fast evaluation path — never
    /// consults T2, T3, or the catalog, and never promotes. A miss here
    /// means only "not hot," the caller is expected to fall back to the
    /// general path.
    pub fn get_hot_only(&self, env: &str, key: &str) -> Option<Arc<Flag>> {
        let cache_key = (env.to_string(), key.to_string());
        self.hot.get(&cache_key).map(|entry| entry.flag.clone())
    }

    fn maybe_promote(&self, key: &CacheKey, entry: &Arc<CachedFlag>) {
        let mut counts = self.promote_counts.lock().unwrap();
        let count = counts.entry(key.clone()).or_insert(0);
        *count += 1;
        if *count >= PROMOTE_AFTER_HITS {
            *count = 0;
            drop(counts);
            self.hot.put(key.clone(), entry.clone());
        }
    }

    /// T3 read-through on a T1/T2 miss. A network fault (or no T3
    /// configured) returns `None` and the caller falls back to the
    /// catalog directly — this method never surfaces a transport error
    /// of its own.
    pub async fn get_through_shared(&self, env: &str, key: &str) -> Option<Arc<Flag>> {
        let shared = self.shared.as_ref()?;
        match shared.get(env, key).await {
            Ok(Some(flag)) => {
                let flag_arc = Arc::new(flag.clone());
                self.put(env, flag);
                Some(flag_arc)
            }
            Ok(None) | Err(_) => None,
        }
    }

    /// Write-through into T3 after a successful catalog load. Best
    /// effort: a failure here never fails the evaluation that triggered
    /// it.
    pub async fn backfill_shared(&self, env: &str, flag: &Flag) {
        if let Some(shared) = &self.shared {
            let _ = shared.put(env, flag).await;
        }
    }

    /// Inserts into T1 and T2. Rejects a structurally invalid flag
    /// outright and rejects a `flag.version` older than what's already
    /// cached. Equal versions are accepted — last-writer-wins is fine
    /// when contents are identical by invariant.
    pub fn put(&self, env: impl Into<String>, flag: Flag) -> bool {
        if let Err(reason) = flag.validate() {
            tracing::warn!(reason = %reason, "rejecting structurally invalid flag at cache insertion");
            return false;
        }

        let env = env.into();
        let key = (env, flag.key.clone());

        if let Some(existing_version) = self.current_version(&key) {
            if flag.version < existing_version {
                return false;
            }
        }

        let inserted_version = flag.version;
        let expires_at = Instant::now() + self.config.t2.ttl;
        let entry = Arc::new(CachedFlag {
            flag: Arc::new(flag),
            expires_at,
            inserted_version,
        });

        self.hot.put(key.clone(), entry.clone());
        self.ttl.put(key, entry);
        true
    }

    fn current_version(&self, key: &CacheKey) -> Option<u64> {
        self.hot.peek_version(key).or_else(|| self.ttl.peek_version(key))
    }

    /// Removes `key` from every tier. A second call for the same key is
    /// a no-op.
    pub async fn invalidate(&self, env: &str, key: &str) {
        let cache_key = (env.to_string(), key.to_string());
        self.hot.remove(&cache_key);
        self.ttl.remove(&cache_key);
        if let Some(shared) = &self.shared {
            let _ = shared.invalidate(env, key).await;
        }
    }

    /// Bulk-drops every entry for `env` from T1 and T2. T3 has no
    /// bulk-invalidate in this trait — a real remote backend would rely
    /// on its own TTL to reclaim stale entries instead.
    pub async fn invalidate_env(&self, env: &str) {
        self.hot.remove_env(env);
        self.ttl.remove_env(env);
    }

    /// Primes the cache by iterating a catalog environment. Idempotent
    /// (each `put` is itself version-gated) and safe to abandon partway
    /// through — an interrupted warm-up just leaves some flags to be
    /// loaded lazily on their first miss.
    pub async fn warm_up(
        &self,
        catalog: &dyn crate::catalog::Catalog,
        env: &str,
    ) -> Result<usize, EngineError> {
        let flags = catalog.list_env(env).await?;
        let mut primed = 0;
        for flag in flags {
            if self.put(env, (*flag).clone()) {
                primed += 1;
            }
        }
        Ok(primed)
    }

    /// Spawns the T2 background sweeper at the configured cadence.
    /// Callers own explicit shutdown via the returned handle — there is
    /// no hidden singleton sweeper.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        let interval = self.config.t2.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                cache.ttl.sweep();
            }
        })
    }

    /// Subscribes to `catalog`'s events for `env`, applies its hello
    /// snapshot immediately, then keeps the cache in sync as incremental
    /// events arrive: a `created`/`updated` event is applied via the same
    /// version-gated `put` a catalog load would use, and a `deleted`
    /// event drops the key from every tier. Snapshot and subscription are
    /// delivered atomically by the catalog, so nothing published after
    /// the snapshot was taken can be missed here. One task per
    /// environment a caller cares about keeping warm, with explicit
    /// shutdown via the returned handle rather than a hidden background
    /// singleton.
    pub async fn spawn_bus_listener(
        self: &Arc<Self>,
        catalog: &dyn crate::catalog::Catalog,
        env: &str,
    ) -> tokio::task::JoinHandle<()> {
        let (snapshot, mut receiver) = catalog.subscribe(env).await;
        for flag in snapshot {
            self.put(env, (*flag).clone());
        }

        let cache = self.clone();
        let env = env.to_string();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => match event.event_type {
                        crate::bus::EventType::Created | crate::bus::EventType::Updated => {
                            if let Some(flag) = event.flag_snapshot {
                                cache.put(env.clone(), (*flag).clone());
                            }
                        }
                        crate::bus::EventType::Deleted => {
                            cache.invalidate(&env, &event.flag_key).await;
                        }
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            t1: TierStats {
                hits: self.hot.hits.load(Ordering::Relaxed),
                misses: 0,
                size: self.hot.len(),
                evictions: self.hot.evictions.load(Ordering::Relaxed),
                expirations: 0,
            },
            t2: TierStats {
                hits: self.ttl.hits.load(Ordering::Relaxed),
                misses: self.ttl.misses.load(Ordering::Relaxed),
                size: self.ttl.len(),
                evictions: 0,
                expirations: self.ttl.expirations.load(Ordering::Relaxed),
            },
            t3: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FlagType, FlagValue};
    use chrono::Utc;
    use test_log::test;

    fn flag(key: &str, version: u64) -> Flag {
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
            version,
            updated_at: Utc::now(),
        }
    }

    fn small_cache() -> FlagCache {
        FlagCache::new(CacheConfig {
            t1: T1Config { max_entries: 2 },
            t2: T2Config {
                ttl: Duration::from_secs(300),
                shards: 4,
                sweep_interval: Duration::from_secs(60),
            },
        })
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = small_cache();
        cache.put("production", flag("f1", 1));
        let (got, tier) = cache.get("production", "f1").unwrap();
        assert_eq!(got.version, 1);
        assert_eq!(tier, CacheTier::Hot);
    }

    #[test]
    fn put_rejects_older_version() {
        let cache = small_cache();
        cache.put("production", flag("f1", 5));
        assert!(!cache.put("production", flag("f1", 4)));
        assert_eq!(cache.get("production", "f1").unwrap().0.version, 5);
    }

    #[test]
    fn put_accepts_newer_version() {
        let cache = small_cache();
        cache.put("production", flag("f1", 1));
        assert!(cache.put("production", flag("f1", 2)));
        assert_eq!(cache.get("production", "f1").unwrap().0.version, 2);
    }

    #[test]
    fn put_rejects_structurally_invalid_flag() {
        let cache = small_cache();
        let mut bad = flag("bad", 1);
        bad.rollout_plan = Some(crate::model::RolloutPlan {
            rollout_type: crate::model::RolloutType::Percentage,
            salt: "s".into(),
            variations: vec![crate::model::RolloutVariation {
                variation_id: "on".into(),
                weight: 9000,
            }],
            segment_rules: vec![],
        });
        assert!(!cache.put("production", bad));
        assert!(cache.get("production", "bad").is_none());
    }

    #[test(tokio::test)]
    async fn invalidate_removes_from_all_tiers() {
        let cache = small_cache();
        cache.put("production", flag("f1", 1));
        cache.invalidate("production", "f1").await;
        assert!(cache.get("production", "f1").is_none());
    }

    #[test(tokio::test)]
    async fn double_invalidation_is_a_no_op() {
        let cache = small_cache();
        cache.put("production", flag("f1", 1));
        cache.invalidate("production", "f1").await;
        cache.invalidate("production", "f1").await;
        assert!(cache.get("production", "f1").is_none());
    }

    #[test(tokio::test)]
    async fn invalidate_env_bulk_drops_only_that_environment() {
        let cache = small_cache();
        cache.put("production", flag("f1", 1));
        cache.put("staging", flag("f1", 1));
        cache.invalidate_env("production").await;
        assert!(cache.get("production", "f1").is_none());
        assert!(cache.get("staging", "f1").is_some());
    }

    #[test]
    fn hot_tier_evicts_least_accessed_entry_over_capacity() {
        let cache = small_cache(); // max_entries = 2
        cache.put("production", flag("f1", 1));
        cache.put("production", flag("f2", 1));
        // Access f1 repeatedly so f2 is the coldest entry.
        for _ in 0..3 {
            cache.get("production", "f1");
        }
        cache.put("production", flag("f3", 1));

        let stats = cache.stats();
        assert_eq!(stats.t1.size, 2);
        assert!(cache.hot_contains("production", "f1"));
    }

    // S4: concurrent access. Readers racing a v1 -> v2 put must never
    // observe a version going backwards, and every reader that keeps
    // polling must eventually observe v2.
    #[test(tokio::test)]
    async fn concurrent_get_put_never_observes_a_version_regression() {
        let cache = Arc::new(small_cache());
        cache.put("production", flag("racer", 1));

        let mut readers = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            readers.push(tokio::spawn(async move {
                let mut last_seen = 0u64;
                let mut saw_v2 = false;
                for _ in 0..500 {
                    if let Some((got, _)) = cache.get("production", "racer") {
                        assert!(
                            got.version >= last_seen,
                            "observed version {} after previously observing {}",
                            got.version,
                            last_seen
                        );
                        last_seen = got.version;
                        if got.version == 2 {
                            saw_v2 = true;
                        }
                    }
                    tokio::task::yield_now().await;
                }
                saw_v2
            }));
        }

        let writer_cache = cache.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..50 {
                tokio::task::yield_now().await;
            }
            writer_cache.put("production", flag("racer", 2));
        });

        writer.await.unwrap();
        let mut any_saw_v2 = false;
        for reader in readers {
            if reader.await.unwrap() {
                any_saw_v2 = true;
            }
        }
        assert!(any_saw_v2, "no reader ever observed the v2 put");
        assert_eq!(cache.get("production", "racer").unwrap().0.version, 2);
    }

    impl FlagCache {
        fn hot_contains(&self, env: &str, key: &str) -> bool {
            self.hot
                .peek_version(&(env.to_string(), key.to_string()))
                .is_some()
        }
    }

    #[test]
    fn ttl_tier_treats_expired_entries_as_a_miss() {
        let cache = FlagCache::new(CacheConfig {
            t1: T1Config { max_entries: 0 },
            t2: T2Config {
                ttl: Duration::from_millis(1),
                shards: 1,
                sweep_interval: Duration::from_secs(60),
            },
        });
        cache.put("production", flag("f1", 1));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("production", "f1").is_none());
    }

    #[test]
    fn sweep_reclaims_expired_entries() {
        let cache = FlagCache::new(CacheConfig {
            t1: T1Config { max_entries: 0 },
            t2: T2Config {
                ttl: Duration::from_millis(1),
                shards: 1,
                sweep_interval: Duration::from_secs(60),
            },
        });
        cache.put("production", flag("f1", 1));
        std::thread::sleep(Duration::from_millis(20));
        cache.ttl.sweep();
        assert_eq!(cache.stats().t2.size, 0);
        assert_eq!(cache.stats().t2.expirations, 1);
    }

    #[test(tokio::test)]
    async fn shared_cache_read_through_backfills_local_tiers() {
        let shared = Arc::new(InMemorySharedCache::new());
        shared.put("production", &flag("f1", 1)).await.unwrap();

        let cache = FlagCache::with_shared(
            CacheConfig {
                t1: T1Config { max_entries: 10 },
                t2: T2Config {
                    ttl: Duration::from_secs(300),
                    shards: 4,
                    sweep_interval: Duration::from_secs(60),
                },
            },
            shared,
        );

        assert!(cache.get("production", "f1").is_none());
        let loaded = cache.get_through_shared("production", "f1").await;
        assert_eq!(loaded.unwrap().version, 1);
        assert!(cache.get("production", "f1").is_some());
    }

    #[test(tokio::test)]
    async fn warm_up_primes_every_flag_in_an_environment() {
        let catalog = crate::catalog::InMemoryCatalog::new();
        catalog.put("production", flag("f1", 1)).await;
        catalog.put("production", flag("f2", 1)).await;

        let cache = small_cache();
        let primed = cache.warm_up(&catalog, "production").await.unwrap();
        assert_eq!(primed, 2);
        assert!(cache.get("production", "f1").is_some());
        assert!(cache.get("production", "f2").is_some());
    }

    #[test(tokio::test)]
    async fn bus_listener_applies_updates_and_deletes() {
        let catalog = crate::catalog::InMemoryCatalog::new();
        let cache = Arc::new(small_cache());
        let handle = cache.spawn_bus_listener(&catalog, "production").await;

        catalog.put("production", flag("f1", 1)).await;
        // Give the listener task a turn to process the event.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("production", "f1").unwrap().0.version, 1);

        catalog.delete("production", "f1").await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get("production", "f1").is_none());

        handle.abort();
    }

    // §4.6: state that existed before the listener attached arrives via
    // the hello snapshot, not just events published afterward.
    #[test(tokio::test)]
    async fn bus_listener_applies_hello_snapshot_on_attach() {
        let catalog = crate::catalog::InMemoryCatalog::new();
        catalog.put("production", flag("f1", 1)).await;

        let cache = Arc::new(small_cache());
        let handle = cache.spawn_bus_listener(&catalog, "production").await;
        assert_eq!(cache.get("production", "f1").unwrap().0.version, 1);

        handle.abort();
    }
}
