//! Catalog interface: the durable source of truth the cache reads
//! through on a miss. The catalog itself — the admin UI, the database,
//! the control plane API — lives outside this crate; this module only
//! specifies the contract the cache needs (`load_flag`, `list_env`,
//! `subscribe`) and ships two adapters useful for embedding and tests:
//! an in-memory catalog and a file-backed one.

use crate::bus::{Event, EventType, SubscriptionBus};
use crate::error::EngineError;
use crate::model::Flag;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// The catalog is authoritative; the cache never persists anything it
/// reads through this trait.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn load_flag(&self, env: &str, key: &str) -> Result<Option<Arc<Flag>>, EngineError>;
    async fn list_env(&self, env: &str) -> Result<Vec<Arc<Flag>>, EngineError>;

    /// Subscribes to `env`, returning the state visible at the moment of
    /// subscription (the "hello" snapshot) together with a receiver for
    /// every event published after it. Snapshot and receiver registration
    /// happen atomically under the implementation's state lock, so no
    /// event can land in the gap between reading the snapshot and
    /// starting to receive events.
    async fn subscribe(&self, env: &str) -> (Vec<Arc<Flag>>, broadcast::Receiver<Event>);
}

/// A catalog held entirely in memory. Useful for tests and for embedding
/// the engine in a process that already has the flag set resident
/// (a Cargo-feature-gated caller outside the scope of this crate).
#[derive(Clone)]
pub struct InMemoryCatalog {
    flags: Arc<RwLock<HashMap<(String, String), Arc<Flag>>>>,
    bus: SubscriptionBus,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            flags: Arc::new(RwLock::new(HashMap::new())),
            bus: SubscriptionBus::new(),
        }
    }

    /// Inserts or replaces a flag and publishes an `updated` (or
    /// `created`, if new) event to any subscribers of its environment.
    /// The insert and the publish happen under the same write lock that
    /// `subscribe` takes to build its hello snapshot, so a subscriber
    /// registered concurrently with this call never misses the event nor
    /// double-counts it in its snapshot.
    pub async fn put(&self, env: &str, flag: Flag) {
        let key = (env.to_string(), flag.key.clone());
        let flag = Arc::new(flag);

        let mut guard = self.flags.write().await;
        let existed = guard.contains_key(&key);
        guard.insert(key, flag.clone());
        self.bus.publish(Event {
            event_type: if existed {
                EventType::Updated
            } else {
                EventType::Created
            },
            environment_key: env.to_string(),
            flag_key: flag.key.clone(),
            flag_snapshot: Some(flag.clone()),
            version: flag.version,
        });
    }

    pub async fn delete(&self, env: &str, key: &str) {
        let mut guard = self.flags.write().await;
        let removed = guard.remove(&(env.to_string(), key.to_string()));
        if let Some(flag) = removed {
            self.bus.publish(Event {
                event_type: EventType::Deleted,
                environment_key: env.to_string(),
                flag_key: key.to_string(),
                flag_snapshot: None,
                version: flag.version,
            });
        }
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn load_flag(&self, env: &str, key: &str) -> Result<Option<Arc<Flag>>, EngineError> {
        Ok(self
            .flags
            .read()
            .await
            .get(&(env.to_string(), key.to_string()))
            .cloned())
    }

    async fn list_env(&self, env: &str) -> Result<Vec<Arc<Flag>>, EngineError> {
        Ok(self
            .flags
            .read()
            .await
            .iter()
            .filter(|((e, _), _)| e == env)
            .map(|(_, flag)| flag.clone())
            .collect())
    }

    async fn subscribe(&self, env: &str) -> (Vec<Arc<Flag>>, broadcast::Receiver<Event>) {
        // Held across both the snapshot read and the bus registration: see
        // the lock discipline in `put`/`delete` above.
        let guard = self.flags.read().await;
        let snapshot = guard
            .iter()
            .filter(|((e, _), _)| e == env)
            .map(|(_, flag)| flag.clone())
            .collect();
        let receiver = self.bus.subscribe(env);
        (snapshot, receiver)
    }
}

/// Reads a flag set from a JSON file on disk. Useful for local
/// development or offline warm-up.
pub struct FileCatalog {
    inner: InMemoryCatalog,
}

#[derive(serde::Deserialize)]
struct FileFlagSet {
    flags: Vec<Flag>,
}

impl FileCatalog {
    /// Loads the file once; does not start a background poller. Callers
    /// that want live reload should drive `reload` from their own timer —
    /// polling cadence is a deployment concern, not something this crate
    /// owns.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let catalog = Self {
            inner: InMemoryCatalog::new(),
        };
        catalog.reload(path).await?;
        Ok(catalog)
    }

    pub async fn reload(&self, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        let path = path.into();
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::CatalogUnavailable(format!("{}: {e}", path.display())))?;
        let parsed: FileFlagSet = serde_json::from_str(&contents)
            .map_err(|e| EngineError::InvalidFlag(format!("{}: {e}", path.display())))?;

        for flag in parsed.flags {
            if let Err(reason) = flag.validate() {
                return Err(EngineError::InvalidFlag(reason));
            }
            let env = flag.environment_key.clone();
            self.inner.put(&env, flag).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for FileCatalog {
    async fn load_flag(&self, env: &str, key: &str) -> Result<Option<Arc<Flag>>, EngineError> {
        self.inner.load_flag(env, key).await
    }

    async fn list_env(&self, env: &str) -> Result<Vec<Arc<Flag>>, EngineError> {
        self.inner.list_env(env).await
    }

    async fn subscribe(&self, env: &str) -> (Vec<Arc<Flag>>, broadcast::Receiver<Event>) {
        self.inner.subscribe(env).await
    }
}
