//! The Cache Store facade: the crate's public entry point over a single collection.
//!
//! Every operation reads (or writes) the local cache synchronously and returns a
//! [`DualPhaseResult`] whose `network` future drives the deferred synchronization
//! side — gating on the ledger, triggering a push when entries are pending,
//! reconciling the local cache against whatever the remote returns.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::config::{CacheConfig, SyncOptions};
use crate::entity::{entity_id, generate_temp_id, max_lmt, set_entity_id, set_entity_kmd, Kmd};
use crate::error::{with_timeout, Error, Result};
use crate::gateway::NetworkGateway;
use crate::ledger::{LedgerEntry, SyncLedger, SyncLedgerRecord};
use crate::push::{PushEngine, PushOutcome};
use crate::query::{Aggregation, Query};
use crate::registry::CollectionLockRegistry;
use crate::store::EntityStore;

struct Handles {
    app_key: String,
    collection: String,
    config: CacheConfig,
    store: Arc<dyn EntityStore>,
    gateway: Arc<dyn NetworkGateway>,
    ledger: Arc<SyncLedger>,
    push_engine: Arc<PushEngine>,
    locks: Arc<CollectionLockRegistry>,
}

impl Handles {
    fn entity_path(&self) -> String {
        format!("/{}/{}/{}", self.config.entity_namespace, self.app_key, self.collection)
    }

    /// Gates on the ledger: if it holds pending entries, push once and recheck. A
    /// non-empty ledger after that means the caller must resolve it before reading
    /// through to the network.
    async fn gate_on_ledger(&self, push_concurrency: usize, timeout: Option<Duration>) -> Result<()> {
        let mut pending = self.ledger.count(&self.app_key, &self.collection, None).await?;
        if pending > 0 {
            self.push_locked(None, push_concurrency, timeout).await?;
            pending = self.ledger.count(&self.app_key, &self.collection, None).await?;
            if pending > 0 {
                return Err(Error::PendingSync(pending));
            }
        }
        Ok(())
    }

    async fn push_locked(&self, ids: Option<&[String]>, concurrency: usize, timeout: Option<Duration>) -> Result<PushOutcome> {
        let lock = self.locks.get(&self.collection);
        let _guard = lock.lock().await;
        self.push_engine.push(&self.app_key, &self.collection, ids, concurrency, timeout).await
    }

    async fn append_ledger(&self, ids: &[String]) -> Result<()> {
        let lock = self.locks.get(&self.collection);
        let _guard = lock.lock().await;
        let mut record = match self.ledger.read(&self.app_key, &self.collection).await {
            Ok(record) => record,
            Err(Error::NotFound) => SyncLedgerRecord::new(self.collection.clone()),
            Err(e) => return Err(e),
        };
        for id in ids {
            record.insert(id.clone(), LedgerEntry::default());
        }
        self.ledger.write(&self.app_key, &record).await
    }

    /// The set-difference reconciliation shared by `find`'s network phase and the
    /// Pull Engine: entities the cache has but the fetch didn't return are deleted
    /// locally; everything the fetch did return is upserted.
    async fn reconcile(&self, cached_ids: &[String], fetched: &[Value]) -> Result<()> {
        let fetched_ids: HashSet<&str> = fetched.iter().filter_map(|e| entity_id(e)).collect();
        for id in cached_ids {
            if !fetched_ids.contains(id.as_str()) {
                let _ = self.store.delete(&self.entity_path(), Some(&Query::ids([id.clone()]))).await;
            }
        }
        for entity in fetched {
            self.store.put(&self.entity_path(), entity.clone()).await?;
        }
        Ok(())
    }
}

/// Spawns `fut` on the runtime immediately and returns a future that just joins
/// the resulting task. Used by `save`/`remove` so their network phase's push
/// actually runs right away — per the "immediately attempt a push" contract —
/// instead of sitting dormant until (and unless) a caller awaits `.network`.
fn spawn_network<T>(fut: impl std::future::Future<Output = Result<T>> + Send + 'static) -> BoxFuture<'static, Result<T>>
where
    T: Send + 'static,
{
    let handle = tokio::spawn(fut);
    Box::pin(async move {
        match handle.await {
            Ok(result) => result,
            Err(join_error) => Err(Error::Transport(format!("push task failed to complete: {join_error}"))),
        }
    })
}

#[derive(Clone)]
pub struct CacheStore {
    handles: Arc<Handles>,
}

impl CacheStore {
    pub fn new(
        app_key: impl Into<String>,
        collection: impl Into<String>,
        config: CacheConfig,
        store: Arc<dyn EntityStore>,
        gateway: Arc<dyn NetworkGateway>,
        locks: Arc<CollectionLockRegistry>,
    ) -> Self {
        let ledger = Arc::new(SyncLedger::new(store.clone(), config.clone()));
        let push_engine = Arc::new(PushEngine::new(store.clone(), gateway.clone(), ledger.clone(), config.clone()));
        Self {
            handles: Arc::new(Handles {
                app_key: app_key.into(),
                collection: collection.into(),
                config,
                store,
                gateway,
                ledger,
                push_engine,
                locks,
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.handles.collection
    }

    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn find(&self, query: Option<Query>, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<Vec<Value>>> {
        let path = self.handles.entity_path();
        let timeout = opts.timeout;
        let cache_value = with_timeout(timeout, self.handles.store.get(&path, query.as_ref())).await?;
        let cached_ids: Vec<String> = cache_value.iter().filter_map(|e| entity_id(e).map(String::from)).collect();

        let handles = self.handles.clone();
        let watermark = max_lmt(&cache_value);
        let network = Box::pin(with_timeout(timeout, async move {
            handles.gate_on_ledger(opts.push_concurrency, timeout).await?;
            let fetched = if opts.use_delta_fetch {
                handles.gateway.delta_fetch(&handles.entity_path(), watermark).await?
            } else {
                handles.gateway.get(&handles.entity_path(), query.as_ref()).await?
            };
            handles.reconcile(&cached_ids, &fetched).await?;
            Ok(fetched)
        }));

        Ok(crate::result::DualPhaseResult { cache: cache_value, network })
    }

    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn find_by_id(&self, id: impl Into<String>, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<Value>> {
        let id = id.into();
        let path = self.handles.entity_path();
        let timeout = opts.timeout;
        let cache_value = with_timeout(timeout, self.handles.store.get_by_id(&path, &id)).await?;

        let handles = self.handles.clone();
        let net_id = id.clone();
        let push_concurrency = opts.push_concurrency;
        let network = Box::pin(with_timeout(timeout, async move {
            handles.gate_on_ledger(push_concurrency, timeout).await?;
            let path = handles.entity_path();
            match handles.gateway.get_by_id(&path, &net_id).await {
                Ok(remote_entity) => {
                    handles.store.put(&path, remote_entity.clone()).await?;
                    Ok(remote_entity)
                }
                Err(Error::NotFound) => {
                    let _ = handles.store.delete(&path, Some(&Query::ids([net_id.clone()]))).await;
                    Err(Error::NotFound)
                }
                Err(e) => Err(e),
            }
        }));

        Ok(crate::result::DualPhaseResult { cache: cache_value, network })
    }

    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn count(&self, query: Option<Query>, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<usize>> {
        let path = self.handles.entity_path();
        let timeout = opts.timeout;
        let cache_value = with_timeout(timeout, self.handles.store.count(&path, query.as_ref())).await?;

        let handles = self.handles.clone();
        let push_concurrency = opts.push_concurrency;
        let network = Box::pin(with_timeout(timeout, async move {
            handles.gate_on_ledger(push_concurrency, timeout).await?;
            handles.gateway.count(&handles.entity_path(), query.as_ref()).await
        }));

        Ok(crate::result::DualPhaseResult { cache: cache_value, network })
    }

    #[instrument(skip(self, opts, aggregation), fields(collection = %self.handles.collection))]
    pub async fn group(&self, aggregation: Aggregation, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<Value>> {
        let path = self.handles.entity_path();
        let timeout = opts.timeout;
        let cache_value = with_timeout(timeout, self.handles.store.group(&path, &aggregation)).await?;

        let handles = self.handles.clone();
        let push_concurrency = opts.push_concurrency;
        let network = Box::pin(with_timeout(timeout, async move {
            handles.gate_on_ledger(push_concurrency, timeout).await?;
            handles.gateway.group(&handles.entity_path(), &aggregation).await
        }));

        Ok(crate::result::DualPhaseResult { cache: cache_value, network })
    }

    /// Stores `entity` locally, appends (or updates) its ledger entry, and triggers
    /// a restricted push for just this id as the network phase. A missing `id`
    /// mints a UUID v4 temp id and marks the entity `local`, matching the offline
    /// create path.
    #[instrument(skip(self, entity, opts), fields(collection = %self.handles.collection))]
    pub async fn save(&self, mut entity: Value, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<Value>> {
        if entity_id(&entity).is_none() {
            let temp_id = generate_temp_id();
            set_entity_id(&mut entity, &temp_id)?;
            set_entity_kmd(&mut entity, &Kmd { lmt: None, local: true })?;
        }

        let path = self.handles.entity_path();
        let timeout = opts.timeout;
        let stored = with_timeout(timeout, self.handles.store.put(&path, entity)).await?;
        let id = entity_id(&stored)
            .ok_or_else(|| Error::InvalidArgument("entity missing id after save".into()))?
            .to_string();

        self.handles.append_ledger(std::slice::from_ref(&id)).await?;

        // Immediately attempt a push for this id: spawned right here so it runs
        // regardless of whether the caller ever awaits the returned network phase.
        let handles = self.handles.clone();
        let stored_for_network = stored.clone();
        let network = spawn_network(async move {
            let outcome = handles.push_locked(Some(&[id.clone()]), opts.push_concurrency, timeout).await?;
            if let Some(failure) = outcome.error.into_iter().find(|f| f.id == id) {
                return Err(failure.error);
            }
            Ok(outcome
                .success
                .into_iter()
                .find(|s| s.id == id)
                .and_then(|s| s.entity)
                .unwrap_or(stored_for_network))
        });

        Ok(crate::result::DualPhaseResult { cache: stored, network })
    }

    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn remove(&self, query: Option<Query>, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<usize, PushOutcome>> {
        let path = self.handles.entity_path();
        let timeout = opts.timeout;
        let removed = with_timeout(timeout, self.handles.store.get(&path, query.as_ref())).await?;
        let ids: Vec<String> = removed.iter().filter_map(|e| entity_id(e).map(String::from)).collect();
        let count = with_timeout(timeout, self.handles.store.delete(&path, query.as_ref())).await?;

        if ids.is_empty() {
            // Nothing local matched; there is nothing to push, but a future caller
            // still expects a network phase to resolve. An empty query's push is a
            // no-op by design, not an error.
            let network = Box::pin(async move { Ok(PushOutcome::default()) });
            return Ok(crate::result::DualPhaseResult { cache: count, network });
        }

        self.handles.append_ledger(&ids).await?;

        // Immediately attempt a push for these ids, spawned eagerly like `save`'s.
        let handles = self.handles.clone();
        let network = spawn_network(async move { handles.push_locked(Some(&ids), opts.push_concurrency, timeout).await });

        Ok(crate::result::DualPhaseResult { cache: count, network })
    }

    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn remove_by_id(&self, id: impl Into<String>, opts: SyncOptions) -> Result<crate::result::DualPhaseResult<usize, PushOutcome>> {
        let id = id.into();
        self.remove(Some(Query::ids([id])), opts).await
    }

    /// Drains the ledger for this collection (or a restricted id set). Callers
    /// normally reach this through [`CacheStore::sync`]; exposed directly for
    /// callers that only want to push.
    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn push(&self, ids: Option<Vec<String>>, opts: SyncOptions) -> Result<PushOutcome> {
        self.handles.push_locked(ids.as_deref(), opts.push_concurrency, opts.timeout).await
    }

    /// Gates on `sync_count`, then delegates to `find` and resolves only its
    /// network phase — the Pull Engine never exposes a cache-phase value of its
    /// own, per the spec's "delegate to find, return network-phase result only".
    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn pull(&self, query: Option<Query>, opts: SyncOptions) -> Result<Vec<Value>> {
        let pending = with_timeout(
            opts.timeout,
            self.handles.ledger.count(&self.handles.app_key, &self.handles.collection, None),
        )
        .await?;
        if pending > 0 {
            warn!(collection = %self.handles.collection, pending, "pull: blocked by pending sync");
            return Err(Error::PendingSync(pending));
        }
        self.find(query, opts).await?.network.await
    }

    /// The composite sync operation: push, then (unless push hit a hard failure)
    /// pull. `push`'s per-id failures are soft — they live in [`PushOutcome::error`]
    /// — so pull still runs; only a hard error out of `push` itself (propagated via
    /// `?`) skips the pull phase.
    #[instrument(skip(self, opts), fields(collection = %self.handles.collection))]
    pub async fn sync(&self, query: Option<Query>, opts: SyncOptions) -> Result<SyncResult> {
        let push_outcome = self.push(None, opts.clone()).await?;
        let pull_result = self.pull(query, opts).await;
        Ok(SyncResult { push: push_outcome, pull: pull_result })
    }
}

#[derive(Debug)]
pub struct SyncResult {
    pub push: PushOutcome,
    pub pull: Result<Vec<Value>>,
}
