//! In-memory `EntityStore`/`NetworkGateway` fakes used by this crate's own test
//! suite, and exported for downstream integration tests behind the `test-util`
//! feature.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::entity::{entity_id, entity_kmd, set_entity_kmd, Kmd};
use crate::error::{Error, Result};
use crate::gateway::NetworkGateway;
use crate::query::{Aggregation, Query};
use crate::store::EntityStore;

fn matches(doc: &Value, query: Option<&Query>) -> bool {
    match query {
        None | Some(Query::Empty) | Some(Query::Opaque(_)) => true,
        Some(Query::Ids(ids)) => entity_id(doc).map(|id| ids.iter().any(|i| i == id)).unwrap_or(false),
    }
}

/// A path-addressed, id-keyed document table, shared by both fakes below.
#[derive(Default)]
struct Table {
    paths: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl Table {
    fn get(&self, path: &str, query: Option<&Query>) -> Vec<Value> {
        self.paths
            .lock()
            .get(path)
            .map(|docs| docs.values().filter(|d| matches(d, query)).cloned().collect())
            .unwrap_or_default()
    }

    fn get_by_id(&self, path: &str, id: &str) -> Result<Value> {
        self.paths
            .lock()
            .get(path)
            .and_then(|docs| docs.get(id).cloned())
            .ok_or(Error::NotFound)
    }

    fn put(&self, path: &str, doc: Value) -> Result<Value> {
        let id = entity_id(&doc)
            .ok_or_else(|| Error::InvalidArgument("document has no id".into()))?
            .to_string();
        self.paths.lock().entry(path.to_string()).or_default().insert(id, doc.clone());
        Ok(doc)
    }

    fn delete(&self, path: &str, query: Option<&Query>) -> usize {
        let mut paths = self.paths.lock();
        let Some(docs) = paths.get_mut(path) else { return 0 };
        let doomed: Vec<String> = docs
            .values()
            .filter(|d| matches(d, query))
            .filter_map(entity_id)
            .map(String::from)
            .collect();
        for id in &doomed {
            docs.remove(id);
        }
        doomed.len()
    }

    fn delete_by_id(&self, path: &str, id: &str) -> usize {
        self.delete(path, Some(&Query::ids([id.to_string()])))
    }
}

/// An in-memory `EntityStore`. Not safe to share across tests that rely on process
/// isolation; each test should construct its own.
#[derive(Default)]
pub struct InMemoryEntityStore {
    table: Table,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates a document at `path` without going through `put`, for test
    /// setup that wants to bypass the public API.
    pub fn seed(&self, path: &str, doc: Value) {
        self.table.put(path, doc).expect("seeded document must carry an id");
    }
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn get(&self, path: &str, query: Option<&Query>) -> Result<Vec<Value>> {
        Ok(self.table.get(path, query))
    }

    async fn get_by_id(&self, path: &str, id: &str) -> Result<Value> {
        self.table.get_by_id(path, id)
    }

    async fn put(&self, path: &str, data: Value) -> Result<Value> {
        self.table.put(path, data)
    }

    async fn delete(&self, path: &str, query: Option<&Query>) -> Result<usize> {
        Ok(self.table.delete(path, query))
    }

    async fn count(&self, path: &str, query: Option<&Query>) -> Result<usize> {
        Ok(self.table.get(path, query).len())
    }

    async fn group(&self, path: &str, _aggregation: &Aggregation) -> Result<Value> {
        Ok(json!({ "count": self.table.get(path, None).len() }))
    }
}

/// An in-memory `NetworkGateway`. Supports scripting a one-shot error for a given
/// `(path, id)` pair, so tests can exercise the push failure-reclassification paths
/// (`InsufficientCredentials`, `NotFound`, generic transport) deterministically.
#[derive(Default)]
pub struct MockNetworkGateway {
    table: Table,
    lmt_clock: AtomicI64,
    scripted: Mutex<HashMap<(String, String), Error>>,
    /// Keyed by path only: `post` strips the id before it ever reaches the
    /// gateway (per the local-create contract), so a scripted local-create
    /// failure can't be addressed by id — it fires on the next `post` to `path`.
    scripted_post: Mutex<HashMap<String, Error>>,
    next_canonical_id: AtomicI64,
}

impl MockNetworkGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, path: &str, doc: Value) {
        self.table.put(path, doc).expect("seeded document must carry an id");
    }

    /// The next call touching `(path, id)` through `get_by_id`, `put`, or
    /// `delete_by_id` returns `error` instead of succeeding.
    pub fn script_error(&self, path: &str, id: &str, error: Error) {
        self.scripted.lock().insert((path.to_string(), id.to_string()), error);
    }

    /// The next `post` to `path` (a local-create) returns `error` instead of
    /// succeeding.
    pub fn script_post_error(&self, path: &str, error: Error) {
        self.scripted_post.lock().insert(path.to_string(), error);
    }

    fn take_scripted(&self, path: &str, id: &str) -> Option<Error> {
        self.scripted.lock().remove(&(path.to_string(), id.to_string()))
    }

    fn take_scripted_post(&self, path: &str) -> Option<Error> {
        self.scripted_post.lock().remove(path)
    }

    fn stamp(&self, mut doc: Value) -> Value {
        let lmt = self.lmt_clock.fetch_add(1, Ordering::SeqCst) + 1;
        let mut kmd = entity_kmd(&doc);
        kmd.lmt = Some(lmt);
        kmd.local = false;
        let _ = set_entity_kmd(&mut doc, &kmd);
        doc
    }
}

#[async_trait]
impl NetworkGateway for MockNetworkGateway {
    async fn get(&self, path: &str, query: Option<&Query>) -> Result<Vec<Value>> {
        Ok(self.table.get(path, query))
    }

    async fn get_by_id(&self, path: &str, id: &str) -> Result<Value> {
        if let Some(e) = self.take_scripted(path, id) {
            return Err(e);
        }
        self.table.get_by_id(path, id)
    }

    async fn post(&self, path: &str, mut data: Value) -> Result<Value> {
        if let Some(e) = self.take_scripted_post(path) {
            return Err(e);
        }
        let canonical_id = format!("srv-{}", self.next_canonical_id.fetch_add(1, Ordering::SeqCst) + 1);
        data["id"] = Value::String(canonical_id);
        let stamped = self.stamp(data);
        self.table.put(path, stamped.clone())?;
        Ok(stamped)
    }

    async fn put(&self, path: &str, data: Value) -> Result<Value> {
        let id = entity_id(&data).map(String::from).unwrap_or_default();
        if let Some(e) = self.take_scripted(path, &id) {
            return Err(e);
        }
        let stamped = self.stamp(data);
        self.table.put(path, stamped.clone())?;
        Ok(stamped)
    }

    async fn delete_by_id(&self, path: &str, id: &str) -> Result<usize> {
        if let Some(e) = self.take_scripted(path, id) {
            return Err(e);
        }
        Ok(self.table.delete_by_id(path, id))
    }

    async fn delta_fetch(&self, path: &str, since: Option<i64>) -> Result<Vec<Value>> {
        let all = self.table.get(path, None);
        Ok(match since {
            None => all,
            Some(watermark) => all
                .into_iter()
                .filter(|d| entity_kmd(d).lmt.map(|lmt| lmt > watermark).unwrap_or(true))
                .collect(),
        })
    }

    async fn count(&self, path: &str, query: Option<&Query>) -> Result<usize> {
        Ok(self.table.get(path, query).len())
    }

    async fn group(&self, path: &str, _aggregation: &Aggregation) -> Result<Value> {
        Ok(json!({ "count": self.table.get(path, None).len() }))
    }
}

#[allow(unused)]
pub fn kmd_of(entity: &Value) -> Kmd {
    entity_kmd(entity)
}
