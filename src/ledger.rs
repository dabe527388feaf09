//! The Sync Ledger: a per-collection set of pending entity ids, each carrying the
//! `lmt` it was last known at. It is a set, not a log — an id appears at most once,
//! and a later mutation on the same id overwrites its entry rather than appending.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::query::Query;
use crate::store::EntityStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub lmt: Option<i64>,
}

/// In-memory view of a collection's ledger. `size` is never trusted from the wire —
/// it is always derived from `entries.len()` and recomputed on every mutation, so
/// the `size == entries.len()` invariant cannot drift.
#[derive(Debug, Clone)]
pub struct SyncLedgerRecord {
    collection: String,
    entries: HashMap<String, LedgerEntry>,
}

impl SyncLedgerRecord {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), entries: HashMap::new() }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &HashMap<String, LedgerEntry> {
        &self.entries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, entry: LedgerEntry) {
        self.entries.insert(id.into(), entry);
    }

    pub fn remove(&mut self, id: &str) -> Option<LedgerEntry> {
        self.entries.remove(id)
    }

    fn to_document(&self) -> Value {
        serde_json::json!({
            "_id": self.collection,
            "entities": self.entries,
            "size": self.size(),
        })
    }

    fn from_document(collection: &str, doc: Value) -> Result<Self> {
        let entries: HashMap<String, LedgerEntry> = doc
            .get("entities")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();
        Ok(Self { collection: collection.to_string(), entries })
    }
}

/// Reads, writes and counts `SyncLedgerRecord`s against the Entity Store, under the
/// reserved sync namespace. One ledger document per collection, addressed by the
/// collection name as its id within the sync-collection path.
pub struct SyncLedger {
    store: Arc<dyn EntityStore>,
    config: CacheConfig,
}

impl SyncLedger {
    pub fn new(store: Arc<dyn EntityStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    fn path(&self, app_key: &str) -> String {
        format!("/{}/{}/{}", self.config.entity_namespace, app_key, self.config.sync_collection)
    }

    /// `Err(Error::NotFound)` when the collection has never had a ledger written.
    pub async fn read(&self, app_key: &str, collection: &str) -> Result<SyncLedgerRecord> {
        let doc = self.store.get_by_id(&self.path(app_key), collection).await?;
        SyncLedgerRecord::from_document(collection, doc)
    }

    pub async fn write(&self, app_key: &str, record: &SyncLedgerRecord) -> Result<()> {
        self.store.put(&self.path(app_key), record.to_document()).await?;
        Ok(())
    }

    /// Ledger size, or a subset count restricted to `query`'s id set. Missing
    /// ledgers count as zero rather than `NotFound` — an empty ledger and an absent
    /// one mean the same thing to every caller of `count`.
    pub async fn count(&self, app_key: &str, collection: &str, query: Option<&Query>) -> Result<usize> {
        let record = match self.read(app_key, collection).await {
            Ok(record) => record,
            Err(Error::NotFound) => return Ok(0),
            Err(e) => return Err(e),
        };
        match query {
            None | Some(Query::Empty) => Ok(record.size()),
            Some(Query::Ids(ids)) => Ok(ids.iter().filter(|id| record.contains(id)).count()),
            Some(Query::Opaque(_)) => Ok(record.size()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_tracks_entries_through_insert_and_remove() {
        let mut record = SyncLedgerRecord::new("widgets");
        assert_eq!(record.size(), 0);
        record.insert("a", LedgerEntry::default());
        record.insert("b", LedgerEntry { lmt: Some(5) });
        assert_eq!(record.size(), 2);
        record.remove("a");
        assert_eq!(record.size(), 1);
        assert!(record.contains("b"));
    }

    #[test]
    fn document_round_trip_ignores_foreign_size_field() {
        let mut record = SyncLedgerRecord::new("widgets");
        record.insert("a", LedgerEntry { lmt: Some(1) });
        let mut doc = record.to_document();
        // A tampered/stale `size` on the wire must never be trusted on read.
        doc["size"] = Value::from(999);
        let restored = SyncLedgerRecord::from_document("widgets", doc).unwrap();
        assert_eq!(restored.size(), 1);
    }

    #[test]
    fn from_document_defaults_missing_entities_to_empty() {
        let doc = serde_json::json!({"_id": "widgets", "size": 0});
        let restored = SyncLedgerRecord::from_document("widgets", doc).unwrap();
        assert!(restored.is_empty());
    }
}
