//! The Entity Store contract: the local persistence engine this crate caches
//! against. Implementations are supplied by the host application — this crate only
//! depends on the trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::query::{Aggregation, Query};

/// Local, durable storage addressed by path (`/{namespace}/{app_key}/{collection}`)
/// and, within a path, by entity id.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, path: &str, query: Option<&Query>) -> Result<Vec<Value>>;

    /// `Err(Error::NotFound)` when no entity with `id` exists at `path`.
    async fn get_by_id(&self, path: &str, id: &str) -> Result<Value>;

    /// Upsert. Returns the stored entity (which the caller treats as canonical).
    async fn put(&self, path: &str, data: Value) -> Result<Value>;

    /// Returns the number of entities removed.
    async fn delete(&self, path: &str, query: Option<&Query>) -> Result<usize>;

    async fn count(&self, path: &str, query: Option<&Query>) -> Result<usize>;

    async fn group(&self, path: &str, aggregation: &Aggregation) -> Result<Value>;
}
