//! The Network Gateway contract: the remote transport this crate defers work to.
//! Implementations are supplied by the host application.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::query::{Aggregation, Query};

/// Remote transport addressed the same way as the Entity Store, plus a
/// conditional-fetch operation for delta sync.
#[async_trait]
pub trait NetworkGateway: Send + Sync {
    async fn get(&self, path: &str, query: Option<&Query>) -> Result<Vec<Value>>;

    /// `Err(Error::NotFound)` when the remote has no entity with `id`.
    async fn get_by_id(&self, path: &str, id: &str) -> Result<Value>;

    /// Local-create: the entity has no canonical id yet. Returns the server's
    /// canonical representation (including its minted id).
    async fn post(&self, path: &str, data: Value) -> Result<Value>;

    /// Update: the entity already has a canonical id.
    async fn put(&self, path: &str, data: Value) -> Result<Value>;

    /// Returns the number of entities removed remotely (normally 0 or 1).
    async fn delete_by_id(&self, path: &str, id: &str) -> Result<usize>;

    /// Conditional fetch: entities changed since `since` (an `lmt` watermark), or
    /// the full collection when `since` is `None`.
    async fn delta_fetch(&self, path: &str, since: Option<i64>) -> Result<Vec<Value>>;

    async fn count(&self, path: &str, query: Option<&Query>) -> Result<usize>;

    async fn group(&self, path: &str, aggregation: &Aggregation) -> Result<Value>;
}
