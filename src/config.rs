//! Namespace configuration and per-operation sync options.

use std::time::Duration;

use serde_json::Value;

/// Where the Cache Store looks for entities and sync ledgers in the Entity Store /
/// Network Gateway address space. Both namespaces are overridable so a host
/// application can share one backend across unrelated sync domains.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub entity_namespace: String,
    pub sync_collection: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entity_namespace: "appdata".to_string(),
            sync_collection: "sync".to_string(),
        }
    }
}

/// Options accepted by every Cache Store operation.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub timeout: Option<Duration>,
    /// Use a conditional (lmt-watermark) fetch instead of a full one. Only consulted
    /// by `find`/`find_by_id`; `count`/`group` have no delta variant by design.
    pub use_delta_fetch: bool,
    pub properties: Option<Value>,
    pub ttl: Option<Duration>,
    /// Bounded fan-out for the Push Engine's save/delete lists.
    pub push_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            use_delta_fetch: true,
            properties: None,
            ttl: None,
            push_concurrency: 8,
        }
    }
}
