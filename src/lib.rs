//! Offline-first collection cache with deferred network synchronization.
//!
//! A [`cache::CacheStore`] mirrors a single remote collection into a local
//! [`store::EntityStore`]. Reads and writes return immediately against the local
//! cache; a [`result::DualPhaseResult`] carries a second, deferred future that
//! reconciles against the [`gateway::NetworkGateway`] once the caller awaits it.
//! Offline writes accumulate in a [`ledger::SyncLedger`] and are drained by the
//! [`push::PushEngine`] the next time anything touches the collection.
//!
//! This crate owns none of the transport, persistence, or query/aggregation object
//! model — those are host-supplied trait implementations. It owns the cache/ledger
//! bookkeeping, the push/pull algorithms, and the error classification between them.

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod push;
pub mod query;
pub mod registry;
pub mod result;
pub mod scheduler;
pub mod store;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use cache::{CacheStore, SyncResult};
pub use config::{CacheConfig, SyncOptions};
pub use entity::Kmd;
pub use error::{Error, ErrorKind, Result};
pub use gateway::NetworkGateway;
pub use ledger::{LedgerEntry, SyncLedger, SyncLedgerRecord};
pub use push::{PushEngine, PushFailure, PushOutcome, PushSuccess};
pub use query::{Aggregation, Query};
pub use registry::CollectionLockRegistry;
pub use result::DualPhaseResult;
pub use scheduler::{SyncScheduler, SyncSchedulerHandle};
pub use store::EntityStore;
