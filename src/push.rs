//! Push Engine: drains a collection's Sync Ledger against the Network Gateway.
//!
//! Snapshot the ledger, classify each pending id against the Entity Store (present
//! and not local → update, present and local → local-create, absent → delete),
//! execute both lists with bounded fan-out, reclassify failures, and persist
//! whatever survives back to the ledger.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entity::{entity_id, entity_kmd, strip_metadata};
use crate::error::{with_timeout, Error, Result};
use crate::gateway::NetworkGateway;
use crate::ledger::{SyncLedger, SyncLedgerRecord};
use crate::query::Query;
use crate::store::EntityStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushOutcome {
    pub success: Vec<PushSuccess>,
    pub error: Vec<PushFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushSuccess {
    pub id: String,
    pub entity: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct PushFailure {
    pub id: String,
    pub error: Error,
}

impl PartialEq for PushFailure {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.error.to_string() == other.error.to_string()
    }
}

/// What happened to a single pending id, and what the ledger should do about it.
enum StepOutcome {
    /// The network side committed and reconciled cleanly; drop the ledger entry.
    Reconciled { id: String, entity: Option<Value> },
    /// The network side committed but a local-detail mismatch occurred, or the
    /// remote told us the id is irrecoverably gone; drop the ledger entry, but
    /// surface the error.
    Dropped { id: String, error: Error },
    /// Transient or unclassified failure; keep the ledger entry so a later push
    /// retries it.
    Retained { id: String, error: Error },
}

/// `InsufficientCredentials` never gets better on retry without caller
/// intervention, so it drops the ledger entry like a hard failure would; anything
/// else is assumed transient and is retained for the next push.
fn classify_failure(id: String, error: Error) -> StepOutcome {
    match error {
        Error::InsufficientCredentials => StepOutcome::Dropped { id, error },
        other => StepOutcome::Retained { id, error: other },
    }
}

pub struct PushEngine {
    store: Arc<dyn EntityStore>,
    gateway: Arc<dyn NetworkGateway>,
    ledger: Arc<SyncLedger>,
    config: CacheConfig,
}

impl PushEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        gateway: Arc<dyn NetworkGateway>,
        ledger: Arc<SyncLedger>,
        config: CacheConfig,
    ) -> Self {
        Self { store, gateway, ledger, config }
    }

    fn entity_path(&self, app_key: &str, collection: &str) -> String {
        format!("/{}/{}/{}", self.config.entity_namespace, app_key, collection)
    }

    /// Pushes `ids` (or the whole ledger when `None`) for `collection`. Caller is
    /// responsible for holding the collection's serialization lock for the duration
    /// of this call. `timeout`, when set, bounds the classify-and-execute phase
    /// against the Entity Store / Network Gateway; an elapsed deadline surfaces as
    /// [`Error::Timeout`] and leaves the ledger untouched (it is written only after
    /// the phase completes).
    pub async fn push(
        &self,
        app_key: &str,
        collection: &str,
        ids: Option<&[String]>,
        concurrency: usize,
        timeout: Option<Duration>,
    ) -> Result<PushOutcome> {
        let mut record = match self.ledger.read(app_key, collection).await {
            Ok(record) => record,
            Err(Error::NotFound) => return Ok(PushOutcome::default()),
            Err(e) => return Err(e),
        };

        let target_ids: Vec<String> = match ids {
            Some(restricted) => restricted
                .iter()
                .filter(|id| record.contains(id))
                .cloned()
                .collect(),
            None => record.entries().keys().cloned().collect(),
        };

        if target_ids.is_empty() {
            return Ok(PushOutcome::default());
        }

        let path = self.entity_path(app_key, collection);
        debug!(collection, pending = target_ids.len(), "push: classifying pending ids");

        let outcome = with_timeout(timeout, self.execute(&path, &target_ids, &mut record, concurrency)).await?;

        self.ledger.write(app_key, &record).await?;
        debug!(
            collection,
            success = outcome.success.len(),
            error = outcome.error.len(),
            "push: ledger persisted"
        );
        Ok(outcome)
    }

    async fn execute(
        &self,
        path: &str,
        target_ids: &[String],
        record: &mut SyncLedgerRecord,
        concurrency: usize,
    ) -> Result<PushOutcome> {
        let mut save_list = Vec::new();
        let mut delete_list = Vec::new();
        for id in target_ids {
            match self.store.get_by_id(path, id).await {
                Ok(entity) => save_list.push(entity),
                Err(Error::NotFound) => delete_list.push(id.clone()),
                Err(e) => return Err(e),
            }
        }

        let mut outcome = PushOutcome::default();
        let concurrency = concurrency.max(1);

        let save_results: Vec<StepOutcome> = stream::iter(save_list.into_iter().map(|entity| {
            let path = path.to_string();
            async move { self.push_save(&path, entity).await }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        for step in save_results {
            apply_step(record, &mut outcome, step);
        }

        let delete_results: Vec<StepOutcome> = stream::iter(delete_list.into_iter().map(|id| {
            let path = path.to_string();
            async move { self.push_delete(&path, id).await }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        for step in delete_results {
            apply_step(record, &mut outcome, step);
        }

        Ok(outcome)
    }

    async fn push_save(&self, path: &str, entity: Value) -> StepOutcome {
        let id = match entity_id(&entity) {
            Some(id) => id.to_string(),
            None => {
                return StepOutcome::Retained {
                    id: String::new(),
                    error: Error::InvalidArgument("pending entity has no id".into()),
                }
            }
        };

        if entity_kmd(&entity).local {
            let payload = strip_metadata(&entity);
            match self.gateway.post(path, payload).await {
                Ok(server_entity) => self.reconcile_local_create(path, id, server_entity).await,
                Err(e) => {
                    warn!(id, error = %e, "push: local-create failed");
                    classify_failure(id, e)
                }
            }
        } else {
            match self.gateway.put(path, entity).await {
                Ok(_) => StepOutcome::Reconciled { id, entity: None },
                Err(e) => {
                    warn!(id, error = %e, "push: update failed");
                    classify_failure(id, e)
                }
            }
        }
    }

    /// After a successful local-create, the canonical entity replaces the temp-id
    /// row and the temp id itself is retired. If the retirement delete doesn't
    /// remove exactly one row, the network side is still committed — there is no
    /// undoing a POST — so the entry is dropped with a recorded error rather than
    /// retried (retrying would re-POST and duplicate the entity remotely).
    async fn reconcile_local_create(&self, path: &str, temp_id: String, server_entity: Value) -> StepOutcome {
        if let Err(e) = self.store.put(path, server_entity.clone()).await {
            return StepOutcome::Retained { id: temp_id, error: e };
        }
        match self.store.delete(path, Some(&Query::ids([temp_id.clone()]))).await {
            Ok(1) => StepOutcome::Reconciled { id: temp_id, entity: Some(server_entity) },
            Ok(n) => StepOutcome::Dropped {
                id: temp_id,
                error: Error::CountMismatch { expected: 1, actual: n },
            },
            Err(e) => StepOutcome::Retained { id: temp_id, error: e },
        }
    }

    async fn push_delete(&self, path: &str, id: String) -> StepOutcome {
        match self.gateway.delete_by_id(path, &id).await {
            Ok(1) => StepOutcome::Reconciled { id, entity: None },
            Ok(n) => StepOutcome::Retained {
                id,
                error: Error::CountMismatch { expected: 1, actual: n },
            },
            Err(Error::NotFound) => StepOutcome::Dropped { id, error: Error::NotFound },
            Err(e) => {
                warn!(id, error = %e, "push: delete failed");
                classify_failure(id, e)
            }
        }
    }
}

fn apply_step(
    record: &mut crate::ledger::SyncLedgerRecord,
    outcome: &mut PushOutcome,
    step: StepOutcome,
) {
    match step {
        StepOutcome::Reconciled { id, entity } => {
            record.remove(&id);
            outcome.success.push(PushSuccess { id, entity });
        }
        StepOutcome::Dropped { id, error } => {
            record.remove(&id);
            outcome.error.push(PushFailure { id, error });
        }
        StepOutcome::Retained { id, error } => {
            outcome.error.push(PushFailure { id, error });
        }
    }
}
