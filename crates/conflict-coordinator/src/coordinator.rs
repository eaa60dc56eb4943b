//! Conflict list ownership and resolution.

use crate::ops::{self, Decision};
use crate::{BulkResolution, ConflictError, ConflictResult, DataConflict, Resolution};
use local_store::Store;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Persists open conflicts and applies resolutions atomically.
///
/// Subscribers see the full open-conflict list after every change.
#[derive(Clone)]
pub struct ConflictCoordinator {
    store: Store,
    list_tx: Arc<watch::Sender<Vec<DataConflict>>>,
}

impl ConflictCoordinator {
    /// Create a coordinator and publish whatever conflicts are already stored.
    pub async fn open(store: Store) -> ConflictResult<Self> {
        let existing = store.transaction(ops::list).await?;
        if !existing.is_empty() {
            info!(count = existing.len(), "Loaded open conflicts");
        }
        let (list_tx, _) = watch::channel(existing);
        Ok(Self {
            store,
            list_tx: Arc::new(list_tx),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<DataConflict>> {
        self.list_tx.subscribe()
    }

    /// Re-read the stored list and push it to subscribers.
    pub async fn publish(&self) -> ConflictResult<Vec<DataConflict>> {
        let list = self.store.transaction(ops::list).await?;
        self.list_tx.send_replace(list.clone());
        Ok(list)
    }

    pub async fn list(&self) -> ConflictResult<Vec<DataConflict>> {
        Ok(self.store.transaction(ops::list).await?)
    }

    pub async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> ConflictResult<Vec<DataConflict>> {
        let (rt, rid) = (resource_type.to_string(), resource_id.to_string());
        Ok(self
            .store
            .transaction(move |tx| ops::list_for_resource(tx, &rt, &rid))
            .await?)
    }

    pub async fn get(&self, id: &str) -> ConflictResult<Option<DataConflict>> {
        let id = id.to_string();
        Ok(self.store.transaction(move |tx| ops::get(tx, &id)).await?)
    }

    /// Persist newly detected conflicts.
    pub async fn record(&self, conflicts: Vec<DataConflict>) -> ConflictResult<()> {
        if conflicts.is_empty() {
            return Ok(());
        }
        let count = conflicts.len();
        self.store
            .transaction(move |tx| ops::record(tx, &conflicts))
            .await?;
        info!(count, "Recorded conflicts");
        self.publish().await?;
        Ok(())
    }

    /// Settle one conflict.
    pub async fn resolve_one(&self, id: &str, resolution: Resolution<'_>) -> ConflictResult<()> {
        let conflict = self
            .get(id)
            .await?
            .ok_or_else(|| ConflictError::NotFound(id.to_string()))?;

        let decision = match resolution {
            Resolution::Local => Decision::Local,
            Resolution::Server => Decision::Server,
            Resolution::Merge(merge_fn) => Decision::Merged(merge_fn.merge(
                &conflict.field,
                &conflict.local_value,
                &conflict.server_value,
                conflict.last_synced_value.as_ref(),
            )),
        };

        let conflict_id = conflict.id.clone();
        let resolved = self
            .store
            .transaction(move |tx| {
                // Another caller may have resolved it in the meantime.
                let Some(current) = ops::get(tx, &conflict_id)? else {
                    return Ok(false);
                };
                ops::resolve(tx, &current, &decision)?;
                Ok(true)
            })
            .await?;

        if !resolved {
            return Err(ConflictError::NotFound(id.to_string()));
        }
        info!(
            id,
            resource_type = %conflict.resource_type,
            resource_id = %conflict.resource_id,
            field = %conflict.field,
            "Resolved conflict"
        );
        self.publish().await?;
        Ok(())
    }

    /// Settle every open conflict with one choice. Returns how many were resolved.
    pub async fn resolve_all(&self, resolution: BulkResolution) -> ConflictResult<usize> {
        let decision = match resolution {
            BulkResolution::Local => Decision::Local,
            BulkResolution::Server => Decision::Server,
        };
        let count = self
            .store
            .transaction(move |tx| {
                let open = ops::list(tx)?;
                for conflict in &open {
                    ops::resolve(tx, conflict, &decision)?;
                }
                Ok(open.len())
            })
            .await?;

        debug!(count, ?resolution, "Resolved all conflicts");
        self.publish().await?;
        Ok(count)
    }
}
