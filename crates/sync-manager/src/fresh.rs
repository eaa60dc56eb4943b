//! Fresh server data: cache refresh or conflict detection.

use crate::status::SyncEvent;
use crate::{SyncError, SyncManager, SyncResult};
use conflict_coordinator::{detect, ops as conflict_ops, DataConflict};
use entity_cache::{fields, ops as cache_ops};
use local_store::StoreTxn;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use sync_queue::{ops as queue_ops, OperationType, QueuedMutation};
use tracing::{debug, info};

impl SyncManager {
    /// Take in the server's current value for a resource.
    ///
    /// Without pending local mutations the cache entry and its baseline
    /// become the server value. Otherwise the live value, the server value
    /// and the baseline are compared: server-only changes are absorbed,
    /// fields where both sides agree move the baseline, and genuine
    /// divergences are recorded as conflicts in the same transaction.
    pub async fn ingest_server_snapshot(
        &self,
        collection: &str,
        id: &str,
        server: Value,
    ) -> SyncResult<Vec<DataConflict>> {
        let owned_collection = collection.to_string();
        let owned_id = id.to_string();
        let detected = self
            .inner
            .store
            .transaction(move |tx| ingest(tx, &owned_collection, &owned_id, server))
            .await?;

        if detected.is_empty() {
            debug!(collection, resource_id = id, "Server snapshot applied");
            return Ok(detected);
        }

        info!(
            collection,
            resource_id = id,
            count = detected.len(),
            "Conflicts detected"
        );
        self.inner.conflicts.publish().await?;
        self.emit(SyncEvent::ConflictsDetected {
            resource_type: collection.to_string(),
            resource_id: id.to_string(),
            count: detected.len(),
        });
        self.publish_status().await;
        Ok(detected)
    }

    /// Fetch a resource from the server and ingest it.
    ///
    /// A resource the server no longer has is dropped from the cache unless
    /// local mutations for it are still pending.
    pub async fn refresh_resource(&self, collection: &str, id: &str) -> SyncResult<Vec<DataConflict>> {
        match self.inner.api.fetch(collection, id).await {
            Ok(Some(server)) => self.ingest_server_snapshot(collection, id, server).await,
            Ok(None) => {
                let owned_collection = collection.to_string();
                let owned_id = id.to_string();
                let removed = self
                    .inner
                    .store
                    .transaction(move |tx| {
                        if !queue_ops::pending_for_resource(tx, &owned_collection, &owned_id)?
                            .is_empty()
                        {
                            return Ok(false);
                        }
                        cache_ops::remove(tx, &owned_collection, &owned_id)
                    })
                    .await?;
                debug!(collection, resource_id = id, removed, "Resource gone on server");
                Ok(Vec::new())
            }
            Err(failure) => Err(SyncError::Remote(failure)),
        }
    }
}

fn ingest(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
    server: Value,
) -> local_store::StoreResult<Vec<DataConflict>> {
    let pending = queue_ops::pending_for_resource(tx, collection, id)?;
    if pending.is_empty() {
        cache_ops::put_synced(tx, collection, id, server)?;
        return Ok(Vec::new());
    }
    if ends_in_delete(&pending) {
        // Stays gone for readers until the delete replays.
        cache_ops::remove(tx, collection, id)?;
        return Ok(Vec::new());
    }

    let (mut live, baseline) = match cache_ops::get(tx, collection, id)? {
        Some(entity) => (entity.payload, entity.baseline),
        None => (
            pending
                .iter()
                .fold(Value::Null, |acc, m| fields::merge(&acc, &m.payload)),
            None,
        ),
    };

    let detected = detect(collection, id, &live, &server, baseline.as_ref());
    let conflicted: HashSet<&str> = detected.iter().map(|c| c.field.as_str()).collect();

    let base = baseline.clone().unwrap_or(Value::Null);
    let mut next_baseline = base.clone();
    let names: BTreeSet<String> = fields::names(&live)
        .into_iter()
        .chain(fields::names(&server))
        .chain(fields::names(&base))
        .collect();

    for field in &names {
        if conflicted.contains(field.as_str()) {
            continue;
        }
        let l = fields::get(&live, field);
        let s = fields::get(&server, field);
        let b = fields::get(&base, field);
        if l != b && l != s {
            // Local-only change; it still has to replay.
            continue;
        }
        write_field(&mut live, field, s.clone());
        write_field(&mut next_baseline, field, s);
    }

    cache_ops::apply_local(tx, collection, id, live)?;
    cache_ops::set_baseline(tx, collection, id, Some(next_baseline))?;
    conflict_ops::record(tx, &detected)?;
    Ok(detected)
}

/// Whether the newest of a resource's pending mutations deletes it.
pub(crate) fn ends_in_delete(pending: &[QueuedMutation]) -> bool {
    pending
        .last()
        .is_some_and(|m| m.operation_type == OperationType::Delete)
}

/// Set a field, or drop it when the server no longer has it.
fn write_field(payload: &mut Value, field: &str, value: Value) {
    if value.is_null() {
        fields::remove(payload, field);
    } else {
        fields::set(payload, field, value);
    }
}
