//! Conflict persistence and resolution inside an open store transaction.

use crate::{DataConflict, CONFLICTS_COLLECTION, INDEX_RESOURCE};
use entity_cache::{fields, ops as cache_ops};
use local_store::{Key, StoreResult, StoreTxn};
use serde_json::{json, Value};
use sync_queue::ops as queue_ops;
use tracing::debug;

/// What to write back for a conflict, decided before the transaction opens.
#[derive(Debug, Clone)]
pub enum Decision {
    Local,
    Server,
    Merged(Value),
}

pub fn get(tx: &StoreTxn<'_>, id: &str) -> StoreResult<Option<DataConflict>> {
    tx.get_as(CONFLICTS_COLLECTION, &Key::from(id))
}

pub fn list(tx: &StoreTxn<'_>) -> StoreResult<Vec<DataConflict>> {
    let mut conflicts: Vec<DataConflict> = tx.get_all_as(CONFLICTS_COLLECTION)?;
    conflicts.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.id.cmp(&b.id)));
    Ok(conflicts)
}

pub fn list_for_resource(
    tx: &StoreTxn<'_>,
    resource_type: &str,
    resource_id: &str,
) -> StoreResult<Vec<DataConflict>> {
    tx.get_all_by_index_as(
        CONFLICTS_COLLECTION,
        INDEX_RESOURCE,
        &json!([resource_type, resource_id]),
    )
}

/// Persist detected conflicts, replacing any open conflict on the same
/// resource field.
pub fn record(tx: &StoreTxn<'_>, conflicts: &[DataConflict]) -> StoreResult<()> {
    for conflict in conflicts {
        for existing in list_for_resource(tx, &conflict.resource_type, &conflict.resource_id)? {
            if existing.field == conflict.field {
                tx.delete(CONFLICTS_COLLECTION, &Key::from(existing.id.as_str()))?;
            }
        }
        tx.put_as(CONFLICTS_COLLECTION, conflict)?;
    }
    Ok(())
}

/// Apply a decision to queue and cache, then drop the conflict.
pub fn resolve(tx: &StoreTxn<'_>, conflict: &DataConflict, decision: &Decision) -> StoreResult<()> {
    let collection = conflict.resource_type.as_str();
    let id = conflict.resource_id.as_str();
    let field = conflict.field.as_str();
    let pending = queue_ops::pending_for_resource(tx, collection, id)?;

    match decision {
        Decision::Local => {
            for m in &pending {
                queue_ops::reset_retry(tx, m.id)?;
            }
        }
        Decision::Server => {
            for m in pending {
                let mut payload = m.payload.clone();
                if !fields::remove(&mut payload, field) {
                    continue;
                }
                if fields::is_empty(&payload) {
                    queue_ops::remove(tx, m.id)?;
                    debug!(id = m.id, field, "Dropped mutation emptied by server resolution");
                } else {
                    queue_ops::replace_payload(tx, m.id, payload)?;
                }
            }
            cache_ops::set_field(tx, collection, id, field, conflict.server_value.clone())?;
        }
        Decision::Merged(merged) => {
            for m in &pending {
                if fields::names(&m.payload).iter().any(|f| f == field) {
                    let mut payload = m.payload.clone();
                    fields::set(&mut payload, field, merged.clone());
                    queue_ops::replace_payload(tx, m.id, payload)?;
                }
                queue_ops::reset_retry(tx, m.id)?;
            }
            cache_ops::set_field(tx, collection, id, field, merged.clone())?;
        }
    }

    // The server value is now the common ancestor whichever side won.
    cache_ops::set_baseline_field(tx, collection, id, field, conflict.server_value.clone())?;
    tx.delete(CONFLICTS_COLLECTION, &Key::from(conflict.id.as_str()))?;
    Ok(())
}
