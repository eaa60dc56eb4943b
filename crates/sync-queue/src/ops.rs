//! Queue operations inside an open store transaction.
//!
//! These compose with cache and conflict writes so that several components
//! change together in one commit. Operations on a missing id return `None`
//! or `false` and write nothing.

use crate::models::{NewMutation, QueueCounts, QueuedMutation};
use crate::{INDEX_SYNCED, INDEX_TARGET, QUEUE_COLLECTION};
use chrono::{DateTime, Utc};
use local_store::{Key, StoreResult, StoreTxn};
use serde_json::{json, Value};

pub fn enqueue(tx: &StoreTxn<'_>, mutation: NewMutation) -> StoreResult<QueuedMutation> {
    let mut record = QueuedMutation {
        id: 0,
        operation_type: mutation.operation_type,
        target_collection: mutation.target_collection,
        target_id: mutation.target_id,
        endpoint: mutation.endpoint,
        method: mutation.method,
        payload: mutation.payload,
        enqueued_at: Utc::now(),
        synced: false,
        retry_count: 0,
        last_attempt_at: None,
        next_attempt_at: None,
        last_error: None,
        synced_at: None,
    };

    let mut value = serde_json::to_value(&record)?;
    value["id"] = Value::Null;
    let key = tx.put(QUEUE_COLLECTION, value)?;
    record.id = key.as_i64().unwrap_or_default();
    Ok(record)
}

pub fn get(tx: &StoreTxn<'_>, id: i64) -> StoreResult<Option<QueuedMutation>> {
    tx.get_as(QUEUE_COLLECTION, &Key::Int(id))
}

/// Unsynced records in ascending id order, failed ones included.
pub fn list_pending(tx: &StoreTxn<'_>) -> StoreResult<Vec<QueuedMutation>> {
    tx.get_all_by_index_as(QUEUE_COLLECTION, INDEX_SYNCED, &json!(false))
}

pub fn list_all(tx: &StoreTxn<'_>) -> StoreResult<Vec<QueuedMutation>> {
    tx.get_all_as(QUEUE_COLLECTION)
}

pub fn list_failed(tx: &StoreTxn<'_>, max_retries: u32) -> StoreResult<Vec<QueuedMutation>> {
    Ok(list_pending(tx)?
        .into_iter()
        .filter(|m| m.is_failed(max_retries))
        .collect())
}

/// Unsynced records targeting one resource, ascending by id.
pub fn pending_for_resource(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
) -> StoreResult<Vec<QueuedMutation>> {
    let records: Vec<QueuedMutation> =
        tx.get_all_by_index_as(QUEUE_COLLECTION, INDEX_TARGET, &json!([collection, id]))?;
    Ok(records.into_iter().filter(|m| !m.synced).collect())
}

pub fn counts(tx: &StoreTxn<'_>, max_retries: u32) -> StoreResult<QueueCounts> {
    let mut counts = QueueCounts::default();
    for m in list_all(tx)? {
        if m.synced {
            counts.synced += 1;
        } else if m.retry_count >= max_retries {
            counts.failed += 1;
        } else {
            counts.pending += 1;
        }
    }
    Ok(counts)
}

fn update<F>(tx: &StoreTxn<'_>, id: i64, f: F) -> StoreResult<Option<QueuedMutation>>
where
    F: FnOnce(&mut QueuedMutation),
{
    let Some(mut record) = get(tx, id)? else {
        return Ok(None);
    };
    f(&mut record);
    tx.put_as(QUEUE_COLLECTION, &record)?;
    Ok(Some(record))
}

pub fn mark_synced(tx: &StoreTxn<'_>, id: i64) -> StoreResult<Option<QueuedMutation>> {
    let now = Utc::now();
    update(tx, id, |m| {
        m.synced = true;
        m.synced_at = Some(now);
        m.last_attempt_at = Some(now);
        m.next_attempt_at = None;
        m.last_error = None;
    })
}

/// Record a retryable failure. `retry_count` never exceeds `max_retries`.
pub fn increment_retry(
    tx: &StoreTxn<'_>,
    id: i64,
    max_retries: u32,
    next_attempt_at: Option<DateTime<Utc>>,
    error: &str,
) -> StoreResult<Option<QueuedMutation>> {
    let now = Utc::now();
    update(tx, id, |m| {
        m.retry_count = m.retry_count.saturating_add(1).min(max_retries);
        m.last_attempt_at = Some(now);
        m.next_attempt_at = if m.retry_count >= max_retries {
            None
        } else {
            next_attempt_at
        };
        m.last_error = Some(error.to_string());
    })
}

/// Record a non-retryable failure: jump straight to `max_retries`.
pub fn mark_failed(
    tx: &StoreTxn<'_>,
    id: i64,
    max_retries: u32,
    error: &str,
) -> StoreResult<Option<QueuedMutation>> {
    let now = Utc::now();
    update(tx, id, |m| {
        m.retry_count = max_retries;
        m.last_attempt_at = Some(now);
        m.next_attempt_at = None;
        m.last_error = Some(error.to_string());
    })
}

pub fn reset_retry(tx: &StoreTxn<'_>, id: i64) -> StoreResult<Option<QueuedMutation>> {
    update(tx, id, |m| {
        m.retry_count = 0;
        m.next_attempt_at = None;
        m.last_error = None;
    })
}

/// Reset every failed record. Returns the ids reset, ascending.
pub fn reset_failed(tx: &StoreTxn<'_>, max_retries: u32) -> StoreResult<Vec<i64>> {
    let mut ids = Vec::new();
    for m in list_failed(tx, max_retries)? {
        if reset_retry(tx, m.id)?.is_some() {
            ids.push(m.id);
        }
    }
    Ok(ids)
}

/// Replace the payload a mutation will replay.
pub fn replace_payload(
    tx: &StoreTxn<'_>,
    id: i64,
    payload: Value,
) -> StoreResult<Option<QueuedMutation>> {
    update(tx, id, |m| m.payload = payload)
}

pub fn remove(tx: &StoreTxn<'_>, id: i64) -> StoreResult<bool> {
    tx.delete(QUEUE_COLLECTION, &Key::Int(id))
}

/// Delete retained synced records. Returns how many were removed.
pub fn purge_synced(tx: &StoreTxn<'_>) -> StoreResult<usize> {
    let synced: Vec<QueuedMutation> =
        tx.get_all_by_index_as(QUEUE_COLLECTION, INDEX_SYNCED, &json!(true))?;
    for m in &synced {
        tx.delete(QUEUE_COLLECTION, &Key::Int(m.id))?;
    }
    Ok(synced.len())
}
