//! Cache operations inside an open store transaction.

use crate::fields;
use crate::models::{cache_key, CacheRecord, CachedEntity};
use crate::{CACHE_COLLECTION, INDEX_COLLECTION};
use chrono::Utc;
use local_store::{Key, StoreResult, StoreTxn};
use serde_json::{json, Value};

fn write(tx: &StoreTxn<'_>, entity: CachedEntity) -> StoreResult<CachedEntity> {
    let record = CacheRecord {
        cache_key: cache_key(&entity.collection, &entity.id),
        entity,
    };
    tx.put_as(CACHE_COLLECTION, &record)?;
    Ok(record.entity)
}

pub fn get(tx: &StoreTxn<'_>, collection: &str, id: &str) -> StoreResult<Option<CachedEntity>> {
    let record: Option<CacheRecord> =
        tx.get_as(CACHE_COLLECTION, &Key::Text(cache_key(collection, id)))?;
    Ok(record.map(|r| r.entity))
}

pub fn get_all(tx: &StoreTxn<'_>, collection: &str) -> StoreResult<Vec<CachedEntity>> {
    let records: Vec<CacheRecord> =
        tx.get_all_by_index_as(CACHE_COLLECTION, INDEX_COLLECTION, &json!(collection))?;
    Ok(records.into_iter().map(|r| r.entity).collect())
}

/// Store a server-confirmed value as both live value and baseline.
pub fn put_synced(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
    payload: Value,
) -> StoreResult<CachedEntity> {
    write(
        tx,
        CachedEntity {
            collection: collection.to_string(),
            id: id.to_string(),
            baseline: Some(payload.clone()),
            payload,
            cached_at: Utc::now(),
        },
    )
}

/// Optimistically replace the live value, keeping the baseline.
pub fn apply_local(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
    payload: Value,
) -> StoreResult<CachedEntity> {
    let baseline = get(tx, collection, id)?.and_then(|existing| existing.baseline);
    write(
        tx,
        CachedEntity {
            collection: collection.to_string(),
            id: id.to_string(),
            payload,
            cached_at: Utc::now(),
            baseline,
        },
    )
}

/// Replace only the baseline. No-op when the entity is not cached.
pub fn set_baseline(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
    baseline: Option<Value>,
) -> StoreResult<Option<CachedEntity>> {
    let Some(mut entity) = get(tx, collection, id)? else {
        return Ok(None);
    };
    entity.baseline = baseline;
    write(tx, entity).map(Some)
}

/// Write one field of the live value, creating the entry if needed.
pub fn set_field(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
    field: &str,
    value: Value,
) -> StoreResult<CachedEntity> {
    let mut entity = get(tx, collection, id)?.unwrap_or_else(|| CachedEntity {
        collection: collection.to_string(),
        id: id.to_string(),
        payload: Value::Null,
        cached_at: Utc::now(),
        baseline: None,
    });
    fields::set(&mut entity.payload, field, value);
    entity.cached_at = Utc::now();
    write(tx, entity)
}

/// Write one field of the baseline. A missing baseline starts out empty.
pub fn set_baseline_field(
    tx: &StoreTxn<'_>,
    collection: &str,
    id: &str,
    field: &str,
    value: Value,
) -> StoreResult<Option<CachedEntity>> {
    let Some(mut entity) = get(tx, collection, id)? else {
        return Ok(None);
    };
    let mut baseline = entity.baseline.take().unwrap_or(Value::Null);
    fields::set(&mut baseline, field, value);
    entity.baseline = Some(baseline);
    write(tx, entity).map(Some)
}

pub fn remove(tx: &StoreTxn<'_>, collection: &str, id: &str) -> StoreResult<bool> {
    tx.delete(CACHE_COLLECTION, &Key::Text(cache_key(collection, id)))
}

/// Drop every cached entity of one collection.
pub fn clear(tx: &StoreTxn<'_>, collection: &str) -> StoreResult<usize> {
    let entities = get_all(tx, collection)?;
    for entity in &entities {
        remove(tx, &entity.collection, &entity.id)?;
    }
    Ok(entities.len())
}

pub fn clear_all(tx: &StoreTxn<'_>) -> StoreResult<usize> {
    tx.clear(CACHE_COLLECTION)
}
