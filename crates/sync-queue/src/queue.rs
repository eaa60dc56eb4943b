//! Async queue handle.

use crate::models::{NewMutation, QueueCounts, QueuedMutation};
use crate::{ops, QueueError, QueueResult};
use chrono::{DateTime, Utc};
use local_store::Store;
use serde_json::Value;
use tracing::{debug, info};

/// Ordered, durable log of pending mutations.
///
/// Each method is its own store transaction. Use [`crate::ops`] inside
/// [`Store::transaction`] to combine queue writes with other collections.
#[derive(Clone)]
pub struct SyncQueue {
    store: Store,
}

impl SyncQueue {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Append a mutation. The record is committed before this returns.
    pub async fn enqueue(&self, mutation: NewMutation) -> QueueResult<QueuedMutation> {
        let queued = self
            .store
            .transaction(move |tx| ops::enqueue(tx, mutation))
            .await?;
        debug!(
            id = queued.id,
            collection = %queued.target_collection,
            method = queued.method.as_str(),
            "Enqueued mutation"
        );
        Ok(queued)
    }

    pub async fn get(&self, id: i64) -> QueueResult<Option<QueuedMutation>> {
        Ok(self.store.transaction(move |tx| ops::get(tx, id)).await?)
    }

    pub async fn list_pending(&self) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self.store.transaction(ops::list_pending).await?)
    }

    pub async fn list_all(&self) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self.store.transaction(ops::list_all).await?)
    }

    pub async fn list_failed(&self, max_retries: u32) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self
            .store
            .transaction(move |tx| ops::list_failed(tx, max_retries))
            .await?)
    }

    pub async fn pending_for_resource(
        &self,
        collection: &str,
        id: &str,
    ) -> QueueResult<Vec<QueuedMutation>> {
        let (collection, id) = (collection.to_string(), id.to_string());
        Ok(self
            .store
            .transaction(move |tx| ops::pending_for_resource(tx, &collection, &id))
            .await?)
    }

    pub async fn counts(&self, max_retries: u32) -> QueueResult<QueueCounts> {
        Ok(self
            .store
            .transaction(move |tx| ops::counts(tx, max_retries))
            .await?)
    }

    pub async fn mark_synced(&self, id: i64) -> QueueResult<QueuedMutation> {
        self.store
            .transaction(move |tx| ops::mark_synced(tx, id))
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn increment_retry(
        &self,
        id: i64,
        max_retries: u32,
        next_attempt_at: Option<DateTime<Utc>>,
        error: &str,
    ) -> QueueResult<QueuedMutation> {
        let error = error.to_string();
        self.store
            .transaction(move |tx| ops::increment_retry(tx, id, max_retries, next_attempt_at, &error))
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn mark_failed(
        &self,
        id: i64,
        max_retries: u32,
        error: &str,
    ) -> QueueResult<QueuedMutation> {
        let error = error.to_string();
        self.store
            .transaction(move |tx| ops::mark_failed(tx, id, max_retries, &error))
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn reset_retry(&self, id: i64) -> QueueResult<QueuedMutation> {
        self.store
            .transaction(move |tx| ops::reset_retry(tx, id))
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    pub async fn reset_failed(&self, max_retries: u32) -> QueueResult<Vec<i64>> {
        let ids = self
            .store
            .transaction(move |tx| ops::reset_failed(tx, max_retries))
            .await?;
        if !ids.is_empty() {
            info!(count = ids.len(), "Reset failed mutations");
        }
        Ok(ids)
    }

    pub async fn replace_payload(&self, id: i64, payload: Value) -> QueueResult<QueuedMutation> {
        self.store
            .transaction(move |tx| ops::replace_payload(tx, id, payload))
            .await?
            .ok_or(QueueError::NotFound(id))
    }

    /// Manually discard a mutation.
    pub async fn remove(&self, id: i64) -> QueueResult<()> {
        let removed = self.store.transaction(move |tx| ops::remove(tx, id)).await?;
        if !removed {
            return Err(QueueError::NotFound(id));
        }
        info!(id, "Discarded queued mutation");
        Ok(())
    }

    pub async fn purge_synced(&self) -> QueueResult<usize> {
        let removed = self.store.transaction(ops::purge_synced).await?;
        debug!(count = removed, "Purged synced mutations");
        Ok(removed)
    }
}
