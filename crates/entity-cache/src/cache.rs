//! Async cache handle.

use crate::models::CachedEntity;
use crate::{ops, CacheError, CacheResult};
use local_store::Store;
use serde_json::Value;
use tracing::debug;

/// Read-optimized entity snapshots with their last-synced baselines.
#[derive(Clone)]
pub struct EntityCache {
    store: Store,
}

impl EntityCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn get(&self, collection: &str, id: &str) -> CacheResult<Option<CachedEntity>> {
        let (collection, id) = (collection.to_string(), id.to_string());
        Ok(self
            .store
            .transaction(move |tx| ops::get(tx, &collection, &id))
            .await?)
    }

    pub async fn get_all(&self, collection: &str) -> CacheResult<Vec<CachedEntity>> {
        let collection = collection.to_string();
        Ok(self
            .store
            .transaction(move |tx| ops::get_all(tx, &collection))
            .await?)
    }

    pub async fn baseline(&self, collection: &str, id: &str) -> CacheResult<Option<Value>> {
        Ok(self.get(collection, id).await?.and_then(|e| e.baseline))
    }

    /// Cache a value fetched from or confirmed by the server.
    pub async fn put_synced(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
    ) -> CacheResult<CachedEntity> {
        let (collection, id) = (collection.to_string(), id.to_string());
        Ok(self
            .store
            .transaction(move |tx| ops::put_synced(tx, &collection, &id, payload))
            .await?)
    }

    /// Apply an optimistic local edit.
    pub async fn apply_local(
        &self,
        collection: &str,
        id: &str,
        payload: Value,
    ) -> CacheResult<CachedEntity> {
        let (collection, id) = (collection.to_string(), id.to_string());
        Ok(self
            .store
            .transaction(move |tx| ops::apply_local(tx, &collection, &id, payload))
            .await?)
    }

    pub async fn set_baseline(
        &self,
        collection: &str,
        id: &str,
        baseline: Option<Value>,
    ) -> CacheResult<CachedEntity> {
        let (c, i) = (collection.to_string(), id.to_string());
        self.store
            .transaction(move |tx| ops::set_baseline(tx, &c, &i, baseline))
            .await?
            .ok_or_else(|| CacheError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    pub async fn remove(&self, collection: &str, id: &str) -> CacheResult<bool> {
        let (collection, id) = (collection.to_string(), id.to_string());
        Ok(self
            .store
            .transaction(move |tx| ops::remove(tx, &collection, &id))
            .await?)
    }

    pub async fn clear(&self, collection: &str) -> CacheResult<usize> {
        let name = collection.to_string();
        let removed = self
            .store
            .transaction(move |tx| ops::clear(tx, &name))
            .await?;
        debug!(collection, count = removed, "Cleared cache collection");
        Ok(removed)
    }

    pub async fn clear_all(&self) -> CacheResult<usize> {
        Ok(self.store.transaction(ops::clear_all).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use serde_json::json;

    async fn cache() -> EntityCache {
        EntityCache::new(Store::open_in_memory([schema()]).await.unwrap())
    }

    #[tokio::test]
    async fn test_put_synced_sets_live_and_baseline() {
        let cache = cache().await;
        let entity = cache
            .put_synced("projects", "p1", json!({"name": "old name"}))
            .await
            .unwrap();

        assert_eq!(entity.baseline, Some(json!({"name": "old name"})));
        assert!(!entity.has_local_changes());
    }

    #[tokio::test]
    async fn test_apply_local_keeps_baseline() {
        let cache = cache().await;
        cache.put_synced("projects", "p1", json!({"name": "old name"})).await.unwrap();
        cache.apply_local("projects", "p1", json!({"name": "draft"})).await.unwrap();
        let entity = cache
            .apply_local("projects", "p1", json!({"name": "new name"}))
            .await
            .unwrap();

        assert_eq!(entity.payload, json!({"name": "new name"}));
        assert_eq!(entity.baseline, Some(json!({"name": "old name"})));
        assert!(entity.has_local_changes());
    }

    #[tokio::test]
    async fn test_new_local_entity_has_no_baseline() {
        let cache = cache().await;
        let entity = cache
            .apply_local("notes", "tmp-1", json!({"text": "hi"}))
            .await
            .unwrap();
        assert!(entity.baseline.is_none());
    }

    #[tokio::test]
    async fn test_get_all_is_scoped_to_collection() {
        let cache = cache().await;
        cache.put_synced("projects", "p1", json!({})).await.unwrap();
        cache.put_synced("projects", "p2", json!({})).await.unwrap();
        cache.put_synced("notes", "n1", json!({})).await.unwrap();

        assert_eq!(cache.get_all("projects").await.unwrap().len(), 2);
        assert_eq!(cache.clear("projects").await.unwrap(), 2);
        assert!(cache.get_all("projects").await.unwrap().is_empty());
        assert!(cache.get("notes", "n1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_and_clear_all() {
        let cache = cache().await;
        cache.put_synced("projects", "p1", json!({})).await.unwrap();
        cache.put_synced("notes", "n1", json!({})).await.unwrap();

        assert!(cache.remove("projects", "p1").await.unwrap());
        assert!(!cache.remove("projects", "p1").await.unwrap());
        assert_eq!(cache.clear_all().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_baseline_on_missing_entity() {
        let cache = cache().await;
        let err = cache.set_baseline("projects", "nope", None).await.unwrap_err();
        assert!(matches!(err, CacheError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_field_ops_in_one_transaction() {
        let cache = cache().await;
        cache.put_synced("projects", "p1", json!({"name": "a", "color": "red"})).await.unwrap();

        cache
            .store
            .transaction(|tx| {
                ops::set_field(tx, "projects", "p1", "name", json!("b"))?;
                ops::set_baseline_field(tx, "projects", "p1", "color", json!("blue"))?;
                Ok(())
            })
            .await
            .unwrap();

        let entity = cache.get("projects", "p1").await.unwrap().unwrap();
        assert_eq!(entity.payload, json!({"name": "b", "color": "red"}));
        assert_eq!(entity.baseline, Some(json!({"name": "a", "color": "blue"})));
    }
}
