use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cached snapshot of one domain entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    pub collection: String,
    pub id: String,
    /// Live value, including optimistic local edits.
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
    /// Last value known to match the server. `None` for an entity created
    /// locally and not yet confirmed.
    #[serde(default)]
    pub baseline: Option<Value>,
}

impl CachedEntity {
    /// Whether the live value has drifted from the baseline.
    pub fn has_local_changes(&self) -> bool {
        self.baseline.as_ref() != Some(&self.payload)
    }
}

/// Stored form, keyed by `collection/id`.
#[derive(Serialize, Deserialize)]
pub(crate) struct CacheRecord {
    pub cache_key: String,
    #[serde(flatten)]
    pub entity: CachedEntity,
}

pub(crate) fn cache_key(collection: &str, id: &str) -> String {
    format!("{collection}/{id}")
}
