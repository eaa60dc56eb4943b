use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A field-level three-way divergence awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConflict {
    pub id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub field: String,
    pub local_value: Value,
    pub server_value: Value,
    /// `None` when the entity was never confirmed by the server.
    #[serde(default)]
    pub last_synced_value: Option<Value>,
    pub detected_at: DateTime<Utc>,
}

/// Caller-supplied, domain-specific merge policy.
pub trait MergeFn: Send + Sync {
    fn merge(&self, field: &str, local: &Value, server: &Value, baseline: Option<&Value>) -> Value;
}

impl<F> MergeFn for F
where
    F: Fn(&str, &Value, &Value, Option<&Value>) -> Value + Send + Sync,
{
    fn merge(&self, field: &str, local: &Value, server: &Value, baseline: Option<&Value>) -> Value {
        self(field, local, server, baseline)
    }
}

/// How to settle one conflict.
pub enum Resolution<'a> {
    /// Keep the pending local edit; it replays and wins.
    Local,
    /// Drop the local edit for this field and take the server value.
    Server,
    /// Combine both through a merge function.
    Merge(&'a dyn MergeFn),
}

/// How to settle every open conflict at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkResolution {
    Local,
    Server,
}
