//! Queue record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change a mutation makes to its target resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

/// HTTP method the mutation is replayed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// A mutation as handed to the queue by the domain layer.
///
/// `endpoint`, `method` and `payload` are replayed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMutation {
    pub operation_type: OperationType,
    pub target_collection: String,
    /// Absent for creates that have no server id yet.
    pub target_id: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: Value,
}

impl NewMutation {
    /// A POST creating a new resource.
    pub fn create(collection: &str, endpoint: &str, payload: Value) -> Self {
        Self {
            operation_type: OperationType::Create,
            target_collection: collection.to_string(),
            target_id: None,
            endpoint: endpoint.to_string(),
            method: HttpMethod::Post,
            payload,
        }
    }

    /// A PATCH of an existing resource.
    pub fn update(collection: &str, id: &str, endpoint: &str, payload: Value) -> Self {
        Self {
            operation_type: OperationType::Update,
            target_collection: collection.to_string(),
            target_id: Some(id.to_string()),
            endpoint: endpoint.to_string(),
            method: HttpMethod::Patch,
            payload,
        }
    }

    /// A DELETE of an existing resource.
    pub fn delete(collection: &str, id: &str, endpoint: &str) -> Self {
        Self {
            operation_type: OperationType::Delete,
            target_collection: collection.to_string(),
            target_id: Some(id.to_string()),
            endpoint: endpoint.to_string(),
            method: HttpMethod::Delete,
            payload: Value::Null,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the target id, e.g. for a create with a client-generated id.
    pub fn with_target_id(mut self, id: &str) -> Self {
        self.target_id = Some(id.to_string());
        self
    }
}

/// A durable queue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Store-assigned, strictly increasing. The only ordering guarantee.
    pub id: i64,
    pub operation_type: OperationType,
    pub target_collection: String,
    #[serde(default)]
    pub target_id: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub synced: bool,
    pub retry_count: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Earliest instant the next automatic attempt may run.
    #[serde(default)]
    pub next_attempt_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
}

impl QueuedMutation {
    /// `(target_collection, target_id)`, when the mutation targets a known resource.
    pub fn resource_key(&self) -> Option<(&str, &str)> {
        self.target_id
            .as_deref()
            .map(|id| (self.target_collection.as_str(), id))
    }

    pub fn targets(&self, collection: &str, id: &str) -> bool {
        self.resource_key() == Some((collection, id))
    }

    /// Unsynced and out of automatic attempts.
    pub fn is_failed(&self, max_retries: u32) -> bool {
        !self.synced && self.retry_count >= max_retries
    }

    /// Whether the backoff window has elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }
}

/// Queue totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    /// Unsynced items still eligible for automatic draining.
    pub pending: usize,
    /// Unsynced items at max retries.
    pub failed: usize,
    /// Retained synced items.
    pub synced: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_serializes_uppercase() {
        assert_eq!(serde_json::to_value(HttpMethod::Patch).unwrap(), json!("PATCH"));
        assert_eq!(serde_json::to_value(OperationType::Create).unwrap(), json!("create"));
    }

    #[test]
    fn test_create_has_no_resource_key_until_id_set() {
        let m = NewMutation::create("projects", "/projects", json!({"name": "A"}));
        assert_eq!(m.method, HttpMethod::Post);
        assert!(m.target_id.is_none());

        let m = m.with_target_id("p1");
        assert_eq!(m.target_id.as_deref(), Some("p1"));
    }
}
