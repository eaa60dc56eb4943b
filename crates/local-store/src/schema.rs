//! Collection declarations.
//!
//! A collection is a named set of JSON object records. Each record's key is
//! read from a field of the record, or assigned by the store when the
//! collection is auto-incrementing. Secondary indexes are declared up front
//! and maintained on every write.

use serde_json::Value;
use std::collections::HashMap;

/// How a collection derives record keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// Key is read from the named field. The field must be an integer or string.
    Field(String),
    /// Key is assigned from a monotonic per-collection sequence and written
    /// back into the named field. Keys are never reused, even after deletes.
    AutoIncrement(String),
}

impl KeySpec {
    pub fn field(&self) -> &str {
        match self {
            KeySpec::Field(f) | KeySpec::AutoIncrement(f) => f,
        }
    }
}

/// A secondary index over one or more top-level fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub key_path: Vec<String>,
}

impl IndexSpec {
    /// Index value for a record, or `None` when any indexed field is
    /// missing or null. Records without a value are left out of the index.
    pub fn extract(&self, record: &Value) -> Option<Value> {
        let mut parts = Vec::with_capacity(self.key_path.len());
        for field in &self.key_path {
            match record.get(field) {
                None | Some(Value::Null) => return None,
                Some(v) => parts.push(v.clone()),
            }
        }
        if parts.len() == 1 {
            parts.pop()
        } else {
            Some(Value::Array(parts))
        }
    }
}

/// Declaration of one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub key: KeySpec,
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSchema {
    /// Collection keyed by an existing record field.
    pub fn keyed(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeySpec::Field(key_field.into()),
            indexes: Vec::new(),
        }
    }

    /// Collection whose keys are assigned by the store.
    pub fn auto_increment(name: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: KeySpec::AutoIncrement(key_field.into()),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, name: impl Into<String>, key_path: &[&str]) -> Self {
        self.indexes.push(IndexSpec {
            name: name.into(),
            key_path: key_path.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Registered collections, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct Schemas {
    collections: HashMap<String, CollectionSchema>,
}

impl Schemas {
    pub fn new(collections: impl IntoIterator<Item = CollectionSchema>) -> Self {
        Self {
            collections: collections
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_field_index_value() {
        let idx = IndexSpec {
            name: "synced".into(),
            key_path: vec!["synced".into()],
        };
        assert_eq!(idx.extract(&json!({"synced": false})), Some(json!(false)));
        assert_eq!(idx.extract(&json!({"other": 1})), None);
    }

    #[test]
    fn test_compound_index_skips_null_members() {
        let schema = CollectionSchema::keyed("q", "id").with_index("target", &["collection", "id"]);
        let idx = schema.index("target").unwrap();
        assert_eq!(
            idx.extract(&json!({"collection": "projects", "id": "p1"})),
            Some(json!(["projects", "p1"]))
        );
        assert_eq!(idx.extract(&json!({"collection": "projects", "id": null})), None);
    }
}
