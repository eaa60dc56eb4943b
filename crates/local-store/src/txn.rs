//! Transaction-scoped record operations.
//!
//! A [`StoreTxn`] is handed to the closure passed to
//! [`Store::transaction`](crate::Store::transaction). Every read and write
//! made through it commits together or not at all.

use crate::schema::{CollectionSchema, KeySpec, Schemas};
use crate::{Key, StoreError, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Handle to an open transaction.
pub struct StoreTxn<'a> {
    conn: &'a Connection,
    schemas: &'a Schemas,
}

impl<'a> StoreTxn<'a> {
    pub(crate) fn new(conn: &'a Connection, schemas: &'a Schemas) -> Self {
        Self { conn, schemas }
    }

    fn schema(&self, collection: &str) -> StoreResult<&'a CollectionSchema> {
        self.schemas
            .get(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))
    }

    /// Fetch a record by key.
    pub fn get(&self, collection: &str, key: &Key) -> StoreResult<Option<Value>> {
        self.schema(collection)?;
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM store_records WHERE collection = ?1 AND record_key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    /// Fetch a record and deserialize it.
    pub fn get_as<T: DeserializeOwned>(&self, collection: &str, key: &Key) -> StoreResult<Option<T>> {
        self.get(collection, key)?
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .transpose()
    }

    /// Insert or replace a record, returning its key.
    ///
    /// For auto-increment collections a record without a key field gets the
    /// next sequence value written into it.
    pub fn put(&self, collection: &str, mut record: Value) -> StoreResult<Key> {
        let schema = self.schema(collection)?;
        let obj = record.as_object_mut().ok_or_else(|| {
            StoreError::InvalidData(format!("record in '{collection}' must be a JSON object"))
        })?;

        let key = match &schema.key {
            KeySpec::Field(field) => obj.get(field).and_then(Key::from_value).ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "record in '{collection}' has no usable key field '{field}'"
                ))
            })?,
            KeySpec::AutoIncrement(field) => match obj.get(field).and_then(Key::from_value) {
                Some(key) => {
                    if let Key::Int(explicit) = key {
                        self.bump_sequence(collection, explicit)?;
                    }
                    key
                }
                None => {
                    let next = self.next_sequence(collection)?;
                    obj.insert(field.clone(), Value::from(next));
                    Key::Int(next)
                }
            },
        };

        let encoded = serde_json::to_string(&record)?;
        self.conn.execute(
            "INSERT INTO store_records (collection, record_key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, record_key) DO UPDATE SET value = excluded.value",
            params![collection, key, encoded],
        )?;

        self.remove_index_entries(collection, &key)?;
        for index in &schema.indexes {
            if let Some(value) = index.extract(&record) {
                self.conn.execute(
                    "INSERT OR IGNORE INTO store_index_entries
                        (collection, index_name, index_value, record_key)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![collection, index.name, serde_json::to_string(&value)?, key],
                )?;
            }
        }

        Ok(key)
    }

    /// Serialize and store a record.
    pub fn put_as<T: Serialize>(&self, collection: &str, record: &T) -> StoreResult<Key> {
        self.put(collection, serde_json::to_value(record)?)
    }

    /// Delete a record. Returns whether it existed.
    pub fn delete(&self, collection: &str, key: &Key) -> StoreResult<bool> {
        self.schema(collection)?;
        self.remove_index_entries(collection, key)?;
        let deleted = self.conn.execute(
            "DELETE FROM store_records WHERE collection = ?1 AND record_key = ?2",
            params![collection, key],
        )?;
        Ok(deleted > 0)
    }

    /// All records of a collection in key order.
    pub fn get_all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        self.schema(collection)?;
        let mut stmt = self.conn.prepare_cached(
            "SELECT value FROM store_records WHERE collection = ?1 ORDER BY record_key",
        )?;
        let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(serde_json::from_str(&raw?)?);
        }
        Ok(out)
    }

    pub fn get_all_as<T: DeserializeOwned>(&self, collection: &str) -> StoreResult<Vec<T>> {
        self.get_all(collection)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    /// Records whose index value equals `value`, in key order.
    ///
    /// Compound indexes are queried with a JSON array holding one element
    /// per indexed field.
    pub fn get_all_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> StoreResult<Vec<Value>> {
        let schema = self.schema(collection)?;
        if schema.index(index).is_none() {
            return Err(StoreError::UnknownIndex {
                collection: collection.to_string(),
                index: index.to_string(),
            });
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT r.value FROM store_index_entries e
             JOIN store_records r
               ON r.collection = e.collection AND r.record_key = e.record_key
             WHERE e.collection = ?1 AND e.index_name = ?2 AND e.index_value = ?3
             ORDER BY e.record_key",
        )?;
        let rows = stmt.query_map(
            params![collection, index, serde_json::to_string(value)?],
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for raw in rows {
            out.push(serde_json::from_str(&raw?)?);
        }
        Ok(out)
    }

    pub fn get_all_by_index_as<T: DeserializeOwned>(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> StoreResult<Vec<T>> {
        self.get_all_by_index(collection, index, value)?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        self.schema(collection)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM store_records WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Remove every record of a collection. The key sequence is kept.
    pub fn clear(&self, collection: &str) -> StoreResult<usize> {
        self.schema(collection)?;
        self.conn.execute(
            "DELETE FROM store_index_entries WHERE collection = ?1",
            params![collection],
        )?;
        let removed = self.conn.execute(
            "DELETE FROM store_records WHERE collection = ?1",
            params![collection],
        )?;
        Ok(removed)
    }

    fn remove_index_entries(&self, collection: &str, key: &Key) -> StoreResult<()> {
        self.conn.execute(
            "DELETE FROM store_index_entries WHERE collection = ?1 AND record_key = ?2",
            params![collection, key],
        )?;
        Ok(())
    }

    fn next_sequence(&self, collection: &str) -> StoreResult<i64> {
        let next = self.conn.query_row(
            "INSERT INTO store_sequences (collection, next_key) VALUES (?1, 2)
             ON CONFLICT(collection) DO UPDATE SET next_key = next_key + 1
             RETURNING next_key - 1",
            params![collection],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    fn bump_sequence(&self, collection: &str, used: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO store_sequences (collection, next_key) VALUES (?1, ?2)
             ON CONFLICT(collection) DO UPDATE
               SET next_key = MAX(next_key, excluded.next_key)",
            params![collection, used.saturating_add(1)],
        )?;
        Ok(())
    }
}
