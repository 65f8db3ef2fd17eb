//! In-process data-access backend
//!
//! Backs the simulator and local runs. Failures can be queued up front to
//! exercise the revert and halt paths without a server.

use crate::api::DataAccess;
use crate::error::ApiError;
use crate::types::{Entity, EntityId, FieldChanges};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Calls received per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// `list` calls
    pub list: usize,
    /// `create` calls
    pub create: usize,
    /// `update` calls
    pub update: usize,
    /// `delete` calls
    pub delete: usize,
}

impl CallStats {
    /// Total calls across operations
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.list + self.create + self.update + self.delete
    }
}

#[derive(Debug, Default)]
struct Counters {
    list: AtomicUsize,
    create: AtomicUsize,
    update: AtomicUsize,
    delete: AtomicUsize,
}

/// Data-access backed by a concurrent map
///
/// Entities are listed in insertion order.
#[derive(Debug)]
pub struct InMemoryDataAccess<E> {
    records: DashMap<EntityId, (u64, E)>,
    next_seq: AtomicU64,
    failures: Mutex<VecDeque<ApiError>>,
    calls: Counters,
}

impl<E> Default for InMemoryDataAccess<E> {
    fn default() -> Self {
        Self {
            records: DashMap::new(),
            next_seq: AtomicU64::new(0),
            failures: Mutex::new(VecDeque::new()),
            calls: Counters::default(),
        }
    }
}

impl<E> InMemoryDataAccess<E>
where
    E: Entity + Serialize + DeserializeOwned,
{
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create backend holding `entities`
    #[must_use]
    pub fn with_entities(entities: impl IntoIterator<Item = E>) -> Self {
        let backend = Self::default();
        for entity in entities {
            backend.insert(entity);
        }
        backend
    }

    /// Store an entity directly, bypassing failure injection
    pub fn insert(&self, entity: E) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.records.insert(entity.id().clone(), (seq, entity));
    }

    /// Remote copy of an entity
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<E> {
        self.records.get(id).map(|r| r.value().1.clone())
    }

    /// Number of stored entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Queue a failure; each call consumes at most one, in order
    pub fn fail_next(&self, error: ApiError) {
        self.failures.lock().push_back(error);
    }

    /// Failures still queued
    #[must_use]
    pub fn pending_failures(&self) -> usize {
        self.failures.lock().len()
    }

    /// Calls received so far
    #[must_use]
    pub fn calls(&self) -> CallStats {
        CallStats {
            list: self.calls.list.load(Ordering::Relaxed),
            create: self.calls.create.load(Ordering::Relaxed),
            update: self.calls.update.load(Ordering::Relaxed),
            delete: self.calls.delete.load(Ordering::Relaxed),
        }
    }

    fn injected(&self) -> Result<(), ApiError> {
        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<E> DataAccess<E> for InMemoryDataAccess<E>
where
    E: Entity + Serialize + DeserializeOwned,
{
    async fn list(&self) -> Result<Vec<E>, ApiError> {
        self.calls.list.fetch_add(1, Ordering::Relaxed);
        self.injected()?;

        let mut rows: Vec<(u64, E)> = self.records.iter().map(|r| r.value().clone()).collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().map(|(_, e)| e).collect())
    }

    async fn create(&self, fields: FieldChanges) -> Result<E, ApiError> {
        self.calls.create.fetch_add(1, Ordering::Relaxed);
        self.injected()?;

        let id = EntityId::generate();
        let mut object: serde_json::Map<String, Value> = fields.into_iter().collect();
        object.insert("id".to_string(), Value::String(id.0.clone()));

        let entity: E = serde_json::from_value(Value::Object(object))
            .map_err(|e| ApiError::validation(e.to_string()))?;
        self.insert(entity.clone());
        Ok(entity)
    }

    async fn update(&self, id: &EntityId, changes: &FieldChanges) -> Result<Option<E>, ApiError> {
        self.calls.update.fetch_add(1, Ordering::Relaxed);
        self.injected()?;

        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(format!("{id} not found")))?;
        let mut next = record.1.clone();
        next.apply_changes(changes)
            .map_err(|e| ApiError::validation(e.to_string()))?;
        record.1 = next.clone();
        Ok(Some(next))
    }

    async fn delete(&self, id: &EntityId) -> Result<(), ApiError> {
        self.calls.delete.fetch_add(1, Ordering::Relaxed);
        self.injected()?;

        self.records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found(format!("{id} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiErrorKind, FieldError};
    use crate::types::{decode_field, encode_field};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        id: EntityId,
        #[serde(default)]
        name: String,
    }

    impl Entity for Contact {
        fn id(&self) -> &EntityId {
            &self.id
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "name" => encode_field(&self.name),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
            match name {
                "name" => self.name = decode_field(name, value)?,
                _ => return Err(FieldError::UnknownField(name.to_string())),
            }
            Ok(())
        }
    }

    fn contact(id: &str, name: &str) -> Contact {
        Contact {
            id: EntityId::from(id),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let api = InMemoryDataAccess::with_entities(["c", "a", "b"].map(|id| contact(id, id)));
        let ids: Vec<_> = api.list().await.unwrap().into_iter().map(|c| c.id.0).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[tokio::test]
    async fn create_assigns_id() {
        let api = InMemoryDataAccess::<Contact>::new();
        let created = api
            .create(FieldChanges::from([("name".to_string(), json!("Ada"))]))
            .await
            .unwrap();
        assert_eq!(created.name, "Ada");
        assert_eq!(api.get(&created.id), Some(created));
    }

    #[tokio::test]
    async fn update_unknown_field_is_validation_error() {
        let api = InMemoryDataAccess::with_entities([contact("c1", "Ada")]);
        let err = api
            .update(&EntityId::from("c1"), &FieldChanges::from([("age".to_string(), json!(3))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Validation);
        assert_eq!(api.get(&EntityId::from("c1")).unwrap().name, "Ada");
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let api = InMemoryDataAccess::with_entities([contact("c1", "Ada")]);
        api.fail_next(ApiError::network("Load failed"));
        api.fail_next(ApiError::validation("nope"));

        assert_eq!(api.list().await.unwrap_err().kind, ApiErrorKind::Network);
        assert_eq!(
            api.delete(&EntityId::from("c1")).await.unwrap_err().kind,
            ApiErrorKind::Validation
        );
        assert!(api.delete(&EntityId::from("c1")).await.is_ok());
        assert_eq!(api.pending_failures(), 0);
        assert_eq!(api.calls(), CallStats { list: 1, create: 0, update: 0, delete: 2 });
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let api = InMemoryDataAccess::<Contact>::new();
        let err = api.delete(&EntityId::from("ghost")).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::NotFound);
    }
}
