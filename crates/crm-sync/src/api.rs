//! Data-access collaborator contract

use crate::error::ApiError;
use crate::types::{Entity, EntityId, FieldChanges};
use async_trait::async_trait;
use std::sync::Arc;

/// Remote source of truth for one collection
///
/// Implementations classify their own failures into an
/// [`ApiErrorKind`](crate::ApiErrorKind); callers never inspect message text.
#[async_trait]
pub trait DataAccess<E: Entity>: Send + Sync {
    /// Fetch the whole collection
    async fn list(&self) -> Result<Vec<E>, ApiError>;

    /// Create an entity; the remote assigns its id
    async fn create(&self, fields: FieldChanges) -> Result<E, ApiError>;

    /// Apply field changes; may return the server's updated copy
    async fn update(&self, id: &EntityId, changes: &FieldChanges) -> Result<Option<E>, ApiError>;

    /// Delete an entity
    async fn delete(&self, id: &EntityId) -> Result<(), ApiError>;
}

#[async_trait]
impl<E, T> DataAccess<E> for Arc<T>
where
    E: Entity,
    T: DataAccess<E> + ?Sized,
{
    async fn list(&self) -> Result<Vec<E>, ApiError> {
        (**self).list().await
    }

    async fn create(&self, fields: FieldChanges) -> Result<E, ApiError> {
        (**self).create(fields).await
    }

    async fn update(&self, id: &EntityId, changes: &FieldChanges) -> Result<Option<E>, ApiError> {
        (**self).update(id, changes).await
    }

    async fn delete(&self, id: &EntityId) -> Result<(), ApiError> {
        (**self).delete(id).await
    }
}
