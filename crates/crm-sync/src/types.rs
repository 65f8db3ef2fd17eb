//! Entity model shared by every synced collection
//!
//! Entities are plain records addressed by an [`EntityId`]. Their mutable
//! fields are reachable by name so a generic mutator can capture, write and
//! restore them without knowing the concrete type.

use crate::error::FieldError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use ulid::Ulid;

/// Field name to new value, ordered by field name
pub type FieldChanges = BTreeMap<String, Value>;

/// Opaque entity identifier assigned by the remote source
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Wrap an existing identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier (ULID, sortable by creation time)
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A record held in a synced collection
///
/// `field`/`set_field` expose the mutable surface by name. `set_field` must
/// reject unknown and read-only fields and values that do not fit the
/// field's type; it is the only validation the mutator performs.
pub trait Entity: Clone + PartialEq + Send + Sync + 'static {
    /// Unique identifier
    fn id(&self) -> &EntityId;

    /// Current value of a named field, `None` if the field does not exist
    fn field(&self, name: &str) -> Option<Value>;

    /// Write a named field
    ///
    /// # Errors
    /// [`FieldError`] if the field is unknown, read-only, or the value is invalid
    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError>;

    /// Capture the current values of every field named in `changes`
    ///
    /// # Errors
    /// [`FieldError::UnknownField`] for a name the entity does not expose
    fn snapshot(&self, changes: &FieldChanges) -> Result<FieldChanges, FieldError> {
        changes
            .keys()
            .map(|name| {
                self.field(name)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| FieldError::UnknownField(name.clone()))
            })
            .collect()
    }

    /// Write every change in order, stopping at the first rejected field
    ///
    /// Not atomic: callers that need all-or-nothing apply to a clone first.
    ///
    /// # Errors
    /// The first [`FieldError`] returned by [`Entity::set_field`]
    fn apply_changes(&mut self, changes: &FieldChanges) -> Result<(), FieldError> {
        for (name, value) in changes {
            self.set_field(name, value.clone())?;
        }
        Ok(())
    }
}

/// Decode a field value into its concrete type
///
/// # Errors
/// [`FieldError::InvalidValue`] when the value does not deserialize
pub fn decode_field<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, FieldError> {
    serde_json::from_value(value).map_err(|e| FieldError::InvalidValue {
        field: name.to_string(),
        reason: e.to_string(),
    })
}

/// Encode a field value for [`Entity::field`]
#[inline]
#[must_use]
pub fn encode_field<T: Serialize>(value: &T) -> Option<Value> {
    serde_json::to_value(value).ok()
}

/// Flatten a serializable draft (a struct) into field changes
///
/// `None` fields are kept as JSON `null` unless the draft skips them.
///
/// # Errors
/// [`FieldError::InvalidValue`] if the draft does not serialize to an object
pub fn to_field_changes<T: Serialize>(draft: &T) -> Result<FieldChanges, FieldError> {
    match serde_json::to_value(draft) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(FieldError::InvalidValue {
            field: "<draft>".to_string(),
            reason: format!("expected an object, got {other}"),
        }),
        Err(e) => Err(FieldError::InvalidValue {
            field: "<draft>".to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: EntityId,
        body: String,
        pinned: bool,
    }

    impl Entity for Note {
        fn id(&self) -> &EntityId {
            &self.id
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "body" => encode_field(&self.body),
                "pinned" => encode_field(&self.pinned),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
            match name {
                "body" => self.body = decode_field(name, value)?,
                "pinned" => self.pinned = decode_field(name, value)?,
                _ => return Err(FieldError::UnknownField(name.to_string())),
            }
            Ok(())
        }
    }

    fn note() -> Note {
        Note {
            id: EntityId::from("N1"),
            body: "call back".to_string(),
            pinned: false,
        }
    }

    #[test]
    fn entity_id_display_and_conversions() {
        let id = EntityId::from("L1");
        assert_eq!(id.to_string(), "L1");
        assert_eq!(id, EntityId::new(String::from("L1")));
        assert_ne!(EntityId::generate(), EntityId::generate());
    }

    #[test]
    fn snapshot_captures_only_named_fields() {
        let changes = FieldChanges::from([("pinned".to_string(), json!(true))]);
        let previous = note().snapshot(&changes).unwrap();
        assert_eq!(previous, FieldChanges::from([("pinned".to_string(), json!(false))]));
    }

    #[test]
    fn snapshot_rejects_unknown_field() {
        let changes = FieldChanges::from([("color".to_string(), json!("red"))]);
        assert_eq!(
            note().snapshot(&changes),
            Err(FieldError::UnknownField("color".to_string()))
        );
    }

    #[test]
    fn set_field_rejects_wrong_type() {
        let mut n = note();
        let err = n.set_field("pinned", json!("yes")).unwrap_err();
        assert!(matches!(err, FieldError::InvalidValue { ref field, .. } if field == "pinned"));
        assert!(!n.pinned);
    }

    #[test]
    fn draft_flattens_into_changes() {
        #[derive(Serialize)]
        struct Draft {
            body: &'static str,
            pinned: bool,
        }

        let changes = to_field_changes(&Draft { body: "hi", pinned: true }).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["body"], json!("hi"));
        assert!(to_field_changes(&42).is_err());
    }
}
