//! In-memory ordered collection owned by one controller

use crate::types::{Entity, EntityId};

/// Ordered list of entities
///
/// Order is kept stable so a removed entity can be put back where it was.
#[derive(Debug, Clone)]
pub struct Collection<E> {
    items: Vec<E>,
}

impl<E> Default for Collection<E> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<E: Entity> Collection<E> {
    /// Create empty collection
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create collection from loaded entities
    #[inline]
    #[must_use]
    pub fn from_vec(items: Vec<E>) -> Self {
        Self { items }
    }

    /// Number of entities
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Index of the entity with `id`
    #[inline]
    #[must_use]
    pub fn position(&self, id: &EntityId) -> Option<usize> {
        self.items.iter().position(|e| e.id() == id)
    }

    /// Check if an entity with `id` is present
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.position(id).is_some()
    }

    /// Borrow entity by id
    #[inline]
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&E> {
        self.items.iter().find(|e| e.id() == id)
    }

    /// Mutably borrow entity by id
    #[inline]
    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut E> {
        self.items.iter_mut().find(|e| e.id() == id)
    }

    /// Append entity, returning its index
    pub fn push(&mut self, entity: E) -> usize {
        self.items.push(entity);
        self.items.len() - 1
    }

    /// Insert at `index`, clamped to the current length; returns the index used
    pub fn insert_at(&mut self, index: usize, entity: E) -> usize {
        let index = index.min(self.items.len());
        self.items.insert(index, entity);
        index
    }

    /// Remove entity by id, returning where it was
    pub fn remove(&mut self, id: &EntityId) -> Option<(usize, E)> {
        let index = self.position(id)?;
        Some((index, self.items.remove(index)))
    }

    /// Replace an entity in place; returns false if `entity` is not present
    pub fn replace(&mut self, entity: E) -> bool {
        match self.get_mut(&entity.id().clone()) {
            Some(slot) => {
                *slot = entity;
                true
            }
            None => false,
        }
    }

    /// Replace the whole contents
    pub fn replace_all(&mut self, items: Vec<E>) {
        self.items = items;
    }

    /// Iterate in order
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.items.iter()
    }

    /// Clone contents
    #[inline]
    #[must_use]
    pub fn to_vec(&self) -> Vec<E> {
        self.items.clone()
    }
}

impl<'a, E> IntoIterator for &'a Collection<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use serde_json::Value;

    #[derive(Debug, Clone, PartialEq)]
    struct Row(EntityId);

    impl Entity for Row {
        fn id(&self) -> &EntityId {
            &self.0
        }

        fn field(&self, _name: &str) -> Option<Value> {
            None
        }

        fn set_field(&mut self, name: &str, _value: Value) -> Result<(), FieldError> {
            Err(FieldError::UnknownField(name.to_string()))
        }
    }

    fn rows(ids: &[&str]) -> Collection<Row> {
        Collection::from_vec(ids.iter().map(|id| Row(EntityId::from(*id))).collect())
    }

    fn ids(c: &Collection<Row>) -> Vec<&str> {
        c.iter().map(|r| r.0.as_str()).collect()
    }

    #[test]
    fn lookup_by_id() {
        let c = rows(&["a", "b", "c"]);
        assert_eq!(c.len(), 3);
        assert_eq!(c.position(&EntityId::from("b")), Some(1));
        assert!(c.get(&EntityId::from("z")).is_none());
    }

    #[test]
    fn remove_then_reinsert_restores_order() {
        let mut c = rows(&["a", "b", "c"]);
        let (index, row) = c.remove(&EntityId::from("b")).unwrap();
        assert_eq!(ids(&c), ["a", "c"]);

        c.insert_at(index, row);
        assert_eq!(ids(&c), ["a", "b", "c"]);
    }

    #[test]
    fn insert_at_clamps_past_end() {
        let mut c = rows(&["a"]);
        let index = c.insert_at(10, Row(EntityId::from("b")));
        assert_eq!(index, 1);
        assert_eq!(ids(&c), ["a", "b"]);
    }

    #[test]
    fn replace_requires_presence() {
        let mut c = rows(&["a"]);
        assert!(c.replace(Row(EntityId::from("a"))));
        assert!(!c.replace(Row(EntityId::from("q"))));
        assert_eq!(c.len(), 1);
    }
}
