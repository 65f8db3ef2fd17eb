//! Optimistic mutator
//!
//! Owns one collection and keeps it converging with the remote:
//! 1. Validate and capture previous values
//! 2. Write the change locally and patch the view, synchronously
//! 3. Send the request
//! 4. On a recoverable failure restore the captured values; on a terminal
//!    failure keep them and halt further sync until `resume` or `reload`
//!
//! The collection lock is only ever held between awaits, never across one.

use crate::api::DataAccess;
use crate::collection::Collection;
use crate::error::{ApiError, ApiErrorKind, ErrorClass, SyncError};
use crate::guard::RefreshGuard;
use crate::notify::Notifier;
use crate::state::{validate_transition, MutationState, TransitionError};
use crate::types::{Entity, EntityId, FieldChanges};
use crate::view::{FieldDelta, RenderSurface, ViewPatch};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Result of a mutation or delete that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Remote accepted the change
    Confirmed,
    /// Requested values already held; no request sent
    Unchanged,
    /// No entity with that id; nothing done
    NotFound,
}

/// Result of a reload that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// Collection replaced
    Loaded {
        /// Entities now held
        count: usize,
    },
    /// Another reload was in flight; this one was dropped
    Skipped,
}

/// A mutation that has been applied locally and awaits the remote
///
/// Produced by [`OptimisticMutator::begin`], consumed by
/// [`OptimisticMutator::settle`].
#[derive(Debug)]
#[must_use = "an applied mutation must be settled or the remote never sees it"]
pub struct PendingMutation {
    id: EntityId,
    changes: FieldChanges,
    previous: FieldChanges,
    applied: FieldChanges,
    state: MutationState,
}

impl PendingMutation {
    /// Target entity
    #[inline]
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    /// Requested changes
    #[inline]
    #[must_use]
    pub fn changes(&self) -> &FieldChanges {
        &self.changes
    }

    /// Values held before the change
    #[inline]
    #[must_use]
    pub fn previous(&self) -> &FieldChanges {
        &self.previous
    }

    /// Current lifecycle state
    #[inline]
    #[must_use]
    pub fn state(&self) -> MutationState {
        self.state
    }

    fn transition(&mut self, to: MutationState) -> Result<(), TransitionError> {
        validate_transition(self.state, to)?;
        self.state = to;
        Ok(())
    }
}

/// Optimistic state owner for one collection
pub struct OptimisticMutator<E: Entity> {
    label: String,
    collection: Mutex<Collection<E>>,
    api: Arc<dyn DataAccess<E>>,
    surface: Arc<dyn RenderSurface>,
    notifier: Notifier,
    refresh: RefreshGuard,
    halted: Mutex<Option<ApiError>>,
}

impl<E: Entity> std::fmt::Debug for OptimisticMutator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticMutator")
            .field("label", &self.label)
            .field("len", &self.collection.lock().len())
            .field("halted", &self.halted.lock().as_ref().map(|e| e.kind))
            .field("refreshing", &self.refresh.is_in_flight())
            .finish_non_exhaustive()
    }
}

impl<E: Entity> OptimisticMutator<E> {
    /// Create mutator over an empty collection
    #[must_use]
    pub fn new(
        api: Arc<dyn DataAccess<E>>,
        surface: Arc<dyn RenderSurface>,
        notifier: Notifier,
    ) -> Self {
        Self {
            label: "Item".to_string(),
            collection: Mutex::new(Collection::new()),
            api,
            surface,
            notifier,
            refresh: RefreshGuard::new(),
            halted: Mutex::new(None),
        }
    }

    /// Name used in success messages ("Lead created")
    #[inline]
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Seed the collection without a reload
    #[inline]
    #[must_use]
    pub fn with_entities(self, entities: Vec<E>) -> Self {
        self.collection.lock().replace_all(entities);
        self
    }

    /// Entity label
    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The notifier this mutator reports through
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Clone of one entity
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<E> {
        self.collection.lock().get(id).cloned()
    }

    /// Clone of the whole collection
    #[must_use]
    pub fn snapshot(&self) -> Vec<E> {
        self.collection.lock().to_vec()
    }

    /// Number of entities held
    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.lock().len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.lock().is_empty()
    }

    /// Read the collection in place
    ///
    /// `f` must not call back into the mutator.
    pub fn read<R>(&self, f: impl FnOnce(&Collection<E>) -> R) -> R {
        f(&self.collection.lock())
    }

    /// Check if a terminal failure has halted sync
    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted.lock().is_some()
    }

    /// Kind of the failure that halted sync
    #[must_use]
    pub fn halted_kind(&self) -> Option<ApiErrorKind> {
        self.halted.lock().as_ref().map(|e| e.kind)
    }

    /// Check if a reload is in flight
    #[inline]
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_in_flight()
    }

    /// Clear the halt latch after the user signed in again
    pub fn resume(&self) {
        if let Some(error) = self.halted.lock().take() {
            tracing::info!(label = %self.label, kind = %error.kind, "sync resumed");
        }
    }

    /// Apply a change optimistically and sync it
    ///
    /// # Errors
    /// - [`SyncError::Rejected`] if a field is unknown, read-only or invalid (nothing written)
    /// - [`SyncError::Halted`] if an earlier terminal failure halted sync (nothing written)
    /// - [`SyncError::Terminal`] on auth/network failure (change kept, sync halted)
    /// - [`SyncError::Recoverable`] on any other failure (change reverted)
    pub async fn apply_mutation(
        &self,
        id: &EntityId,
        changes: FieldChanges,
    ) -> Result<MutationOutcome, SyncError> {
        match self.begin(id, changes)? {
            Some(pending) => self.settle(pending).await,
            None if self.collection.lock().contains(id) => Ok(MutationOutcome::Unchanged),
            None => Ok(MutationOutcome::NotFound),
        }
    }

    /// Synchronous half of [`apply_mutation`](Self::apply_mutation)
    ///
    /// Returns `None` when the entity is missing or already holds the
    /// requested values; in both cases nothing is written or sent.
    ///
    /// # Errors
    /// [`SyncError::Rejected`] or [`SyncError::Halted`]; nothing is written
    pub fn begin(
        &self,
        id: &EntityId,
        changes: FieldChanges,
    ) -> Result<Option<PendingMutation>, SyncError> {
        if !self.collection.lock().contains(id) {
            tracing::debug!(label = %self.label, %id, "mutation target not in collection");
            return Ok(None);
        }
        self.ensure_live()?;

        let (previous, applied) = {
            let mut collection = self.collection.lock();
            let Some(entity) = collection.get_mut(id) else {
                return Ok(None);
            };

            let mut next = entity.clone();
            next.apply_changes(&changes)?;
            let previous = entity.snapshot(&changes)?;
            let applied = next.snapshot(&changes)?;
            if previous == applied {
                tracing::debug!(label = %self.label, %id, "mutation is a no-op");
                return Ok(None);
            }
            *entity = next;
            (previous, applied)
        };

        self.surface.apply(&ViewPatch::FieldsChanged {
            id: id.clone(),
            deltas: deltas(&previous, &applied),
        });
        tracing::debug!(label = %self.label, %id, fields = ?changes.keys().collect::<Vec<_>>(), "applied optimistically");

        let mut pending = PendingMutation {
            id: id.clone(),
            changes,
            previous,
            applied,
            state: MutationState::Idle,
        };
        pending.transition(MutationState::Applied)?;
        Ok(Some(pending))
    }

    /// Asynchronous half of [`apply_mutation`](Self::apply_mutation)
    ///
    /// # Errors
    /// [`SyncError::Terminal`] or [`SyncError::Recoverable`]
    pub async fn settle(&self, mut pending: PendingMutation) -> Result<MutationOutcome, SyncError> {
        let result = self.api.update(&pending.id, &pending.changes).await;

        match result {
            Ok(remote) => {
                pending.transition(MutationState::Confirmed)?;
                if let Some(remote) = remote {
                    self.reconcile(remote);
                }
                tracing::debug!(label = %self.label, id = %pending.id, "mutation confirmed");
                pending.transition(MutationState::Idle)?;
                Ok(MutationOutcome::Confirmed)
            }
            Err(error) => match error.class() {
                ErrorClass::Terminal => {
                    pending.transition(MutationState::AppliedTerminalFailure)?;
                    Err(self.halt(Some(pending.id), error))
                }
                ErrorClass::Recoverable => {
                    self.revert(&pending);
                    pending.transition(MutationState::RevertedRecoverable)?;
                    tracing::warn!(label = %self.label, id = %pending.id, %error, "mutation reverted");
                    self.notifier.error(error.user_message());
                    pending.transition(MutationState::Idle)?;
                    Err(SyncError::Recoverable {
                        entity: Some(pending.id),
                        source: error,
                    })
                }
            },
        }
    }

    /// Replace the collection from the remote
    ///
    /// Dropped when another reload is in flight. A successful reload clears
    /// the halt latch.
    ///
    /// # Errors
    /// [`SyncError::Terminal`] or [`SyncError::Recoverable`]; collection untouched
    pub async fn reload(&self) -> Result<ReloadOutcome, SyncError> {
        let Some(_permit) = self.refresh.try_acquire() else {
            tracing::debug!(label = %self.label, "reload already in flight; dropping request");
            return Ok(ReloadOutcome::Skipped);
        };

        match self.api.list().await {
            Ok(entities) => {
                let count = {
                    let mut collection = self.collection.lock();
                    collection.replace_all(entities);
                    collection.len()
                };
                self.resume();
                self.surface.apply(&ViewPatch::Reset { count });
                tracing::info!(label = %self.label, count, "collection reloaded");
                Ok(ReloadOutcome::Loaded { count })
            }
            Err(error) => Err(self.report(None, error)),
        }
    }

    /// Create an entity remotely, then add it locally
    ///
    /// # Errors
    /// [`SyncError::Halted`], [`SyncError::Terminal`] or [`SyncError::Recoverable`]
    pub async fn create(&self, fields: FieldChanges) -> Result<E, SyncError> {
        self.ensure_live()?;

        match self.api.create(fields).await {
            Ok(entity) => {
                let id = entity.id().clone();
                let index = self.collection.lock().push(entity.clone());
                self.surface.apply(&ViewPatch::Inserted { id: id.clone(), index });
                tracing::info!(label = %self.label, %id, "created");
                self.notifier.success(format!("{} created", self.label));
                Ok(entity)
            }
            Err(error) => Err(self.report(None, error)),
        }
    }

    /// Remove an entity optimistically, then delete it remotely
    ///
    /// # Errors
    /// - [`SyncError::Halted`] (nothing removed)
    /// - [`SyncError::Terminal`] (stays removed, sync halted)
    /// - [`SyncError::Recoverable`] (put back where it was)
    pub async fn delete(&self, id: &EntityId) -> Result<MutationOutcome, SyncError> {
        if !self.collection.lock().contains(id) {
            return Ok(MutationOutcome::NotFound);
        }
        self.ensure_live()?;

        let Some((index, entity)) = self.collection.lock().remove(id) else {
            return Ok(MutationOutcome::NotFound);
        };
        self.surface.apply(&ViewPatch::Removed { id: id.clone(), index });

        match self.api.delete(id).await {
            Ok(()) => {
                tracing::info!(label = %self.label, %id, "deleted");
                self.notifier.success(format!("{} deleted", self.label));
                Ok(MutationOutcome::Confirmed)
            }
            Err(error) if error.is_terminal() => Err(self.halt(Some(id.clone()), error)),
            Err(error) => {
                let index = self.collection.lock().insert_at(index, entity);
                self.surface.apply(&ViewPatch::Inserted { id: id.clone(), index });
                tracing::warn!(label = %self.label, %id, %error, "delete reverted");
                self.notifier.error(error.user_message());
                Err(SyncError::Recoverable {
                    entity: Some(id.clone()),
                    source: error,
                })
            }
        }
    }

    /// Refuse while halted; the halting failure already showed its toast
    fn ensure_live(&self) -> Result<(), SyncError> {
        match self.halted.lock().as_ref() {
            Some(error) => {
                tracing::debug!(label = %self.label, kind = %error.kind, "refused while halted");
                Err(SyncError::Halted { kind: error.kind })
            }
            None => Ok(()),
        }
    }

    /// Terminal: latch, notify once. Recoverable: notify.
    fn report(&self, entity: Option<EntityId>, error: ApiError) -> SyncError {
        match error.class() {
            ErrorClass::Terminal => self.halt(entity, error),
            ErrorClass::Recoverable => {
                tracing::warn!(label = %self.label, %error, "request failed");
                self.notifier.error(error.user_message());
                SyncError::Recoverable { entity, source: error }
            }
        }
    }

    fn halt(&self, entity: Option<EntityId>, error: ApiError) -> SyncError {
        tracing::error!(label = %self.label, entity = ?entity, %error, "terminal failure; sync halted");
        self.notifier.error(error.user_message());
        *self.halted.lock() = Some(error.clone());
        SyncError::Terminal { entity, source: error }
    }

    /// Restore captured values, skipping fields a later edit has since changed
    fn revert(&self, pending: &PendingMutation) {
        let mut restored = Vec::new();
        {
            let mut collection = self.collection.lock();
            let Some(entity) = collection.get_mut(&pending.id) else {
                tracing::debug!(label = %self.label, id = %pending.id, "reverted entity no longer present");
                return;
            };

            for (field, old) in &pending.previous {
                let applied = pending.applied.get(field);
                let current = entity.field(field);
                if current.as_ref() != applied {
                    continue;
                }
                match entity.set_field(field, old.clone()) {
                    Ok(()) => restored.push(FieldDelta {
                        field: field.clone(),
                        old: current.unwrap_or(Value::Null),
                        new: old.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(label = %self.label, id = %pending.id, %field, error = %e, "could not restore field");
                    }
                }
            }
        }

        if !restored.is_empty() {
            self.surface.apply(&ViewPatch::FieldsChanged {
                id: pending.id.clone(),
                deltas: restored,
            });
        }
    }

    fn reconcile(&self, remote: E) {
        let changed = {
            let mut collection = self.collection.lock();
            match collection.get(remote.id()) {
                Some(local) if *local != remote => collection.replace(remote.clone()),
                _ => false,
            }
        };
        if changed {
            self.surface.apply(&ViewPatch::Refreshed {
                id: remote.id().clone(),
            });
        }
    }
}

fn deltas(previous: &FieldChanges, applied: &FieldChanges) -> Vec<FieldDelta> {
    applied
        .iter()
        .filter_map(|(field, new)| {
            let old = previous.get(field).cloned().unwrap_or(Value::Null);
            (old != *new).then(|| FieldDelta {
                field: field.clone(),
                old,
                new: new.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::memory::InMemoryDataAccess;
    use crate::notify::{Notification, NotificationSink};
    use crate::types::{decode_field, encode_field};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Deal {
        id: EntityId,
        stage: String,
        #[serde(default)]
        amount: i64,
    }

    impl Entity for Deal {
        fn id(&self) -> &EntityId {
            &self.id
        }

        fn field(&self, name: &str) -> Option<Value> {
            match name {
                "stage" => encode_field(&self.stage),
                "amount" => encode_field(&self.amount),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
            match name {
                "stage" => self.stage = decode_field(name, value)?,
                "amount" => self.amount = decode_field(name, value)?,
                _ => return Err(FieldError::UnknownField(name.to_string())),
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct Toasts(Mutex<Vec<Notification>>);

    impl NotificationSink for Toasts {
        fn show(&self, notification: &Notification) {
            self.0.lock().push(notification.clone());
        }
    }

    #[derive(Default)]
    struct Patches(Mutex<Vec<ViewPatch>>);

    impl RenderSurface for Patches {
        fn apply(&self, patch: &ViewPatch) {
            self.0.lock().push(patch.clone());
        }
    }

    struct Fixture {
        api: Arc<InMemoryDataAccess<Deal>>,
        toasts: Arc<Toasts>,
        patches: Arc<Patches>,
        mutator: OptimisticMutator<Deal>,
    }

    fn fixture() -> Fixture {
        let deal = Deal {
            id: EntityId::from("D1"),
            stage: "new".to_string(),
            amount: 10,
        };
        let api = Arc::new(InMemoryDataAccess::with_entities([deal.clone()]));
        let toasts = Arc::new(Toasts::default());
        let patches = Arc::new(Patches::default());
        let mutator = OptimisticMutator::new(api.clone(), patches.clone(), Notifier::new(toasts.clone()))
            .with_label("Deal")
            .with_entities(vec![deal]);
        Fixture {
            api,
            toasts,
            patches,
            mutator,
        }
    }

    fn stage(to: &str) -> FieldChanges {
        FieldChanges::from([("stage".to_string(), json!(to))])
    }

    #[tokio::test]
    async fn begin_applies_before_the_request() {
        let f = fixture();
        let id = EntityId::from("D1");

        let pending = f.mutator.begin(&id, stage("won")).unwrap().unwrap();
        assert_eq!(pending.state(), MutationState::Applied);
        assert_eq!(pending.previous()["stage"], json!("new"));
        assert_eq!(f.mutator.get(&id).unwrap().stage, "won");
        assert_eq!(f.api.calls().update, 0);
        assert_eq!(f.patches.0.lock().len(), 1);

        assert_eq!(f.mutator.settle(pending).await.unwrap(), MutationOutcome::Confirmed);
        assert_eq!(f.api.calls().update, 1);
    }

    #[tokio::test]
    async fn rejected_change_writes_nothing() {
        let f = fixture();
        let id = EntityId::from("D1");
        let changes = FieldChanges::from([
            ("stage".to_string(), json!("won")),
            ("amount".to_string(), json!("lots")),
        ]);

        let err = f.mutator.apply_mutation(&id, changes).await.unwrap_err();
        assert!(matches!(err, SyncError::Rejected(FieldError::InvalidValue { .. })));
        assert_eq!(f.mutator.get(&id).unwrap().stage, "new");
        assert!(f.patches.0.lock().is_empty());
        assert_eq!(f.api.calls().total(), 0);
    }

    #[tokio::test]
    async fn same_value_is_unchanged_without_request() {
        let f = fixture();
        let outcome = f.mutator.apply_mutation(&EntityId::from("D1"), stage("new")).await.unwrap();
        assert_eq!(outcome, MutationOutcome::Unchanged);
        assert_eq!(f.api.calls().total(), 0);
    }

    #[tokio::test]
    async fn recoverable_revert_skips_fields_edited_since() {
        let f = fixture();
        let id = EntityId::from("D1");

        let first = f.mutator.begin(&id, stage("won")).unwrap().unwrap();
        let second = f.mutator.begin(&id, stage("lost")).unwrap().unwrap();

        f.api.fail_next(ApiError::validation("stage locked"));
        assert!(f.mutator.settle(first).await.is_err());
        assert_eq!(f.mutator.get(&id).unwrap().stage, "lost");

        assert!(f.mutator.settle(second).await.is_ok());
    }

    #[tokio::test]
    async fn halted_mutator_refuses_and_resume_clears() {
        let f = fixture();
        let id = EntityId::from("D1");

        f.api.fail_next(ApiError::authentication("Authentication required"));
        let err = f.mutator.apply_mutation(&id, stage("won")).await.unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(f.mutator.halted_kind(), Some(ApiErrorKind::Authentication));

        let err = f.mutator.apply_mutation(&id, stage("lost")).await.unwrap_err();
        assert!(matches!(err, SyncError::Halted { kind: ApiErrorKind::Authentication }));
        assert_eq!(f.mutator.get(&id).unwrap().stage, "won");
        assert_eq!(f.api.calls().update, 1);
        assert_eq!(f.toasts.0.lock().len(), 1);

        f.mutator.resume();
        assert!(!f.mutator.is_halted());
        assert!(f.mutator.apply_mutation(&id, stage("lost")).await.is_ok());
    }

    #[tokio::test]
    async fn server_copy_replaces_local_when_different() {
        let f = fixture();
        let id = EntityId::from("D1");
        f.api.insert(Deal {
            id: id.clone(),
            stage: "new".to_string(),
            amount: 99,
        });

        f.mutator.apply_mutation(&id, stage("won")).await.unwrap();
        let local = f.mutator.get(&id).unwrap();
        assert_eq!((local.stage.as_str(), local.amount), ("won", 99));
        assert!(f
            .patches
            .0
            .lock()
            .iter()
            .any(|p| matches!(p, ViewPatch::Refreshed { .. })));
    }
}
