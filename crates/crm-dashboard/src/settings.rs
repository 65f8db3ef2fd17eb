//! Account settings

use crate::account::{AccountProfile, ACCOUNT_ID, PREFERENCES};
use crate::lead::invalid;
use crate::pipeline::single;
use crm_sync::{
    DataAccess, Entity, EntityId, FieldChanges, MutationOutcome, Notifier, OptimisticMutator,
    ReloadOutcome, RenderSurface, SyncError,
};
use serde_json::Value;
use std::sync::Arc;

/// Account settings controller
///
/// Holds a single-entity collection keyed by [`ACCOUNT_ID`].
#[derive(Debug)]
pub struct AccountSettings {
    account: OptimisticMutator<AccountProfile>,
    id: EntityId,
}

impl AccountSettings {
    /// Create settings with no profile loaded
    #[must_use]
    pub fn new(
        api: Arc<dyn DataAccess<AccountProfile>>,
        surface: Arc<dyn RenderSurface>,
        notifier: Notifier,
    ) -> Self {
        Self {
            account: OptimisticMutator::new(api, surface, notifier).with_label("Settings"),
            id: EntityId::from(ACCOUNT_ID),
        }
    }

    /// Seed the profile without a reload
    #[inline]
    #[must_use]
    pub fn with_profile(self, profile: AccountProfile) -> Self {
        Self {
            account: self.account.with_entities(vec![profile]),
            id: self.id,
        }
    }

    /// Underlying mutator
    #[inline]
    #[must_use]
    pub fn mutator(&self) -> &OptimisticMutator<AccountProfile> {
        &self.account
    }

    /// Current profile, if loaded
    #[must_use]
    pub fn profile(&self) -> Option<AccountProfile> {
        self.account.get(&self.id)
    }

    /// Fetch the profile
    ///
    /// # Errors
    /// Classified [`SyncError`]
    pub async fn reload(&self) -> Result<ReloadOutcome, SyncError> {
        self.account.reload().await
    }

    /// Flip one preference toggle
    ///
    /// # Errors
    /// [`SyncError::Rejected`] if `field` is not a preference, otherwise see
    /// [`OptimisticMutator::apply_mutation`]
    pub async fn set_preference(&self, field: &str, enabled: bool) -> Result<MutationOutcome, SyncError> {
        if !PREFERENCES.contains(&field) {
            return Err(invalid(field, "not a preference").into());
        }
        self.account
            .apply_mutation(&self.id, single(field, Value::Bool(enabled)))
            .await
    }

    /// Invert one preference toggle
    ///
    /// # Errors
    /// See [`set_preference`](Self::set_preference)
    pub async fn toggle(&self, field: &str) -> Result<MutationOutcome, SyncError> {
        let Some(current) = self
            .profile()
            .and_then(|profile| profile.field(field))
            .and_then(|value| value.as_bool())
        else {
            return Ok(MutationOutcome::NotFound);
        };
        self.set_preference(field, !current).await
    }

    /// Save profile fields such as `display_name` or `timezone`
    ///
    /// # Errors
    /// See [`OptimisticMutator::apply_mutation`]
    pub async fn update_profile(&self, changes: FieldChanges) -> Result<MutationOutcome, SyncError> {
        self.account.apply_mutation(&self.id, changes).await
    }
}
