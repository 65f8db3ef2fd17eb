//! Lead pipeline board
//!
//! Kanban view over leads. Moving a card between columns is a status
//! mutation; badge counts and column totals are read straight from the
//! optimistic collection, so they update before the server answers.

use crate::lead::{Lead, LeadDraft, LeadStage};
use crm_sync::{
    to_field_changes, DataAccess, EntityId, FieldChanges, MutationOutcome, Notifier,
    OptimisticMutator, ReloadOutcome, RenderSurface, SyncError,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pipeline board controller
#[derive(Debug)]
pub struct PipelineBoard {
    leads: OptimisticMutator<Lead>,
}

impl PipelineBoard {
    /// Create board with an empty collection
    #[must_use]
    pub fn new(
        api: Arc<dyn DataAccess<Lead>>,
        surface: Arc<dyn RenderSurface>,
        notifier: Notifier,
    ) -> Self {
        Self {
            leads: OptimisticMutator::new(api, surface, notifier).with_label("Lead"),
        }
    }

    /// Seed leads without a reload
    #[inline]
    #[must_use]
    pub fn with_leads(self, leads: Vec<Lead>) -> Self {
        Self {
            leads: self.leads.with_entities(leads),
        }
    }

    /// Underlying mutator
    #[inline]
    #[must_use]
    pub fn mutator(&self) -> &OptimisticMutator<Lead> {
        &self.leads
    }

    /// Fetch leads from the remote
    ///
    /// # Errors
    /// Classified [`SyncError`]; board untouched
    pub async fn reload(&self) -> Result<ReloadOutcome, SyncError> {
        self.leads.reload().await
    }

    /// Move a lead to another column
    ///
    /// # Errors
    /// See [`OptimisticMutator::apply_mutation`]
    pub async fn move_lead(
        &self,
        id: &EntityId,
        stage: LeadStage,
    ) -> Result<MutationOutcome, SyncError> {
        tracing::debug!(%id, %stage, "moving lead");
        self.leads.apply_mutation(id, single("status", json!(stage))).await
    }

    /// Update the estimated deal value
    ///
    /// # Errors
    /// [`SyncError::Rejected`] for a negative value, otherwise see
    /// [`OptimisticMutator::apply_mutation`]
    pub async fn set_potential_value(
        &self,
        id: &EntityId,
        value: i64,
    ) -> Result<MutationOutcome, SyncError> {
        self.leads
            .apply_mutation(id, single("potential_value", json!(value)))
            .await
    }

    /// Create a lead
    ///
    /// # Errors
    /// See [`OptimisticMutator::create`]
    pub async fn create_lead(&self, draft: LeadDraft) -> Result<Lead, SyncError> {
        let fields = to_field_changes(&draft)?;
        self.leads.create(fields).await
    }

    /// Delete a lead
    ///
    /// # Errors
    /// See [`OptimisticMutator::delete`]
    pub async fn delete_lead(&self, id: &EntityId) -> Result<MutationOutcome, SyncError> {
        self.leads.delete(id).await
    }

    /// Badge count for every column, including empty ones
    #[must_use]
    pub fn stage_counts(&self) -> BTreeMap<LeadStage, usize> {
        let mut counts: BTreeMap<LeadStage, usize> =
            LeadStage::ALL.into_iter().map(|stage| (stage, 0)).collect();
        self.leads.read(|leads| {
            for lead in leads {
                *counts.entry(lead.status).or_default() += 1;
            }
        });
        counts
    }

    /// Sum of potential values in one column
    #[must_use]
    pub fn stage_value(&self, stage: LeadStage) -> i64 {
        self.leads.read(|leads| {
            leads
                .iter()
                .filter(|lead| lead.status == stage)
                .map(|lead| lead.potential_value)
                .sum()
        })
    }

    /// Sum of potential values on deals still open
    #[must_use]
    pub fn open_pipeline_value(&self) -> i64 {
        self.leads.read(|leads| {
            leads
                .iter()
                .filter(|lead| !lead.status.is_closed())
                .map(|lead| lead.potential_value)
                .sum()
        })
    }

    /// Leads in one column, in collection order
    #[must_use]
    pub fn leads_in(&self, stage: LeadStage) -> Vec<Lead> {
        self.leads.read(|leads| {
            leads
                .iter()
                .filter(|lead| lead.status == stage)
                .cloned()
                .collect()
        })
    }
}

pub(crate) fn single(field: &str, value: serde_json::Value) -> FieldChanges {
    FieldChanges::from([(field.to_string(), value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_sync::{InMemoryDataAccess, NullSurface};

    fn board() -> PipelineBoard {
        let leads = vec![
            Lead::new("L1", "Ada").with_value(100),
            Lead::new("L2", "Grace").with_status(LeadStage::Won).with_value(400),
            Lead::new("L3", "Linus").with_value(50),
        ];
        let api = Arc::new(InMemoryDataAccess::with_entities(leads.clone()));
        PipelineBoard::new(api, Arc::new(NullSurface), Notifier::new(Arc::new(NoToasts)))
            .with_leads(leads)
    }

    struct NoToasts;

    impl crm_sync::NotificationSink for NoToasts {
        fn show(&self, _: &crm_sync::Notification) {}
    }

    #[test]
    fn counts_include_empty_columns() {
        let counts = board().stage_counts();
        assert_eq!(counts.len(), LeadStage::ALL.len());
        assert_eq!(counts[&LeadStage::New], 2);
        assert_eq!(counts[&LeadStage::Won], 1);
        assert_eq!(counts[&LeadStage::Negotiation], 0);
    }

    #[test]
    fn column_and_open_totals() {
        let board = board();
        assert_eq!(board.stage_value(LeadStage::New), 150);
        assert_eq!(board.stage_value(LeadStage::Lost), 0);
        assert_eq!(board.open_pipeline_value(), 150);
        assert_eq!(board.leads_in(LeadStage::Won)[0].name, "Grace");
    }

    #[tokio::test]
    async fn move_updates_counts() {
        let board = board();
        let outcome = board
            .move_lead(&EntityId::from("L1"), LeadStage::Contacted)
            .await
            .unwrap();
        assert_eq!(outcome, MutationOutcome::Confirmed);
        assert_eq!(board.stage_counts()[&LeadStage::Contacted], 1);
        assert_eq!(board.stage_counts()[&LeadStage::New], 1);
    }

    #[tokio::test]
    async fn negative_value_is_rejected_locally() {
        let board = board();
        let err = board
            .set_potential_value(&EntityId::from("L1"), -5)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Rejected(_)));
        assert_eq!(board.stage_value(LeadStage::New), 150);
    }
}
