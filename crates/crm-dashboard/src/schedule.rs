//! Task schedule

use crate::pipeline::single;
use crate::task::{Priority, Task, TaskDraft, TaskStatus};
use chrono::NaiveDate;
use crm_sync::{
    to_field_changes, DataAccess, EntityId, MutationOutcome, Notifier, OptimisticMutator,
    ReloadOutcome, RenderSurface, SyncError,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Task schedule controller
#[derive(Debug)]
pub struct TaskSchedule {
    tasks: OptimisticMutator<Task>,
}

impl TaskSchedule {
    /// Create schedule with an empty collection
    #[must_use]
    pub fn new(
        api: Arc<dyn DataAccess<Task>>,
        surface: Arc<dyn RenderSurface>,
        notifier: Notifier,
    ) -> Self {
        Self {
            tasks: OptimisticMutator::new(api, surface, notifier).with_label("Task"),
        }
    }

    /// Seed tasks without a reload
    #[inline]
    #[must_use]
    pub fn with_tasks(self, tasks: Vec<Task>) -> Self {
        Self {
            tasks: self.tasks.with_entities(tasks),
        }
    }

    /// Underlying mutator
    #[inline]
    #[must_use]
    pub fn mutator(&self) -> &OptimisticMutator<Task> {
        &self.tasks
    }

    /// Fetch tasks from the remote
    ///
    /// # Errors
    /// Classified [`SyncError`]; schedule untouched
    pub async fn reload(&self) -> Result<ReloadOutcome, SyncError> {
        self.tasks.reload().await
    }

    /// Tick or untick the checkbox
    ///
    /// A completed task goes back to pending; anything else becomes completed.
    ///
    /// # Errors
    /// See [`OptimisticMutator::apply_mutation`]
    pub async fn toggle_complete(&self, id: &EntityId) -> Result<MutationOutcome, SyncError> {
        let Some(current) = self.tasks.get(id).map(|task| task.status) else {
            return Ok(MutationOutcome::NotFound);
        };
        let next = if current == TaskStatus::Completed {
            TaskStatus::Pending
        } else {
            TaskStatus::Completed
        };
        self.set_status(id, next).await
    }

    /// Set progress
    ///
    /// # Errors
    /// See [`OptimisticMutator::apply_mutation`]
    pub async fn set_status(
        &self,
        id: &EntityId,
        status: TaskStatus,
    ) -> Result<MutationOutcome, SyncError> {
        self.tasks.apply_mutation(id, single("status", json!(status))).await
    }

    /// Move the due date; `None` clears it
    ///
    /// # Errors
    /// See [`OptimisticMutator::apply_mutation`]
    pub async fn reschedule(
        &self,
        id: &EntityId,
        due_date: Option<NaiveDate>,
    ) -> Result<MutationOutcome, SyncError> {
        self.tasks.apply_mutation(id, single("due_date", json!(due_date))).await
    }

    /// Set priority
    ///
    /// # Errors
    /// See [`OptimisticMutator::apply_mutation`]
    pub async fn set_priority(
        &self,
        id: &EntityId,
        priority: Priority,
    ) -> Result<MutationOutcome, SyncError> {
        self.tasks.apply_mutation(id, single("priority", json!(priority))).await
    }

    /// Create a task
    ///
    /// # Errors
    /// See [`OptimisticMutator::create`]
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, SyncError> {
        let fields = to_field_changes(&draft)?;
        self.tasks.create(fields).await
    }

    /// Delete a task
    ///
    /// # Errors
    /// See [`OptimisticMutator::delete`]
    pub async fn delete_task(&self, id: &EntityId) -> Result<MutationOutcome, SyncError> {
        self.tasks.delete(id).await
    }

    /// Tasks per status, including empty ones
    #[must_use]
    pub fn status_counts(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts: BTreeMap<TaskStatus, usize> =
            TaskStatus::ALL.into_iter().map(|status| (status, 0)).collect();
        self.tasks.read(|tasks| {
            for task in tasks {
                *counts.entry(task.status).or_default() += 1;
            }
        });
        counts
    }

    /// Tasks still to do
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.tasks
            .read(|tasks| tasks.iter().filter(|task| task.status.is_open()).count())
    }

    /// Open tasks due strictly before `today`
    #[must_use]
    pub fn overdue(&self, today: NaiveDate) -> Vec<Task> {
        self.tasks.read(|tasks| {
            tasks
                .iter()
                .filter(|task| task.status.is_open() && task.due_date.is_some_and(|d| d < today))
                .cloned()
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_sync::{ApiError, InMemoryDataAccess, Notification, NotificationSink, NullSurface};

    struct NoToasts;

    impl NotificationSink for NoToasts {
        fn show(&self, _: &Notification) {}
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn schedule() -> (Arc<InMemoryDataAccess<Task>>, TaskSchedule) {
        let tasks = vec![
            Task::new("T1", "Call Ada").due(date(3)),
            Task::new("T2", "Send quote").with_status(TaskStatus::Completed).due(date(1)),
            Task::new("T3", "Book demo").with_status(TaskStatus::InProgress),
        ];
        let api = Arc::new(InMemoryDataAccess::with_entities(tasks.clone()));
        let schedule = TaskSchedule::new(api.clone(), Arc::new(NullSurface), Notifier::new(Arc::new(NoToasts)))
            .with_tasks(tasks);
        (api, schedule)
    }

    #[tokio::test]
    async fn toggle_flips_between_completed_and_pending() {
        let (_, schedule) = schedule();
        let t1 = EntityId::from("T1");
        let t2 = EntityId::from("T2");

        schedule.toggle_complete(&t1).await.unwrap();
        schedule.toggle_complete(&t2).await.unwrap();

        assert_eq!(schedule.mutator().get(&t1).unwrap().status, TaskStatus::Completed);
        assert_eq!(schedule.mutator().get(&t2).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn toggle_missing_task_is_noop() {
        let (api, schedule) = schedule();
        let outcome = schedule.toggle_complete(&EntityId::from("T9")).await.unwrap();
        assert_eq!(outcome, MutationOutcome::NotFound);
        assert_eq!(api.calls().total(), 0);
    }

    #[tokio::test]
    async fn failed_reschedule_restores_date() {
        let (api, schedule) = schedule();
        let t1 = EntityId::from("T1");
        api.fail_next(ApiError::validation("due date is in the past"));

        let err = schedule.reschedule(&t1, Some(date(20))).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(schedule.mutator().get(&t1).unwrap().due_date, Some(date(3)));
    }

    #[test]
    fn counts_and_overdue() {
        let (_, schedule) = schedule();
        let counts = schedule.status_counts();
        assert_eq!(counts[&TaskStatus::Pending], 1);
        assert_eq!(counts[&TaskStatus::Cancelled], 0);
        assert_eq!(schedule.open_count(), 2);

        let overdue = schedule.overdue(date(5));
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id.as_str(), "T1");
    }
}
