//! Scheduled task entity

use crate::lead::invalid;
use chrono::NaiveDate;
use crm_sync::types::{decode_field, encode_field};
use crm_sync::{Entity, EntityId, FieldError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started
    #[default]
    Pending,
    /// Being worked on
    InProgress,
    /// Done
    Completed,
    /// Dropped
    Cancelled,
}

impl TaskStatus {
    /// Every status
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Cancelled,
    ];

    /// Check if the task still needs doing
    #[inline]
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low
    Low,
    /// Medium
    #[default]
    Medium,
    /// High
    High,
}

/// Follow-up task, optionally tied to a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier
    pub id: EntityId,
    /// Short title
    pub title: String,
    /// Longer description
    #[serde(default)]
    pub description: Option<String>,
    /// Progress
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority
    #[serde(default)]
    pub priority: Priority,
    /// Due date
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    /// Related lead
    #[serde(default)]
    pub lead_id: Option<EntityId>,
}

impl Task {
    /// Create pending task
    #[must_use]
    pub fn new(id: impl Into<EntityId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            status: TaskStatus::Pending,
            priority: Priority::Medium,
            due_date: None,
            lead_id: None,
        }
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// With due date
    #[inline]
    #[must_use]
    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }
}

impl Entity for Task {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => encode_field(&self.id),
            "title" => encode_field(&self.title),
            "description" => encode_field(&self.description),
            "status" => encode_field(&self.status),
            "priority" => encode_field(&self.priority),
            "due_date" => encode_field(&self.due_date),
            "lead_id" => encode_field(&self.lead_id),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "id" => return Err(FieldError::ReadOnly(name.to_string())),
            "title" => {
                let title: String = decode_field(name, value)?;
                if title.trim().is_empty() {
                    return Err(invalid(name, "must not be empty"));
                }
                self.title = title;
            }
            "description" => self.description = decode_field(name, value)?,
            "status" => self.status = decode_field(name, value)?,
            "priority" => self.priority = decode_field(name, value)?,
            "due_date" => self.due_date = decode_field(name, value)?,
            "lead_id" => self.lead_id = decode_field(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

/// Fields for a new task
#[derive(Debug, Clone, Serialize)]
pub struct TaskDraft {
    /// Short title
    pub title: String,
    /// Priority
    pub priority: Priority,
    /// Due date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Related lead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<EntityId>,
}

impl TaskDraft {
    /// Medium-priority draft with no date
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            priority: Priority::Medium,
            due_date: None,
            lead_id: None,
        }
    }

    /// With due date
    #[inline]
    #[must_use]
    pub fn due(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    /// For a lead
    #[inline]
    #[must_use]
    pub fn for_lead(mut self, lead: EntityId) -> Self {
        self.lead_id = Some(lead);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn due_date_uses_iso_format() {
        let mut task = Task::new("T1", "Send proposal");
        task.set_field("due_date", json!("2024-05-17")).unwrap();
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2024, 5, 17));
        assert_eq!(task.field("due_date"), Some(json!("2024-05-17")));

        assert!(task.set_field("due_date", json!("17/05/2024")).is_err());
        task.set_field("due_date", Value::Null).unwrap();
        assert_eq!(task.due_date, None);
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(encode_field(&TaskStatus::InProgress), Some(json!("in_progress")));
        assert!(TaskStatus::InProgress.is_open());
        assert!(!TaskStatus::Cancelled.is_open());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut task = Task::new("T1", "Call");
        assert!(task.set_field("title", json!("  ")).is_err());
        assert_eq!(task.title, "Call");
    }
}
