//! Account profile and preferences entity

use crate::lead::invalid;
use crm_sync::types::{decode_field, encode_field};
use crm_sync::{Entity, EntityId, FieldError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of the single account record
pub const ACCOUNT_ID: &str = "account";

/// Preference toggles a user may flip
pub const PREFERENCES: [&str; 3] = ["email_notifications", "task_reminders", "weekly_digest"];

fn default_account_id() -> EntityId {
    EntityId::from(ACCOUNT_ID)
}

fn default_true() -> bool {
    true
}

/// Signed-in user's profile and preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountProfile {
    /// Always [`ACCOUNT_ID`]
    #[serde(default = "default_account_id")]
    pub id: EntityId,
    /// Name shown in the header
    pub display_name: String,
    /// Login email; changed through the auth provider only
    pub email: String,
    /// IANA time zone name
    #[serde(default)]
    pub timezone: Option<String>,
    /// Email on lead activity
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    /// Reminders for due tasks
    #[serde(default = "default_true")]
    pub task_reminders: bool,
    /// Weekly pipeline summary
    #[serde(default)]
    pub weekly_digest: bool,
}

impl AccountProfile {
    /// Profile with default preferences
    #[must_use]
    pub fn new(display_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: default_account_id(),
            display_name: display_name.into(),
            email: email.into(),
            timezone: None,
            email_notifications: true,
            task_reminders: true,
            weekly_digest: false,
        }
    }
}

impl Entity for AccountProfile {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => encode_field(&self.id),
            "display_name" => encode_field(&self.display_name),
            "email" => encode_field(&self.email),
            "timezone" => encode_field(&self.timezone),
            "email_notifications" => encode_field(&self.email_notifications),
            "task_reminders" => encode_field(&self.task_reminders),
            "weekly_digest" => encode_field(&self.weekly_digest),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "id" | "email" => return Err(FieldError::ReadOnly(name.to_string())),
            "display_name" => {
                let text: String = decode_field(name, value)?;
                if text.trim().is_empty() {
                    return Err(invalid(name, "must not be empty"));
                }
                self.display_name = text;
            }
            "timezone" => self.timezone = decode_field(name, value)?,
            "email_notifications" => self.email_notifications = decode_field(name, value)?,
            "task_reminders" => self.task_reminders = decode_field(name, value)?,
            "weekly_digest" => self.weekly_digest = decode_field(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}
