//! Lead entity for the pipeline board

use chrono::{DateTime, Utc};
use crm_sync::types::{decode_field, encode_field};
use crm_sync::{Entity, EntityId, FieldError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pipeline stage (kanban column)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStage {
    /// Just captured
    #[default]
    New,
    /// First contact made
    Contacted,
    /// Confirmed fit
    Qualified,
    /// Proposal sent
    Proposal,
    /// Terms under discussion
    Negotiation,
    /// Closed, won
    Won,
    /// Closed, lost
    Lost,
}

impl LeadStage {
    /// Every stage in board order
    pub const ALL: [LeadStage; 7] = [
        LeadStage::New,
        LeadStage::Contacted,
        LeadStage::Qualified,
        LeadStage::Proposal,
        LeadStage::Negotiation,
        LeadStage::Won,
        LeadStage::Lost,
    ];

    /// Wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Qualified => "qualified",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    /// Check if the deal is closed
    #[inline]
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl std::fmt::Display for LeadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStage {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| FieldError::InvalidValue {
                field: "status".to_string(),
                reason: format!("unknown stage '{s}'"),
            })
    }
}

/// Sales lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Identifier
    pub id: EntityId,
    /// Contact name
    pub name: String,
    /// Company
    #[serde(default)]
    pub company: Option<String>,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Pipeline stage
    #[serde(default)]
    pub status: LeadStage,
    /// Estimated deal value, whole currency units
    #[serde(default)]
    pub potential_value: i64,
    /// Free-form notes
    #[serde(default)]
    pub notes: Option<String>,
    /// Set by the server
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// Create lead in the first stage
    #[must_use]
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            company: None,
            email: None,
            status: LeadStage::New,
            potential_value: 0,
            notes: None,
            created_at: None,
        }
    }

    /// With stage
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: LeadStage) -> Self {
        self.status = status;
        self
    }

    /// With potential value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: i64) -> Self {
        self.potential_value = value;
        self
    }
}

impl Entity for Lead {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => encode_field(&self.id),
            "name" => encode_field(&self.name),
            "company" => encode_field(&self.company),
            "email" => encode_field(&self.email),
            "status" => encode_field(&self.status),
            "potential_value" => encode_field(&self.potential_value),
            "notes" => encode_field(&self.notes),
            "created_at" => encode_field(&self.created_at),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "id" | "created_at" => return Err(FieldError::ReadOnly(name.to_string())),
            "name" => {
                let text: String = decode_field(name, value)?;
                if text.trim().is_empty() {
                    return Err(invalid(name, "must not be empty"));
                }
                self.name = text;
            }
            "company" => self.company = decode_field(name, value)?,
            "email" => {
                let email: Option<String> = decode_field(name, value)?;
                if email.as_deref().is_some_and(|e| !e.contains('@')) {
                    return Err(invalid(name, "not an email address"));
                }
                self.email = email;
            }
            "status" => self.status = decode_field(name, value)?,
            "potential_value" => {
                let amount: i64 = decode_field(name, value)?;
                if amount < 0 {
                    return Err(invalid(name, "must not be negative"));
                }
                self.potential_value = amount;
            }
            "notes" => self.notes = decode_field(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

pub(crate) fn invalid(field: &str, reason: &str) -> FieldError {
    FieldError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Fields for a new lead; the server assigns the id
#[derive(Debug, Clone, Serialize)]
pub struct LeadDraft {
    /// Contact name
    pub name: String,
    /// Company
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Contact email
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Starting stage
    pub status: LeadStage,
    /// Estimated deal value
    pub potential_value: i64,
}

impl LeadDraft {
    /// Draft in the first stage with no value
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            company: None,
            email: None,
            status: LeadStage::New,
            potential_value: 0,
        }
    }

    /// With company
    #[inline]
    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// With potential value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: i64) -> Self {
        self.potential_value = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_round_trips_through_wire_name() {
        for stage in LeadStage::ALL {
            assert_eq!(stage.as_str().parse::<LeadStage>().unwrap(), stage);
            assert_eq!(encode_field(&stage), Some(json!(stage.as_str())));
        }
        assert!("archived".parse::<LeadStage>().is_err());
    }

    #[test]
    fn status_only_accepts_known_stages() {
        let mut lead = Lead::new("L1", "Ada");
        assert!(lead.set_field("status", json!("qualified")).is_ok());
        assert_eq!(lead.status, LeadStage::Qualified);
        assert!(lead.set_field("status", json!("archived")).is_err());
        assert_eq!(lead.status, LeadStage::Qualified);
    }

    #[test]
    fn value_must_be_non_negative_integer() {
        let mut lead = Lead::new("L1", "Ada");
        assert!(lead.set_field("potential_value", json!(500)).is_ok());
        assert!(lead.set_field("potential_value", json!(-1)).is_err());
        assert!(lead.set_field("potential_value", json!("500")).is_err());
        assert_eq!(lead.potential_value, 500);
    }

    #[test]
    fn server_fields_are_read_only() {
        let mut lead = Lead::new("L1", "Ada");
        assert_eq!(
            lead.set_field("id", json!("L2")),
            Err(FieldError::ReadOnly("id".to_string()))
        );
        assert!(matches!(
            lead.set_field("created_at", json!(null)),
            Err(FieldError::ReadOnly(_))
        ));
    }

    #[test]
    fn deserializes_sparse_server_payload() {
        let lead: Lead = serde_json::from_value(json!({
            "id": "L7",
            "name": "Grace",
            "status": "proposal",
            "potential_value": 1200,
            "created_at": "2024-03-01T09:30:00Z"
        }))
        .unwrap();
        assert_eq!(lead.status, LeadStage::Proposal);
        assert_eq!(lead.company, None);
        assert!(lead.created_at.is_some());
    }

    #[test]
    fn draft_omits_empty_optionals() {
        let fields = crm_sync::to_field_changes(&LeadDraft::new("Ada").with_value(10)).unwrap();
        assert!(!fields.contains_key("company"));
        assert_eq!(fields["status"], json!("new"));
        assert_eq!(fields["potential_value"], json!(10));
    }
}
