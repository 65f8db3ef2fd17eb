//! Rendering-surface patches
//!
//! The mutator never renders. It describes each visible change as a
//! [`ViewPatch`] precise enough to move one card or update one badge;
//! [`ViewPatch::Reset`] asks for a full re-render.

use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field's visible change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    /// Field name
    pub field: String,
    /// Value currently on screen
    pub old: Value,
    /// Value to show
    pub new: Value,
}

/// Change to apply to the rendered view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewPatch {
    /// Fields of one entity changed (optimistic apply or revert)
    FieldsChanged {
        /// Entity
        id: EntityId,
        /// Changed fields
        deltas: Vec<FieldDelta>,
    },
    /// Entity replaced by the server's copy
    Refreshed {
        /// Entity
        id: EntityId,
    },
    /// Entity appeared at `index`
    Inserted {
        /// Entity
        id: EntityId,
        /// Position in the collection
        index: usize,
    },
    /// Entity disappeared from `index`
    Removed {
        /// Entity
        id: EntityId,
        /// Former position in the collection
        index: usize,
    },
    /// Collection reloaded; re-render everything
    Reset {
        /// Entities now held
        count: usize,
    },
}

impl ViewPatch {
    /// Entity the patch concerns, `None` for a reset
    #[inline]
    #[must_use]
    pub fn entity(&self) -> Option<&EntityId> {
        match self {
            Self::FieldsChanged { id, .. }
            | Self::Refreshed { id }
            | Self::Inserted { id, .. }
            | Self::Removed { id, .. } => Some(id),
            Self::Reset { .. } => None,
        }
    }
}

/// Receives patches synchronously, in order
pub trait RenderSurface: Send + Sync {
    /// Apply one patch
    fn apply(&self, patch: &ViewPatch);
}

/// Surface that renders nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSurface;

impl RenderSurface for NullSurface {
    fn apply(&self, _patch: &ViewPatch) {}
}
