//! Error types for CRM Sync
//!
//! Two layers:
//! - [`ApiError`]: what the data-access collaborator reports, carrying a typed
//!   [`ApiErrorKind`] decided where the failure was observed
//! - [`SyncError`]: what a mutation reports to its caller, after the
//!   terminal/recoverable policy has been applied

use crate::state::TransitionError;
use crate::types::EntityId;
use serde::{Deserialize, Serialize};

/// Failure kind reported by the data-access layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Session missing, expired or rejected
    Authentication,
    /// Connection refused, dropped or timed out
    Network,
    /// Server rejected the values
    Validation,
    /// Entity no longer exists remotely
    NotFound,
    /// Server-side failure
    Server,
    /// Anything else
    Other,
}

impl ApiErrorKind {
    /// Terminal or recoverable
    #[inline]
    #[must_use]
    pub fn class(self) -> ErrorClass {
        match self {
            Self::Authentication | Self::Network => ErrorClass::Terminal,
            Self::Validation | Self::NotFound | Self::Server | Self::Other => {
                ErrorClass::Recoverable
            }
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::Server => "server",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Failure class driving the revert policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Session or connection unusable: keep state, stop syncing
    Terminal,
    /// Revert the optimistic change and let the user retry
    Recoverable,
}

const AUTH_MARKERS: &[&str] = &[
    "authentication required",
    "invalid or expired token",
];

const NETWORK_MARKERS: &[&str] = &[
    "load failed",
    "network connection was lost",
    "failed to fetch",
    "networkerror",
];

/// Error reported by a [`DataAccess`](crate::DataAccess) implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct ApiError {
    /// Typed failure kind
    pub kind: ApiErrorKind,
    /// Human-readable detail from the server or transport
    pub message: String,
}

impl ApiError {
    /// Create new API error
    #[inline]
    #[must_use]
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Authentication failure
    #[inline]
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Authentication, message)
    }

    /// Network failure
    #[inline]
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Network, message)
    }

    /// Validation failure
    #[inline]
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Validation, message)
    }

    /// Entity missing remotely
    #[inline]
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::NotFound, message)
    }

    /// Server failure
    #[inline]
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Server, message)
    }

    /// Classify a bare error message
    ///
    /// Only for adapters whose transport hands back text without a status.
    /// Everything that is neither an auth nor a connectivity marker is
    /// [`ApiErrorKind::Other`] and therefore recoverable.
    #[must_use]
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();
        let kind = if AUTH_MARKERS.iter().any(|m| lowered.contains(m)) {
            ApiErrorKind::Authentication
        } else if NETWORK_MARKERS.iter().any(|m| lowered.contains(m)) {
            ApiErrorKind::Network
        } else {
            ApiErrorKind::Other
        };
        Self { kind, message }
    }

    /// Terminal or recoverable
    #[inline]
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    /// Check if the session must stop syncing
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.class() == ErrorClass::Terminal
    }

    /// Text shown to the user for this failure
    ///
    /// Identical failures produce identical text so the notifier can
    /// collapse bursts of them.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self.kind {
            ApiErrorKind::Authentication => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiErrorKind::Network => {
                "Connection lost. Check your network and refresh the page.".to_string()
            }
            _ => format!("Could not save changes: {}. Please try again.", self.message),
        }
    }
}

/// Field-level rejection raised before anything is written
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// Entity has no such field
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Field exists but cannot be changed from the client
    #[error("field is read-only: {0}")]
    ReadOnly(String),

    /// Value does not fit the field
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Error returned to callers of the mutator
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Auth or connectivity failure; optimistic state kept, sync halted
    #[error("sync halted: {source}")]
    Terminal {
        /// Entity the failed request concerned, if any
        entity: Option<EntityId>,
        /// Underlying API error
        #[source]
        source: ApiError,
    },

    /// Any other failure; optimistic state reverted, retry allowed
    #[error("change not saved: {source}")]
    Recoverable {
        /// Entity the failed request concerned, if any
        entity: Option<EntityId>,
        /// Underlying API error
        #[source]
        source: ApiError,
    },

    /// Refused without a network call because an earlier terminal failure halted sync
    #[error("sync halted after {kind} failure; sign in again or reload")]
    Halted {
        /// Kind of the failure that halted sync
        kind: ApiErrorKind,
    },

    /// Change set rejected locally
    #[error("rejected change: {0}")]
    Rejected(#[from] FieldError),

    /// Mutation lifecycle violated
    #[error("mutation state error: {0}")]
    Transition(#[from] TransitionError),
}

impl SyncError {
    /// Failure class, if the error came from the remote
    #[inline]
    #[must_use]
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Terminal { .. } | Self::Halted { .. } => Some(ErrorClass::Terminal),
            Self::Recoverable { .. } => Some(ErrorClass::Recoverable),
            Self::Rejected(_) | Self::Transition(_) => None,
        }
    }

    /// Check if sync is halted by this error
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.class() == Some(ErrorClass::Terminal)
    }

    /// Check if the user may retry the same action
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    /// Underlying API error, if any
    #[inline]
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Terminal { source, .. } | Self::Recoverable { source, .. } => Some(source),
            _ => None,
        }
    }
}
