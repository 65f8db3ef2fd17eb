//! CRM Sync - optimistic client-side state for dashboard collections
//!
//! Every dashboard view (lead pipeline, task schedule, account settings) owns
//! one collection of entities and keeps it in step with a remote API:
//! - Changes are written locally and shown before the network answers
//! - Failures are classified by kind, never by message text
//! - Recoverable failures roll the change back
//! - Terminal failures (expired session, lost connection) halt further sync
//!
//! # Example
//!
//! ```rust,ignore
//! use crm_sync::prelude::*;
//!
//! let mutator = OptimisticMutator::new(api, surface, Notifier::new(sink));
//! mutator.reload().await?;
//!
//! let changes = FieldChanges::from([("status".to_string(), json!("contacted"))]);
//! match mutator.apply_mutation(&EntityId::from("L1"), changes).await {
//!     Ok(MutationOutcome::Confirmed) => {}
//!     Err(SyncError::Recoverable { .. }) => { /* already reverted */ }
//!     Err(e) => return Err(e.into()),
//!     _ => {}
//! }
//! ```

#![warn(unreachable_pub)]

pub mod api;
pub mod collection;
pub mod error;
pub mod guard;
pub mod memory;
pub mod mutator;
pub mod notify;
pub mod state;
pub mod types;
pub mod view;

// Re-exports for convenience
pub use api::DataAccess;
pub use collection::Collection;
pub use error::{ApiError, ApiErrorKind, ErrorClass, FieldError, SyncError};
pub use guard::{RefreshGuard, RefreshPermit};
pub use memory::{CallStats, InMemoryDataAccess};
pub use mutator::{MutationOutcome, OptimisticMutator, PendingMutation, ReloadOutcome};
pub use notify::{Notification, NotificationSink, Notifier, Severity, DEFAULT_DEDUP_WINDOW};
pub use state::{validate_transition, MutationState, TransitionError};
pub use types::{to_field_changes, Entity, EntityId, FieldChanges};
pub use view::{FieldDelta, NullSurface, RenderSurface, ViewPatch};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building a synced view
    pub use crate::{
        ApiError, ApiErrorKind, DataAccess, Entity, EntityId, FieldChanges, MutationOutcome,
        Notifier, OptimisticMutator, ReloadOutcome, RenderSurface, Severity, SyncError,
        ViewPatch,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
