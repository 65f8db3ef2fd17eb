//! Terminal render surface and toast sink for the CLI

use crm_sync::{Notification, NotificationSink, RenderSurface, Severity, ViewPatch};
use std::io::Write;

/// Prints each patch as one line on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSurface {
    quiet: bool,
}

impl ConsoleSurface {
    /// Create surface
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress output; patches are still traced
    #[inline]
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

impl RenderSurface for ConsoleSurface {
    fn apply(&self, patch: &ViewPatch) {
        tracing::trace!(?patch, "render");
        if self.quiet {
            return;
        }
        let _ = writeln!(std::io::stdout().lock(), "{}", describe(patch));
    }
}

/// One-line description of a patch
#[must_use]
pub fn describe(patch: &ViewPatch) -> String {
    match patch {
        ViewPatch::FieldsChanged { id, deltas } => {
            let parts: Vec<String> = deltas
                .iter()
                .map(|d| format!("{}: {} -> {}", d.field, d.old, d.new))
                .collect();
            format!("~ {id} {}", parts.join(", "))
        }
        ViewPatch::Refreshed { id } => format!("= {id} refreshed from server"),
        ViewPatch::Inserted { id, index } => format!("+ {id} at {index}"),
        ViewPatch::Removed { id, index } => format!("- {id} from {index}"),
        ViewPatch::Reset { count } => format!("* {count} loaded"),
    }
}

/// Prints toasts on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleToasts;

impl NotificationSink for ConsoleToasts {
    fn show(&self, notification: &Notification) {
        let tag = match notification.severity {
            Severity::Success => "ok",
            Severity::Error => "error",
            Severity::Warning => "warn",
            Severity::Info => "info",
        };
        let _ = writeln!(std::io::stderr().lock(), "[{tag}] {}", notification.message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_sync::{EntityId, FieldDelta};
    use serde_json::json;

    #[test]
    fn describes_field_changes() {
        let patch = ViewPatch::FieldsChanged {
            id: EntityId::from("L1"),
            deltas: vec![FieldDelta {
                field: "status".to_string(),
                old: json!("new"),
                new: json!("contacted"),
            }],
        };
        assert_eq!(describe(&patch), r#"~ L1 status: "new" -> "contacted""#);
        assert_eq!(describe(&ViewPatch::Reset { count: 3 }), "* 3 loaded");
    }
}
