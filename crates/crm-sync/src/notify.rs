//! User-visible notifications with burst de-duplication
//!
//! A [`Notifier`] forwards to a [`NotificationSink`] but drops a message
//! identical (same severity, same text) to one shown within the window.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Window inside which identical messages are collapsed
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_millis(2000);

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Operation succeeded
    Success,
    /// Operation failed
    Error,
    /// Needs attention
    Warning,
    /// Informational
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        };
        f.write_str(name)
    }
}

/// Short-lived message for the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity level
    pub severity: Severity,
    /// Message text
    pub message: String,
}

impl Notification {
    /// Create new notification
    #[inline]
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Where notifications are displayed
pub trait NotificationSink: Send + Sync {
    /// Display one notification
    fn show(&self, notification: &Notification);
}

/// De-duplicating front for a sink
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    window: Duration,
    recent: Mutex<HashMap<(Severity, String), Instant>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("window", &self.window)
            .field("recent", &self.recent.lock().len())
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Create notifier with the default window
    #[inline]
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_window(sink, DEFAULT_DEDUP_WINDOW)
    }

    /// Create notifier with a custom window
    #[inline]
    #[must_use]
    pub fn with_window(sink: Arc<dyn NotificationSink>, window: Duration) -> Self {
        Self {
            sink,
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// De-duplication window
    #[inline]
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Show a message unless an identical one was shown within the window
    ///
    /// Returns whether the message reached the sink.
    pub fn notify(&self, severity: Severity, message: impl Into<String>) -> bool {
        let notification = Notification::new(severity, message);
        let now = Instant::now();
        {
            let mut recent = self.recent.lock();
            recent.retain(|_, shown_at| now.duration_since(*shown_at) < self.window);

            let key = (severity, notification.message.clone());
            if recent.contains_key(&key) {
                tracing::trace!(%severity, message = %notification.message, "suppressed duplicate notification");
                return false;
            }
            recent.insert(key, now);
        }
        self.sink.show(&notification);
        true
    }

    /// Success message
    #[inline]
    pub fn success(&self, message: impl Into<String>) -> bool {
        self.notify(Severity::Success, message)
    }

    /// Error message
    #[inline]
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.notify(Severity::Error, message)
    }

    /// Warning message
    #[inline]
    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.notify(Severity::Warning, message)
    }

    /// Info message
    #[inline]
    pub fn info(&self, message: impl Into<String>) -> bool {
        self.notify(Severity::Info, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<Notification>>);

    impl NotificationSink for Collect {
        fn show(&self, notification: &Notification) {
            self.0.lock().push(notification.clone());
        }
    }

    fn notifier() -> (Arc<Collect>, Notifier) {
        let sink = Arc::new(Collect::default());
        let notifier = Notifier::new(sink.clone());
        (sink, notifier)
    }

    #[tokio::test(start_paused = true)]
    async fn identical_messages_within_window_collapse() {
        let (sink, notifier) = notifier();

        assert!(notifier.error("Connection lost"));
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!notifier.error("Connection lost"));

        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn message_repeats_after_window() {
        let (sink, notifier) = notifier();

        notifier.error("Connection lost");
        tokio::time::advance(Duration::from_millis(2000)).await;
        assert!(notifier.error("Connection lost"));

        assert_eq!(sink.0.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn different_text_or_severity_is_not_a_duplicate() {
        let (sink, notifier) = notifier();

        notifier.error("Lead saved");
        notifier.success("Lead saved");
        notifier.success("Task saved");

        let shown = sink.0.lock();
        assert_eq!(shown.len(), 3);
        assert_eq!(shown[1], Notification::new(Severity::Success, "Lead saved"));
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"warning\"");
        assert_eq!(Severity::Info.to_string(), "info");
    }
}
