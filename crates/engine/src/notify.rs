//! Notification contract between the engine and a presentation layer.
//!
//! The engine guarantees at-most-once delivery per distinct event: each
//! submission outcome produces one call, and the job store's terminal
//! latch makes sure a given `(job id, terminal state)` pair is emitted at
//! most once no matter how often the poller re-observes it.

use tokio::sync::mpsc;

/// A single user-facing event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Submission invoked with zero selected inputs; no network call made.
    NothingSelected,
    Submitted { filename: String, job_id: String },
    SubmitFailed { filename: String, reason: String },
    Completed { job_id: String, filename: String },
    Failed { job_id: String, filename: String },
}

impl Notification {
    /// Human-readable one-liner for log lines and the notification feed.
    pub fn message(&self) -> String {
        match self {
            Notification::NothingSelected => "no inputs selected".to_string(),
            Notification::Submitted { filename, job_id } => {
                format!("{filename}: submitted as {job_id}")
            }
            Notification::SubmitFailed { filename, reason } => {
                format!("{filename}: submission failed: {reason}")
            }
            Notification::Completed { job_id, filename } => {
                format!("{filename}: compression finished ({job_id})")
            }
            Notification::Failed { job_id, filename } => {
                format!("{filename}: compression failed ({job_id})")
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Notification::NothingSelected
                | Notification::SubmitFailed { .. }
                | Notification::Failed { .. }
        )
    }
}

/// Consumes submission outcomes and transition events. The concrete
/// rendering (log line, TUI feed) is up to the implementation.
pub trait Notifier: Send + Sync {
    fn notify(&self, note: Notification);
}

/// Notifier that forwards into an unbounded channel, for a UI that drains
/// notifications on its own schedule.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, note: Notification) {
        // Receiver gone means the UI is shutting down; drop silently.
        let _ = self.tx.send(note);
    }
}
