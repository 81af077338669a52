pub mod activity;
pub mod api;
pub mod config;
pub mod job;
pub mod notify;
pub mod preset;
pub mod session;

pub use activity::ActivityTracker;
pub use api::{ApiError, WorkerApi, WorkerBackend};
pub use config::ClientConfig;
pub use job::{Job, JobState, JobStore, TransitionEvent};
pub use notify::{Notification, Notifier};
pub use preset::{EncodingRequest, Preset};
pub use session::{run_poller, Session, SubmissionOutcome};
