//! One console session: the submission client and the reconciliation
//! poller sharing a single job store.
//!
//! All work interleaves cooperatively on the async runtime; the only
//! suspension points are the network round-trips. The store sits behind a
//! mutex with short critical sections, and both the poller and the
//! submission path only ever upsert, never destructively clear, so a poll
//! racing a submission cannot wipe a still-pending placeholder.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use log::debug;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::api::{JobRequest, WorkerBackend};
use crate::job::{Job, JobState, JobStore};
use crate::notify::{Notification, Notifier};
use crate::preset::EncodingRequest;

/// Result of one job-creation request within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Submitted { filename: String, job_id: String },
    Failed { filename: String, reason: String },
}

/// Engine state for one session: backend, store and notification sink.
/// Constructed once, shared by reference between the poller task and the
/// submission path, dropped at session end.
pub struct Session<B: WorkerBackend> {
    backend: B,
    store: Mutex<JobStore>,
    notifier: Arc<dyn Notifier>,
}

impl<B: WorkerBackend> Session<B> {
    pub fn new(backend: B, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            backend,
            store: Mutex::new(JobStore::new()),
            notifier,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Submit one creation request per selected input.
    ///
    /// Zero (non-empty) selections is a validation error: one
    /// notification, no network traffic, no state mutation. Otherwise a
    /// placeholder per input is written in selection order before any
    /// request goes out, and the requests then resolve independently; a
    /// failure isolates to its own job. Finishes with one immediate
    /// out-of-cycle poll so new jobs show up without waiting for the
    /// next tick.
    pub async fn submit_batch(
        &self,
        filenames: &[String],
        request: &EncodingRequest,
    ) -> Vec<SubmissionOutcome> {
        let selected: Vec<&String> = filenames.iter().filter(|f| !f.is_empty()).collect();
        if selected.is_empty() {
            self.notifier.notify(Notification::NothingSelected);
            return Vec::new();
        }

        let mut slots = Vec::with_capacity(selected.len());
        {
            let mut store = self.store.lock().await;
            for filename in &selected {
                slots.push((filename.to_string(), store.upsert_placeholder(filename)));
            }
        }

        let requests = slots.into_iter().map(|(filename, token)| {
            let job_request = JobRequest {
                filename: filename.clone(),
                codec: request.codec.clone(),
                crf: request.crf,
                extra_args: request.extra_args.clone(),
            };
            async move {
                match self.backend.create_job(&job_request).await {
                    Ok(created) => {
                        self.store
                            .lock()
                            .await
                            .confirm(token, &created.job_id, &filename);
                        self.notifier.notify(Notification::Submitted {
                            filename: filename.clone(),
                            job_id: created.job_id.clone(),
                        });
                        SubmissionOutcome::Submitted {
                            filename,
                            job_id: created.job_id,
                        }
                    }
                    Err(err) => {
                        let reason = err.to_string();
                        self.store.lock().await.mark_failed(token, &reason);
                        self.notifier.notify(Notification::SubmitFailed {
                            filename: filename.clone(),
                            reason: reason.clone(),
                        });
                        SubmissionOutcome::Failed { filename, reason }
                    }
                }
            }
        });

        let outcomes = join_all(requests).await;

        self.poll_once().await;
        outcomes
    }

    /// One reconciliation cycle: fetch the authoritative job list, merge
    /// it, emit transition notifications.
    ///
    /// A fetch error leaves prior state untouched and stays silent (the
    /// next tick retries); an empty list is treated as "no information
    /// this cycle" rather than zero jobs.
    pub async fn poll_once(&self) {
        let remote_jobs = match self.backend.list_jobs().await {
            Ok(jobs) => jobs,
            Err(err) => {
                debug!("job list fetch failed, keeping previous view: {err}");
                return;
            }
        };

        if remote_jobs.is_empty() {
            debug!("job list empty, keeping previous view");
            return;
        }

        let events = {
            let mut store = self.store.lock().await;
            store.merge_server_snapshot(remote_jobs)
        };

        for event in events {
            let note = match event.to {
                JobState::Failure => Notification::Failed {
                    job_id: event.job_id,
                    filename: event.filename,
                },
                _ => Notification::Completed {
                    job_id: event.job_id,
                    filename: event.filename,
                },
            };
            self.notifier.notify(note);
        }
    }

    /// Ordered read-only view of all tracked jobs.
    pub async fn snapshot(&self) -> Vec<Job> {
        self.store.lock().await.snapshot()
    }

    /// True once at least one job is tracked and all of them are terminal.
    pub async fn is_settled(&self) -> bool {
        self.store.lock().await.all_settled()
    }
}

/// Fixed-interval reconciliation loop; runs until the task is dropped.
/// Ticks are independent: a slow fetch never blocks the next one, and
/// merges are idempotent so overlapping polls are harmless.
pub async fn run_poller<B>(session: Arc<Session<B>>, period: Duration)
where
    B: WorkerBackend + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        session.poll_once().await;
    }
}
