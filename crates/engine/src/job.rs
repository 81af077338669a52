//! In-memory table of known jobs and the reconciliation merge.
//!
//! The store holds two things: an ordered list of [`Job`] entries for
//! presentation (insertion/merge order is stable) and a last-known-state
//! table keyed by server job id that drives transition detection.  The
//! store is a plain value with `&mut self` operations; the session wraps
//! it in a mutex and passes it by reference to the poller and the
//! submission path, never as an implicit global.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::RemoteJob;

/// Server-reported job state. The server vocabulary is authoritative;
/// the client never invents states of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Success,
    Failure,
}

impl JobState {
    /// Success and Failure are terminal: once recorded they latch, so a
    /// stale poll reporting an earlier state can never re-arm a
    /// notification for the same job id.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Success | JobState::Failure)
    }
}

/// Client-side correlation token handed out at placeholder creation.
///
/// The submission path confirms its own placeholder by token, which keeps
/// confirmation correct even when the same filename appears more than
/// once in a batch and creation responses resolve out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaceholderToken(Uuid);

/// One tracked job, either an optimistic placeholder or a
/// server-confirmed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub filename: String,
    /// Assigned by the server; always absent on placeholders.
    pub job_id: Option<String>,
    pub state: JobState,
    /// Percentage 0-100 as reported by the server.
    pub progress: f64,
    /// Optional throughput indicator, presentation-only.
    pub speed: Option<f64>,
    /// True until the server confirms the job with an id.
    pub placeholder: bool,
    /// Submission failure reason, kept for display on dead placeholders.
    pub error: Option<String>,
    token: Option<PlaceholderToken>,
}

/// A detected change of a job's server-reported state between two polls.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEvent {
    pub job_id: String,
    pub filename: String,
    pub from: JobState,
    pub to: JobState,
}

/// Canonical in-memory table of known jobs for one session.
#[derive(Debug, Default)]
pub struct JobStore {
    entries: Vec<Job>,
    last_known: HashMap<String, JobState>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an optimistic placeholder, immediately visible to readers.
    pub fn upsert_placeholder(&mut self, filename: &str) -> PlaceholderToken {
        let token = PlaceholderToken(Uuid::new_v4());
        self.entries.push(Job {
            filename: filename.to_string(),
            job_id: None,
            state: JobState::Pending,
            progress: 0.0,
            speed: None,
            placeholder: true,
            error: None,
            token: Some(token),
        });
        token
    }

    /// Upgrade a placeholder to a server-confirmed entry.
    ///
    /// If a poll already brought in an entry for this job id (the
    /// submission response raced a poll), the placeholder is dropped
    /// instead so no id ever appears twice. The job id's state is seeded
    /// as Pending unless the poller recorded something fresher.
    pub fn confirm(&mut self, token: PlaceholderToken, job_id: &str, filename: &str) {
        self.last_known
            .entry(job_id.to_string())
            .or_insert(JobState::Pending);

        if self
            .entries
            .iter()
            .any(|j| j.job_id.as_deref() == Some(job_id))
        {
            self.entries.retain(|j| j.token != Some(token));
            return;
        }

        if let Some(job) = self.entries.iter_mut().find(|j| j.token == Some(token)) {
            job.job_id = Some(job_id.to_string());
            job.placeholder = false;
            job.token = None;
        } else {
            // Placeholder was retired by a poll in the meantime; track the
            // confirmed id as a fresh entry under the submitted filename.
            self.entries.push(Job {
                filename: filename.to_string(),
                job_id: Some(job_id.to_string()),
                state: JobState::Pending,
                progress: 0.0,
                speed: None,
                placeholder: false,
                error: None,
                token: None,
            });
        }
    }

    /// Mark a placeholder whose creation request failed.
    ///
    /// The entry is kept for display but never takes part in transition
    /// detection (it has no job id) and is never matched against server
    /// entries.
    pub fn mark_failed(&mut self, token: PlaceholderToken, reason: &str) {
        if let Some(job) = self.entries.iter_mut().find(|j| j.token == Some(token)) {
            job.state = JobState::Failure;
            job.error = Some(reason.to_string());
        }
    }

    /// Merge an authoritative server snapshot into the store.
    ///
    /// An empty snapshot means "no information this cycle" and leaves the
    /// store untouched. A non-empty snapshot replaces the server-confirmed
    /// view: confirmed entries the server no longer reports drop out,
    /// placeholders survive, and each unmatched server entry retires the
    /// oldest still-pending placeholder with the same filename. Applying
    /// the same snapshot twice is a no-op the second time, so overlapping
    /// in-flight polls cannot corrupt the store.
    pub fn merge_server_snapshot(&mut self, snapshot: Vec<RemoteJob>) -> Vec<TransitionEvent> {
        if snapshot.is_empty() {
            return Vec::new();
        }

        let events = self.detect_transitions(&snapshot);

        let confirmed_ids: Vec<String> = self
            .entries
            .iter()
            .filter_map(|j| j.job_id.clone())
            .collect();

        let mut unmatched: Vec<Option<RemoteJob>> = snapshot.into_iter().map(Some).collect();
        let old = std::mem::take(&mut self.entries);
        let mut next: Vec<Job> = Vec::with_capacity(old.len());

        for entry in old {
            match entry.job_id.clone() {
                Some(id) => {
                    let slot = unmatched
                        .iter_mut()
                        .find(|s| s.as_ref().is_some_and(|r| r.job_id == id));
                    match slot {
                        Some(slot) => {
                            let remote = slot.take().expect("slot checked non-empty");
                            if entry.state.is_terminal() && !remote.state.is_terminal() {
                                // Stale poll: keep the terminal view.
                                next.push(entry);
                            } else {
                                next.push(self.job_from_remote(remote));
                            }
                        }
                        None => {
                            // Server no longer reports this job; the
                            // last-known state stays recorded so a later
                            // reappearance cannot re-fire.
                        }
                    }
                }
                None => {
                    if entry.placeholder && entry.state == JobState::Pending {
                        let slot = unmatched.iter_mut().find(|s| {
                            s.as_ref().is_some_and(|r| {
                                r.filename == entry.filename
                                    && !confirmed_ids.contains(&r.job_id)
                            })
                        });
                        match slot {
                            Some(slot) => {
                                let remote = slot.take().expect("slot checked non-empty");
                                next.push(self.job_from_remote(remote));
                            }
                            None => next.push(entry),
                        }
                    } else {
                        // Failed placeholders stay visible as-is.
                        next.push(entry);
                    }
                }
            }
        }

        // Remaining server entries are new to us; append in snapshot order.
        for remote in unmatched.into_iter().flatten() {
            if next.iter().any(|j| j.job_id.as_deref() == Some(remote.job_id.as_str())) {
                continue;
            }
            next.push(self.job_from_remote(remote));
        }

        self.entries = next;
        events
    }

    /// Read-only ordered view of all tracked jobs.
    pub fn snapshot(&self) -> Vec<Job> {
        self.entries.clone()
    }

    pub fn last_known_state(&self, job_id: &str) -> Option<JobState> {
        self.last_known.get(job_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True once at least one job is tracked and every entry is terminal.
    pub fn all_settled(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|j| j.state.is_terminal())
    }

    /// Compare the snapshot against recorded states and update the
    /// last-known table. Emits at most one event per terminal transition:
    /// the previous state must be recorded, differ from the new one, and
    /// must not itself be terminal.
    fn detect_transitions(&mut self, snapshot: &[RemoteJob]) -> Vec<TransitionEvent> {
        let mut events = Vec::new();
        for remote in snapshot {
            match self.last_known.get(&remote.job_id).copied() {
                Some(previous) if previous.is_terminal() => {
                    // Latched: stale or duplicate report, record nothing.
                }
                Some(previous) if previous != remote.state && remote.state.is_terminal() => {
                    events.push(TransitionEvent {
                        job_id: remote.job_id.clone(),
                        filename: remote.filename.clone(),
                        from: previous,
                        to: remote.state,
                    });
                    self.last_known.insert(remote.job_id.clone(), remote.state);
                }
                _ => {
                    self.last_known.insert(remote.job_id.clone(), remote.state);
                }
            }
        }
        events
    }

    fn job_from_remote(&self, remote: RemoteJob) -> Job {
        // Display follows the latch as well: once terminal, an earlier
        // state from a stale poll is not shown.
        let state = match self.last_known.get(&remote.job_id).copied() {
            Some(known) if known.is_terminal() => known,
            _ => remote.state,
        };
        Job {
            filename: remote.filename,
            job_id: Some(remote.job_id),
            state,
            progress: remote.progress,
            speed: remote.speed,
            placeholder: false,
            error: None,
            token: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn remote(job_id: &str, filename: &str, state: JobState, progress: f64) -> RemoteJob {
        RemoteJob {
            job_id: job_id.to_string(),
            filename: filename.to_string(),
            state,
            progress,
            speed: None,
        }
    }

    #[test]
    fn placeholder_visible_immediately() {
        let mut store = JobStore::new();
        store.upsert_placeholder("a.mp4");

        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].filename, "a.mp4");
        assert_eq!(jobs[0].state, JobState::Pending);
        assert_eq!(jobs[0].progress, 0.0);
        assert!(jobs[0].placeholder);
        assert!(jobs[0].job_id.is_none());
    }

    #[test]
    fn confirm_upgrades_placeholder() {
        let mut store = JobStore::new();
        let token = store.upsert_placeholder("a.mp4");
        store.confirm(token, "J1", "a.mp4");

        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id.as_deref(), Some("J1"));
        assert!(!jobs[0].placeholder);
        assert_eq!(store.last_known_state("J1"), Some(JobState::Pending));
    }

    #[test]
    fn confirm_does_not_duplicate_a_polled_entry() {
        let mut store = JobStore::new();
        let token = store.upsert_placeholder("a.mp4");
        // A poll lands before the creation response and already retired
        // the placeholder into a confirmed entry.
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 10.0)]);
        store.confirm(token, "J1", "a.mp4");

        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id.as_deref(), Some("J1"));
    }

    #[test]
    fn confirm_never_downgrades_a_polled_state() {
        let mut store = JobStore::new();
        let token = store.upsert_placeholder("a.mp4");
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 10.0)]);
        store.confirm(token, "J1", "a.mp4");
        assert_eq!(store.last_known_state("J1"), Some(JobState::Running));
    }

    #[test]
    fn failed_placeholder_keeps_reason_and_survives_merges() {
        let mut store = JobStore::new();
        let token = store.upsert_placeholder("a.mp4");
        store.mark_failed(token, "worker returned 500");
        store.merge_server_snapshot(vec![remote("J9", "other.mp4", JobState::Running, 1.0)]);

        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].state, JobState::Failure);
        assert_eq!(jobs[0].error.as_deref(), Some("worker returned 500"));
        assert!(jobs[0].placeholder);
    }

    #[test]
    fn terminal_transition_fires_exactly_once() {
        let mut store = JobStore::new();
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 40.0)]);
        assert!(events.is_empty());

        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job_id, "J1");
        assert_eq!(events[0].from, JobState::Running);
        assert_eq!(events[0].to, JobState::Success);

        // Repeated observation of the same terminal state is silent.
        for _ in 0..3 {
            let events =
                store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn first_sighting_in_terminal_state_is_silent() {
        // No previous state recorded, so nothing to transition from.
        let mut store = JobStore::new();
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);
        assert!(events.is_empty());
        assert_eq!(store.last_known_state("J1"), Some(JobState::Success));
    }

    #[test]
    fn pending_to_running_is_not_notified() {
        let mut store = JobStore::new();
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Pending, 0.0)]);
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 5.0)]);
        assert!(events.is_empty());
        assert_eq!(store.last_known_state("J1"), Some(JobState::Running));
    }

    #[test]
    fn failure_transition_is_notified_once() {
        let mut store = JobStore::new();
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 40.0)]);
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Failure, 40.0)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].to, JobState::Failure);
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Failure, 40.0)]);
        assert!(events.is_empty());
    }

    #[test]
    fn empty_snapshot_preserves_store() {
        let mut store = JobStore::new();
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);
        assert_eq!(store.len(), 1);

        let events = store.merge_server_snapshot(Vec::new());
        assert!(events.is_empty());
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].state, JobState::Success);
        assert_eq!(store.snapshot()[0].progress, 100.0);
    }

    #[test]
    fn stale_earlier_state_neither_downgrades_nor_rearms() {
        let mut store = JobStore::new();
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 40.0)]);
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);

        // An out-of-order poll reports the job back in RUNNING.
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 40.0)]);
        assert!(events.is_empty());
        assert_eq!(store.snapshot()[0].state, JobState::Success);
        assert_eq!(store.snapshot()[0].progress, 100.0);

        // And then SUCCESS again: still silent.
        let events = store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);
        assert!(events.is_empty());
    }

    #[test]
    fn oldest_pending_placeholder_retired_by_filename() {
        let mut store = JobStore::new();
        let first = store.upsert_placeholder("a.mp4");
        store.upsert_placeholder("a.mp4");

        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Pending, 0.0)]);

        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 2);
        // First placeholder became the confirmed entry, second still waits.
        assert_eq!(jobs[0].job_id.as_deref(), Some("J1"));
        assert!(jobs[1].placeholder);

        // The retired placeholder's late confirmation must not duplicate J1.
        store.confirm(first, "J1", "a.mp4");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn late_confirmation_keeps_the_submitted_filename() {
        let mut store = JobStore::new();
        let token = store.upsert_placeholder("a.mp4");
        // A poll adopts the placeholder under a different job id, so the
        // token no longer matches any entry when the creation response
        // finally lands.
        store.merge_server_snapshot(vec![remote("J9", "a.mp4", JobState::Running, 10.0)]);
        store.confirm(token, "J1", "a.mp4");

        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 2);
        let late = jobs.iter().find(|j| j.job_id.as_deref() == Some("J1")).unwrap();
        assert_eq!(late.filename, "a.mp4");
        assert_eq!(late.state, JobState::Pending);
    }

    #[test]
    fn nonempty_snapshot_replaces_confirmed_view() {
        let mut store = JobStore::new();
        store.merge_server_snapshot(vec![
            remote("J1", "a.mp4", JobState::Running, 10.0),
            remote("J2", "b.mp4", JobState::Running, 20.0),
        ]);
        assert_eq!(store.len(), 2);

        // J1 dropped off the server list; view follows the snapshot.
        store.merge_server_snapshot(vec![remote("J2", "b.mp4", JobState::Running, 30.0)]);
        let jobs = store.snapshot();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id.as_deref(), Some("J2"));

        // Reappearance of J1 in a state we already recorded stays silent.
        let events = store.merge_server_snapshot(vec![
            remote("J1", "a.mp4", JobState::Running, 10.0),
            remote("J2", "b.mp4", JobState::Running, 40.0),
        ]);
        assert!(events.is_empty());
    }

    #[test]
    fn duplicate_ids_in_one_snapshot_collapse() {
        let mut store = JobStore::new();
        store.merge_server_snapshot(vec![
            remote("J1", "a.mp4", JobState::Running, 10.0),
            remote("J1", "a.mp4", JobState::Running, 12.0),
        ]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn settled_requires_tracked_terminal_jobs() {
        let mut store = JobStore::new();
        assert!(!store.all_settled());
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Running, 10.0)]);
        assert!(!store.all_settled());
        store.merge_server_snapshot(vec![remote("J1", "a.mp4", JobState::Success, 100.0)]);
        assert!(store.all_settled());
    }

    // Strategy for small server snapshots over a bounded id space so that
    // repeated merges actually collide on ids.
    fn remote_job() -> impl Strategy<Value = RemoteJob> {
        (
            0u8..4,
            prop_oneof![
                Just(JobState::Pending),
                Just(JobState::Running),
                Just(JobState::Success),
                Just(JobState::Failure),
            ],
            0.0f64..=100.0,
        )
            .prop_map(|(n, state, progress)| RemoteJob {
                job_id: format!("J{n}"),
                filename: format!("file{n}.mp4"),
                state,
                progress,
                speed: None,
            })
    }

    proptest! {
        /// Merging the same snapshot twice emits nothing the second time
        /// and leaves the view unchanged.
        #[test]
        fn merge_is_idempotent(snapshot in prop::collection::vec(remote_job(), 0..6)) {
            let mut store = JobStore::new();
            store.merge_server_snapshot(snapshot.clone());
            let view = store.snapshot();

            let events = store.merge_server_snapshot(snapshot);
            prop_assert!(events.is_empty());
            prop_assert_eq!(store.snapshot(), view);
        }

        /// A job id never appears twice in the presentation list.
        #[test]
        fn confirmed_ids_are_unique(
            first in prop::collection::vec(remote_job(), 0..6),
            second in prop::collection::vec(remote_job(), 0..6),
        ) {
            let mut store = JobStore::new();
            store.merge_server_snapshot(first);
            store.merge_server_snapshot(second);

            let ids: Vec<_> = store
                .snapshot()
                .into_iter()
                .filter_map(|j| j.job_id)
                .collect();
            let mut deduped = ids.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(ids.len(), deduped.len());
        }

        /// Once a terminal state is recorded for an id, no later sequence
        /// of snapshots fires another event for that id.
        #[test]
        fn terminal_latch_holds(
            later in prop::collection::vec(remote_job(), 0..8),
        ) {
            let mut store = JobStore::new();
            store.merge_server_snapshot(vec![RemoteJob {
                job_id: "J0".to_string(),
                filename: "file0.mp4".to_string(),
                state: JobState::Running,
                progress: 50.0,
                speed: None,
            }]);
            store.merge_server_snapshot(vec![RemoteJob {
                job_id: "J0".to_string(),
                filename: "file0.mp4".to_string(),
                state: JobState::Success,
                progress: 100.0,
                speed: None,
            }]);

            for batch in later.chunks(2) {
                let events = store.merge_server_snapshot(batch.to_vec());
                prop_assert!(events.iter().all(|e| e.job_id != "J0"));
            }
        }
    }
}
