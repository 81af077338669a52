//! Debounced loading indicator state.
//!
//! Counts in-flight indicator-eligible operations. The indicator only
//! becomes visible once work has been in flight longer than the threshold
//! (so fast round-trips never flicker it) and hides only when the
//! in-flight count returns to zero. State lives behind a mutex so the
//! tracker can be shared through an `Arc` between the render loop and the
//! background tasks doing the work.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct ActivityTracker {
    state: Mutex<State>,
    threshold: Duration,
}

#[derive(Debug)]
struct State {
    inflight: u32,
    busy_since: Option<Instant>,
}

impl ActivityTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                inflight: 0,
                busy_since: None,
            }),
            threshold,
        }
    }

    pub fn begin(&self) {
        self.begin_at(Instant::now());
    }

    pub fn end(&self) {
        let mut state = self.state.lock().unwrap();
        state.inflight = state.inflight.saturating_sub(1);
        if state.inflight == 0 {
            state.busy_since = None;
        }
    }

    pub fn visible(&self) -> bool {
        self.visible_at(Instant::now())
    }

    pub fn inflight(&self) -> u32 {
        self.state.lock().unwrap().inflight
    }

    fn begin_at(&self, now: Instant) {
        let mut state = self.state.lock().unwrap();
        state.inflight += 1;
        if state.busy_since.is_none() {
            state.busy_since = Some(now);
        }
    }

    fn visible_at(&self, now: Instant) -> bool {
        let state = self.state.lock().unwrap();
        match state.busy_since {
            Some(since) => state.inflight > 0 && now.duration_since(since) >= self.threshold,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const THRESHOLD: Duration = Duration::from_millis(200);

    #[test]
    fn fast_operations_never_show_the_indicator() {
        let start = Instant::now();
        let tracker = ActivityTracker::new(THRESHOLD);
        tracker.begin_at(start);
        assert!(!tracker.visible_at(start + Duration::from_millis(50)));
        tracker.end();
        assert!(!tracker.visible_at(start + Duration::from_millis(500)));
    }

    #[test]
    fn slow_operations_show_after_threshold() {
        let start = Instant::now();
        let tracker = ActivityTracker::new(THRESHOLD);
        tracker.begin_at(start);
        assert!(!tracker.visible_at(start + Duration::from_millis(199)));
        assert!(tracker.visible_at(start + Duration::from_millis(200)));
    }

    #[test]
    fn hides_only_when_count_returns_to_zero() {
        let start = Instant::now();
        let tracker = ActivityTracker::new(THRESHOLD);
        tracker.begin_at(start);
        tracker.begin_at(start + Duration::from_millis(10));
        let later = start + Duration::from_secs(1);
        assert!(tracker.visible_at(later));

        tracker.end();
        assert_eq!(tracker.inflight(), 1);
        assert!(tracker.visible_at(later));

        tracker.end();
        assert_eq!(tracker.inflight(), 0);
        assert!(!tracker.visible_at(later));
    }

    #[test]
    fn debounce_restarts_after_idle() {
        let start = Instant::now();
        let tracker = ActivityTracker::new(THRESHOLD);
        tracker.begin_at(start);
        tracker.end();

        // New burst of work starts its own debounce window.
        let restart = start + Duration::from_secs(2);
        tracker.begin_at(restart);
        assert!(!tracker.visible_at(restart + Duration::from_millis(100)));
        assert!(tracker.visible_at(restart + Duration::from_millis(250)));
    }

    #[test]
    fn end_without_begin_is_harmless() {
        let tracker = ActivityTracker::new(THRESHOLD);
        tracker.end();
        assert_eq!(tracker.inflight(), 0);
        assert!(!tracker.visible());
    }

    #[tokio::test]
    async fn shared_tracker_tracks_a_spawned_operation() {
        // A render loop polling `visible` must see the indicator while a
        // spawned operation is still in flight, and see it gone after.
        let tracker = Arc::new(ActivityTracker::new(Duration::ZERO));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let task = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker.begin();
                release_rx.await.unwrap();
                tracker.end();
            })
        };

        while tracker.inflight() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(tracker.visible());

        release_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(!tracker.visible());
    }
}
