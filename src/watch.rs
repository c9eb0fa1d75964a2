use crate::status::SessionStatus;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// Fixed-interval timer thread. The callback returns `false` to stop early
/// (typically because its receiver is gone). Dropping the ticker stops it.
pub struct Ticker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if !on_tick() {
                        debug!("ticker callback declined, exiting");
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        // Disconnecting the channel wakes the thread immediately.
        self.stop_tx.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub session_id: String,
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Remembers the last resolved status per session and reports transitions.
#[derive(Debug, Default)]
pub struct StatusWatcher {
    last: HashMap<String, SessionStatus>,
    primed: bool,
}

impl StatusWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `current` and returns the sessions whose status moved since
    /// the previous call. The first call only establishes a baseline.
    /// Sessions that appear or disappear between calls are not changes.
    pub fn observe<I>(&mut self, current: I) -> Vec<StatusChange>
    where
        I: IntoIterator<Item = (String, SessionStatus)>,
    {
        let mut next: HashMap<String, SessionStatus> = HashMap::new();
        let mut changes = Vec::new();
        for (id, status) in current {
            if self.primed {
                if let Some(prev) = self.last.get(&id) {
                    if *prev != status {
                        changes.push(StatusChange {
                            session_id: id.clone(),
                            from: *prev,
                            to: status,
                        });
                    }
                }
            }
            next.insert(id, status);
        }
        self.last = next;
        self.primed = true;
        changes.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn snapshot(items: &[(&str, SessionStatus)]) -> Vec<(String, SessionStatus)> {
        items.iter().map(|(id, s)| (id.to_string(), *s)).collect()
    }

    #[test]
    fn first_observation_is_a_baseline() {
        let mut w = StatusWatcher::new();
        let changes = w.observe(snapshot(&[
            ("a", SessionStatus::Upcoming),
            ("b", SessionStatus::Finished),
        ]));
        assert!(changes.is_empty());
    }

    #[test]
    fn reports_only_moved_sessions() {
        let mut w = StatusWatcher::new();
        w.observe(snapshot(&[
            ("a", SessionStatus::Upcoming),
            ("b", SessionStatus::InProgress),
            ("c", SessionStatus::Unscheduled),
        ]));
        let changes = w.observe(snapshot(&[
            ("b", SessionStatus::Finished),
            ("a", SessionStatus::InProgress),
            ("c", SessionStatus::Unscheduled),
        ]));
        assert_eq!(
            changes,
            vec![
                StatusChange {
                    session_id: "a".into(),
                    from: SessionStatus::Upcoming,
                    to: SessionStatus::InProgress,
                },
                StatusChange {
                    session_id: "b".into(),
                    from: SessionStatus::InProgress,
                    to: SessionStatus::Finished,
                },
            ]
        );
        assert!(w
            .observe(snapshot(&[
                ("a", SessionStatus::InProgress),
                ("b", SessionStatus::Finished),
                ("c", SessionStatus::Unscheduled),
            ]))
            .is_empty());
    }

    #[test]
    fn added_and_removed_sessions_are_not_changes() {
        let mut w = StatusWatcher::new();
        w.observe(snapshot(&[("a", SessionStatus::Upcoming)]));
        let changes = w.observe(snapshot(&[("b", SessionStatus::InProgress)]));
        assert!(changes.is_empty());
        // "a" was forgotten, so it reappearing is also not a change.
        let changes = w.observe(snapshot(&[("a", SessionStatus::Finished)]));
        assert!(changes.is_empty());
    }

    #[test]
    fn ticker_fires_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut ticker = Ticker::spawn(Duration::from_millis(10), move || {
            c.fetch_add(1, Ordering::SeqCst);
            true
        });
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        ticker.stop();
        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn ticker_exits_when_callback_declines() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let mut ticker = Ticker::spawn(Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
            false
        });
        // Joins the already-finished thread.
        thread::sleep(Duration::from_millis(50));
        ticker.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
