use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window limiter keyed by client address. Clients with no hits left
/// in the window are dropped, on rejection and on [`ClientRateLimiter::sweep`].
#[derive(Debug, Clone)]
pub struct ClientRateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl ClientRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    pub fn allow(&self, client: &str) -> bool {
        self.allow_at(client, Instant::now())
    }

    /// Forgets clients whose hits have all left the window.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn tracked_clients(&self) -> usize {
        self.inner.lock().len()
    }

    fn allow_at(&self, client: &str, now: Instant) -> bool {
        let mut guard = self.inner.lock();
        let hits = guard.entry(client.to_string()).or_default();
        prune(hits, now, self.window);

        if hits.len() >= self.max_requests {
            if hits.is_empty() {
                guard.remove(client);
            }
            return false;
        }

        hits.push_back(now);
        true
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut guard = self.inner.lock();
        let before = guard.len();
        guard.retain(|_, hits| {
            prune(hits, now, self.window);
            !hits.is_empty()
        });
        before - guard.len()
    }
}

fn prune(hits: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while hits
        .front()
        .is_some_and(|front| now.duration_since(*front) > window)
    {
        hits.pop_front();
    }
}
