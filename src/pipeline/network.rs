//! In-flight request tracking for network quiescence.
//!
//! [`NetworkTracker`] is fed from the DevTools `Network` events of a page
//! (`requestWillBeSent`, `loadingFinished`, `loadingFailed`) and answers one
//! question: have there been zero requests in flight for at least a given
//! quiet window? Requests are keyed by their DevTools request id, so a
//! redirect (a second `requestWillBeSent` with the same id) is one request.

use std::collections::HashSet;
use std::time::{Duration, Instant};

/// How long the page must have no requests in flight to count as idle.
pub const NETWORK_QUIET: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct NetworkTracker {
    in_flight: HashSet<String>,
    /// When the in-flight set last changed between empty and non-empty.
    since: Instant,
}

impl Default for NetworkTracker {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl NetworkTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            since: now,
        }
    }

    pub fn request_started(&mut self, id: &str, now: Instant) {
        if self.in_flight.insert(id.to_string()) && self.in_flight.len() == 1 {
            self.since = now;
        }
    }

    /// A request finished or failed. Unknown ids are ignored.
    pub fn request_ended(&mut self, id: &str, now: Instant) {
        if self.in_flight.remove(id) && self.in_flight.is_empty() {
            self.since = now;
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// True once nothing has been in flight for at least `quiet`.
    pub fn is_idle(&self, quiet: Duration, now: Instant) -> bool {
        self.in_flight.is_empty() && now.saturating_duration_since(self.since) >= quiet
    }

    /// Forget everything in flight, e.g. after a navigation replaced the
    /// document whose requests would never report completion.
    pub fn reset(&mut self, now: Instant) {
        self.in_flight.clear();
        self.since = now;
    }
}
