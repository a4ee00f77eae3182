//! Trailing-edge throttle.
//!
//! Contract:
//! - The first offer after a delivery opens a window of `interval`.
//! - Further offers inside the window replace the pending value; nothing is
//!   queued, so the newest value always wins.
//! - At the window boundary exactly one value (the last offered) is due.
//!
//! The throttle owns no timer. The owner sleeps until [`Throttle::deadline`]
//! and then calls [`Throttle::take_due`]; cancelling means dropping the
//! pending value, after which nothing can fire.

use tokio::time::{Duration, Instant};

#[derive(Debug)]
pub struct Throttle<T> {
    interval: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
    last_delivery: Option<Instant>,
}

impl<T> Throttle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: None,
            deadline: None,
            last_delivery: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Store `value` for delivery at the current window boundary, opening a
    /// window if none is running. Returns the boundary.
    pub fn offer(&mut self, value: T, now: Instant) -> Instant {
        let deadline = *self.deadline.get_or_insert(now + self.interval);
        self.pending = Some(value);
        tracing::trace!(target: "sync.throttle", ?deadline, "offer");
        deadline
    }

    /// The pending value once its boundary has been reached.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.last_delivery = Some(now);
                self.pending.take()
            }
            _ => None,
        }
    }

    /// Push the current boundary back to at least `at`.
    pub fn defer_until(&mut self, at: Instant) {
        if let Some(deadline) = self.deadline.as_mut()
            && *deadline < at
        {
            *deadline = at;
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn last_delivery(&self) -> Option<Instant> {
        self.last_delivery
    }

    /// Drop the pending value and close the window.
    pub fn cancel(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_inside_window_delivers_last_value_once() {
        let t0 = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(16));
        let boundary = t.offer(0.1, t0);
        for (i, v) in [0.2, 0.3, 0.4].into_iter().enumerate() {
            let at = t0 + Duration::from_millis(3 * (i as u64 + 1));
            assert_eq!(t.offer(v, at), boundary, "window does not slide");
        }
        assert_eq!(t.take_due(t0 + Duration::from_millis(15)), None);
        assert_eq!(t.take_due(boundary), Some(0.4));
        assert_eq!(t.take_due(boundary + Duration::from_millis(100)), None);
        assert!(!t.is_pending());
        assert_eq!(t.last_delivery(), Some(boundary));
    }

    #[test]
    fn new_window_opens_after_delivery() {
        let t0 = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(10));
        t.offer(1, t0);
        assert_eq!(t.take_due(t0 + Duration::from_millis(10)), Some(1));
        let later = t0 + Duration::from_millis(50);
        assert_eq!(t.offer(2, later), later + Duration::from_millis(10));
    }

    #[test]
    fn cancel_prevents_trailing_delivery() {
        let t0 = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(10));
        t.offer("a", t0);
        assert_eq!(t.cancel(), Some("a"));
        assert_eq!(t.deadline(), None);
        assert_eq!(t.take_due(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn defer_only_moves_forward() {
        let t0 = Instant::now();
        let mut t = Throttle::new(Duration::from_millis(10));
        t.offer(5, t0);
        t.defer_until(t0 + Duration::from_millis(5));
        assert_eq!(t.deadline(), Some(t0 + Duration::from_millis(10)));
        t.defer_until(t0 + Duration::from_millis(40));
        assert_eq!(t.take_due(t0 + Duration::from_millis(10)), None);
        assert_eq!(t.take_due(t0 + Duration::from_millis(40)), Some(5));
    }

    #[test]
    fn defer_without_pending_is_noop() {
        let t0 = Instant::now();
        let mut t: Throttle<u8> = Throttle::new(Duration::from_millis(10));
        t.defer_until(t0 + Duration::from_millis(40));
        assert_eq!(t.deadline(), None);
    }
}
