//! Cooperative cancellation for blocking loops

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Shared cancellation flag, optionally expiring at a deadline
///
/// Clones observe the same flag, so a Ctrl-C handler can hold one while a
/// reconnect loop waits on another. Cancelling wakes any pending `sleep`.
#[derive(Clone, Default)]
pub struct CancelToken {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().limited(timeout)
    }

    /// A token sharing this one's flag that also expires after `timeout`
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn limited(&self, timeout: Duration) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            deadline: earliest(self.deadline, Instant::now().checked_add(timeout)),
        }
    }

    pub fn cancel(&self) {
        *self.shared.cancelled.lock() = true;
        self.shared.wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.shared.cancelled.lock() || self.expired()
    }

    fn expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Block for `delay` or until cancelled, whichever comes first
    ///
    /// Returns `true` if the token is cancelled, checked both before and after
    /// waiting.
    pub fn sleep(&self, delay: Duration) -> bool {
        let until = earliest(self.deadline, Instant::now().checked_add(delay));

        let mut cancelled = self.shared.cancelled.lock();
        match until {
            Some(until) => {
                while !*cancelled && Instant::now() < until {
                    self.shared.wake.wait_until(&mut cancelled, until);
                }
            }
            // Unrepresentable delay: only a cancel ends it
            None => {
                while !*cancelled {
                    self.shared.wake.wait(&mut cancelled);
                }
            }
        }
        *cancelled || self.expired()
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sleep_runs_full_delay_when_not_cancelled() {
        let token = CancelToken::new();
        let start = Instant::now();
        assert!(!token.sleep(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        assert!(token.sleep(Duration::from_secs(10)));
    }

    #[test]
    fn test_cancel_wakes_sleeper() {
        let token = CancelToken::new();
        let handle = token.clone();
        let start = Instant::now();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.cancel();
        });
        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
    }

    #[test]
    fn test_deadline_bounds_sleep() {
        let token = CancelToken::with_timeout(Duration::from_millis(30));
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_limited_token_follows_parent_flag() {
        let parent = CancelToken::new();
        let limited = parent.limited(Duration::from_secs(60));
        assert!(!limited.is_cancelled());
        parent.cancel();
        assert!(limited.is_cancelled());

        // The deadline does not leak back into the parent
        let parent = CancelToken::new();
        let limited = parent.limited(Duration::ZERO);
        assert!(limited.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_huge_timeout_adds_no_deadline() {
        let parent = CancelToken::new();
        let limited = parent.limited(Duration::MAX);
        assert!(!limited.is_cancelled());
        assert!(limited.deadline.is_none());

        // An existing deadline survives
        let bounded = CancelToken::with_timeout(Duration::from_secs(60));
        assert!(bounded.limited(Duration::MAX).deadline.is_some());
    }

    #[test]
    fn test_huge_sleep_ends_on_cancel() {
        let token = CancelToken::new();
        let handle = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.cancel();
        });
        assert!(token.sleep(Duration::MAX));
        canceller.join().unwrap();

        // A deadline bounds it too
        let start = Instant::now();
        assert!(CancelToken::with_timeout(Duration::from_millis(20)).sleep(Duration::MAX));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
