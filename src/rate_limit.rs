use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sliding-window limiter shared by every chat connection.
///
/// The window is global rather than per user: it caps the total number of
/// completion requests the backend sends upstream, whoever asked for them.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<Vec<Instant>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            limit,
            window,
        }
    }

    /// Records the request and returns true if it fits in the window.
    /// A denied request is not recorded, so it does not extend the lockout.
    pub fn admit(&self) -> bool {
        let now = Instant::now();
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let in_window = requests
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count();

        if in_window >= self.limit {
            return false;
        }

        requests.push(now);
        true
    }

    /// Drops timestamps that have aged out of the window.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        requests.retain(|t| now.duration_since(*t) < self.window);
    }

    #[cfg(test)]
    fn recorded(&self) -> usize {
        match self.requests.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[cfg(test)]
    fn backdate_all(&self, by: Duration) {
        let mut requests = match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for t in requests.iter_mut() {
            if let Some(earlier) = t.checked_sub(by) {
                *t = earlier;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_the_limit_then_denies() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));

        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
    }

    #[test]
    fn test_denied_request_is_not_recorded() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());
        assert!(!limiter.admit());

        assert_eq!(limiter.recorded(), 2);
    }

    #[test]
    fn test_requests_outside_the_window_free_capacity() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(!limiter.admit());

        // Age the recorded requests past the window edge.
        limiter.backdate_all(Duration::from_secs(61));

        assert!(limiter.admit());
    }

    #[test]
    fn test_sweep_drops_only_expired_timestamps() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));

        assert!(limiter.admit());
        assert!(limiter.admit());
        limiter.backdate_all(Duration::from_secs(61));
        assert!(limiter.admit());

        limiter.sweep();
        assert_eq!(limiter.recorded(), 1);
    }

    #[test]
    fn test_clones_share_one_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let clone = limiter.clone();

        assert!(limiter.admit());
        assert!(clone.admit());
        assert!(!limiter.admit());
        assert!(!clone.admit());
    }
}
