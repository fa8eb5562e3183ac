use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::observability::{BREAKER_DEGRADED, BREAKER_TRANSITIONS_TOTAL};

/// Closed = Available, open = Degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Available,
    Degraded,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    opened_at: Option<Instant>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// Tracks whether the conflict check dependency is usable.
///
/// Recovery is opportunistic: the next successful call closes the breaker.
/// With a non-zero `probe_cooldown`, calls are skipped for that long after
/// each failure while degraded.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    probe_cooldown: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl CircuitBreaker {
    pub fn new(probe_cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Available,
                opened_at: None,
                consecutive_failures: 0,
                last_error: None,
            }),
            probe_cooldown,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    pub fn is_degraded(&self) -> bool {
        self.state() == BreakerState::Degraded
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.lock().last_error.clone()
    }

    /// Whether the next request should call the dependency.
    pub fn should_attempt(&self) -> bool {
        let inner = self.inner.lock();
        match (inner.state, inner.opened_at) {
            (BreakerState::Available, _) => true,
            (BreakerState::Degraded, Some(at)) => at.elapsed() >= self.probe_cooldown,
            (BreakerState::Degraded, None) => true,
        }
    }

    /// Returns true if this call moved the breaker back to Available.
    pub fn record_success(&self) -> bool {
        let mut inner = self.inner.lock();
        let was = inner.state;
        inner.state = BreakerState::Available;
        inner.opened_at = None;
        inner.consecutive_failures = 0;
        if was == BreakerState::Degraded {
            tracing::info!(
                last_error = inner.last_error.as_deref().unwrap_or(""),
                "conflict check available again"
            );
            metrics::counter!(BREAKER_TRANSITIONS_TOTAL, "to" => "available").increment(1);
            metrics::gauge!(BREAKER_DEGRADED).set(0.0);
            return true;
        }
        false
    }

    /// Returns true if this call moved the breaker to Degraded.
    pub fn record_failure(&self, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        let was = inner.state;
        inner.state = BreakerState::Degraded;
        inner.opened_at = Some(Instant::now());
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_error = Some(reason.to_string());
        if was == BreakerState::Available {
            tracing::warn!(reason, "conflict check unavailable, entering degraded mode");
            metrics::counter!(BREAKER_TRANSITIONS_TOTAL, "to" => "degraded").increment(1);
            metrics::gauge!(BREAKER_DEGRADED).set(1.0);
            return true;
        }
        false
    }

    /// Back to Available with no history.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = BreakerState::Available;
        inner.opened_at = None;
        inner.consecutive_failures = 0;
        inner.last_error = None;
        metrics::gauge!(BREAKER_DEGRADED).set(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_available() {
        let b = CircuitBreaker::default();
        assert_eq!(b.state(), BreakerState::Available);
        assert!(b.should_attempt());
    }

    #[test]
    fn failure_then_success_round_trip() {
        let b = CircuitBreaker::default();
        assert!(b.record_failure("connection refused"));
        assert!(!b.record_failure("connection refused")); // already degraded
        assert!(b.is_degraded());
        assert_eq!(b.consecutive_failures(), 2);
        assert_eq!(b.last_error().as_deref(), Some("connection refused"));
        // zero cooldown: every request re-probes
        assert!(b.should_attempt());

        assert!(b.record_success());
        assert_eq!(b.state(), BreakerState::Available);
        assert_eq!(b.consecutive_failures(), 0);
        assert!(!b.record_success());
    }

    #[test]
    fn cooldown_skips_attempts() {
        let b = CircuitBreaker::new(Duration::from_secs(3600));
        b.record_failure("timeout");
        assert!(!b.should_attempt());
        b.reset();
        assert!(b.should_attempt());
        assert!(b.last_error().is_none());
    }
}
