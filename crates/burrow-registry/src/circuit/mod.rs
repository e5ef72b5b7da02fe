//! Per-uplink failure tracking
//!
//! After `max_fails` consecutive failures an uplink is considered offline
//! and requests to it are refused for `fail_timeout`. Once that window has
//! passed requests are let through again; the first one to succeed closes
//! the circuit.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

/// Admission state of an uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Fewer than `max_fails` consecutive failures
    Closed,
    /// Too many failures, and the last attempt was within `fail_timeout`
    Open,
    /// Too many failures, but `fail_timeout` has passed; a probe may go out
    HalfOpen,
}

#[derive(Debug, Default)]
struct UplinkState {
    failed_requests: u32,
    last_request_time: Option<Instant>,
}

/// Failure tracker owned by one uplink client
#[derive(Debug)]
pub struct CircuitBreaker {
    host: String,
    max_fails: u32,
    fail_timeout: Duration,
    state: Mutex<UplinkState>,
}

impl CircuitBreaker {
    pub fn new(host: impl Into<String>, max_fails: u32, fail_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            max_fails,
            fail_timeout,
            state: Mutex::new(UplinkState::default()),
        }
    }

    /// Record the outcome of a completed request
    pub fn record_outcome(&self, success: bool) {
        self.record_outcome_at(success, Instant::now());
    }

    pub fn record_outcome_at(&self, success: bool, now: Instant) {
        let mut state = self.state.lock();
        if success {
            if state.failed_requests >= self.max_fails {
                warn!(host = %self.host, "host {} is back online", self.host);
            }
            state.failed_requests = 0;
        } else {
            state.failed_requests = state.failed_requests.saturating_add(1);
            if state.failed_requests == self.max_fails {
                warn!(host = %self.host, "host {} is now offline", self.host);
            }
        }
        state.last_request_time = Some(now);
    }

    /// Whether a request may be sent; false only while `Open`
    pub fn is_available(&self) -> bool {
        self.is_available_at(Instant::now())
    }

    pub fn is_available_at(&self, now: Instant) -> bool {
        self.state_at(now) != CircuitState::Open
    }

    pub fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    pub fn state_at(&self, now: Instant) -> CircuitState {
        let state = self.state.lock();
        if state.failed_requests < self.max_fails {
            return CircuitState::Closed;
        }
        match state.last_request_time {
            Some(last) if now.saturating_duration_since(last) < self.fail_timeout => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    /// Consecutive failures so far
    pub fn failed_requests(&self) -> u32 {
        self.state.lock().failed_requests
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::new("registry.npmjs.org", 2, Duration::from_secs(300));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.is_available());
        assert_eq!(breaker.failed_requests(), 0);
    }

    #[test]
    fn test_opens_after_max_fails() {
        let breaker = CircuitBreaker::new("registry.npmjs.org", 2, Duration::from_secs(300));
        let start = Instant::now();

        breaker.record_outcome_at(false, start);
        assert_eq!(breaker.state_at(start), CircuitState::Closed);

        breaker.record_outcome_at(false, start);
        assert_eq!(breaker.state_at(start), CircuitState::Open);
        assert!(!breaker.is_available_at(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_half_open_after_fail_timeout() {
        let fail_timeout = Duration::from_secs(300);
        let breaker = CircuitBreaker::new("registry.npmjs.org", 2, fail_timeout);
        let start = Instant::now();

        breaker.record_outcome_at(false, start);
        breaker.record_outcome_at(false, start);

        let later = start + fail_timeout;
        assert_eq!(breaker.state_at(later), CircuitState::HalfOpen);
        assert!(breaker.is_available_at(later));
        assert_eq!(breaker.failed_requests(), 2);

        breaker.record_outcome_at(true, later);
        assert_eq!(breaker.failed_requests(), 0);
        assert_eq!(breaker.state_at(later), CircuitState::Closed);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let fail_timeout = Duration::from_secs(60);
        let breaker = CircuitBreaker::new("registry.npmjs.org", 2, fail_timeout);
        let start = Instant::now();

        breaker.record_outcome_at(false, start);
        breaker.record_outcome_at(false, start);

        let probe = start + fail_timeout + Duration::from_secs(1);
        breaker.record_outcome_at(false, probe);
        assert_eq!(breaker.failed_requests(), 3);
        assert_eq!(breaker.state_at(probe + Duration::from_secs(1)), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_before_threshold() {
        let breaker = CircuitBreaker::new("registry.npmjs.org", 3, Duration::from_secs(60));

        breaker.record_outcome(false);
        breaker.record_outcome(false);
        breaker.record_outcome(true);
        breaker.record_outcome(false);

        assert_eq!(breaker.failed_requests(), 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_concurrent_outcomes_are_counted() {
        use std::sync::Arc;

        let breaker = Arc::new(CircuitBreaker::new("registry.npmjs.org", 1_000, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        breaker.record_outcome(false);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(breaker.failed_requests(), 800);
    }
}
