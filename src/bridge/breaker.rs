//! Per-component circuit breaker.
//!
//! ```text
//! +--------+   final failures >= threshold   +------+
//! | Closed | ------------------------------> | Open |
//! +--------+                                 +------+
//!     ^                                         |
//!     | success                                 | cooldown elapsed
//!     |                                         v
//!     +------------------------------------ +-----------+
//!                 failure -> Open           | Half-Open |
//!                                           +-----------+
//! ```
//!
//! Only final failures (after retries) are recorded here.

use serde::Serialize;
use std::time::{Duration, Instant};

const MIN_TRIAL_WINDOW: Duration = Duration::from_secs(1);

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls pass through.
    Closed,
    /// Calls are short-circuited to fallbacks.
    Open,
    /// One trial call is allowed.
    HalfOpen,
}

impl BreakerState {
    /// Numeric value for the state gauge (0 closed, 1 open, 2 half-open).
    #[must_use]
    pub const fn gauge_value(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Consecutive final failures.
    pub consecutive_failures: u32,
    /// Milliseconds since the last failure, if any.
    pub since_last_failure_ms: Option<u64>,
}

/// Circuit breaker for one remote component.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_started: Option<Instant>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure: None,
            trial_started: None,
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    /// Checks whether a call may proceed, moving open to half-open once the
    /// cooldown has elapsed. Half-open admits a single trial.
    pub fn allow(&mut self, component: &str) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = self
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.cooldown);
                if cooled {
                    tracing::info!(component, "circuit breaker transitioning to half-open");
                    self.state = BreakerState::HalfOpen;
                    self.trial_started = Some(Instant::now());
                    true
                } else {
                    false
                }
            },
            BreakerState::HalfOpen => {
                // A trial abandoned mid-flight (caller cancelled) is replaced
                // once it is older than the stale window.
                let stale = self
                    .trial_started
                    .is_none_or(|at| at.elapsed() >= self.cooldown.max(MIN_TRIAL_WINDOW));
                if stale {
                    self.trial_started = Some(Instant::now());
                }
                stale
            },
        }
    }

    /// Records a success: failures reset, state closed.
    pub fn on_success(&mut self, component: &str) {
        if self.state != BreakerState::Closed {
            tracing::info!(component, "circuit breaker closing after success");
        }
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.trial_started = None;
    }

    /// Records a final failure. Returns `true` if the breaker just opened.
    pub fn on_failure(&mut self, component: &str) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
        self.trial_started = None;

        match self.state {
            BreakerState::Closed if self.consecutive_failures >= self.failure_threshold => {
                tracing::warn!(
                    component,
                    failures = self.consecutive_failures,
                    threshold = self.failure_threshold,
                    "circuit breaker opened after consecutive failures"
                );
                self.state = BreakerState::Open;
                true
            },
            BreakerState::HalfOpen => {
                tracing::warn!(component, "circuit breaker re-opened after half-open failure");
                self.state = BreakerState::Open;
                true
            },
            _ => false,
        }
    }

    /// Returns the current state without transitioning.
    #[must_use]
    pub const fn state(&self) -> BreakerState {
        self.state
    }

    /// Returns a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            since_last_failure_ms: self
                .last_failure
                .map(|at| u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(!breaker.on_failure("c"));
        assert!(!breaker.on_failure("c"));
        assert!(breaker.allow("c"));
        assert!(breaker.on_failure("c"));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.allow("c"));
    }

    #[test]
    fn test_half_open_single_trial_then_close() {
        let mut breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.on_failure("c");
        assert_eq!(breaker.state(), BreakerState::Open);

        assert!(breaker.allow("c"));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(!breaker.allow("c"), "only one trial while half-open");

        breaker.on_success("c");
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.on_failure("c");
        assert!(breaker.allow("c"));
        assert!(breaker.on_failure("c"));
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.snapshot().consecutive_failures, 2);
    }

    #[test]
    fn test_success_resets_count() {
        let mut breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.on_failure("c");
        breaker.on_failure("c");
        breaker.on_success("c");
        breaker.on_failure("c");
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 1);
    }
}
