//! Reconnection backoff and circuit breaking
//!
//! The connection monitor drives both: `Backoff` spaces out redial
//! attempts, the `CircuitBreaker` stops dialing altogether after
//! sustained failure.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Exponential backoff with jitter
///
/// Jitter is load-bearing here: without it, every agent in a fleet
/// redials at the same instant after a controller restart.
#[derive(Debug)]
pub struct Backoff {
    /// Delay before the first retry
    base: Duration,
    /// Upper bound for any single delay
    max: Duration,
    /// Growth factor per attempt
    multiplier: f64,
    /// Jitter fraction; each delay moves by up to ±(delay * jitter / 2)
    jitter: f64,
    /// Attempt counter wraps back to 1 past this threshold
    max_attempts: u32,
    attempts: u32,
}

impl Backoff {
    /// Create a backoff with explicit parameters
    pub fn new(base: Duration, max: Duration, multiplier: f64, jitter: f64, max_attempts: u32) -> Self {
        Self {
            base,
            max,
            multiplier,
            jitter,
            max_attempts: max_attempts.max(1),
            attempts: 0,
        }
    }

    /// Base delay (the monitor uses 2x this as its post-close grace sleep)
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Attempts recorded since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Compute the next delay and advance the attempt counter
    pub fn next(&mut self) -> Duration {
        self.attempts += 1;
        if self.attempts > self.max_attempts {
            self.attempts = 1;
        }

        let exp = (self.attempts - 1) as i32;
        let raw_ms = self.base.as_millis() as f64 * self.multiplier.powi(exp);
        let capped_ms = raw_ms.min(self.max.as_millis() as f64);

        // Symmetric uniform jitter of ±(delay * jitter / 2)
        let spread = capped_ms * self.jitter;
        let jittered_ms = capped_ms + (rand::random::<f64>() - 0.5) * spread;

        Duration::from_millis(jittered_ms.max(0.0) as u64)
    }

    /// Reset the attempt counter after a successful connection
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

impl Default for Backoff {
    /// Default reconnect backoff: 2s base, 5min cap, 1.5x growth,
    /// 20% jitter, counter wrap at 20 attempts
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::from_secs(300),
            1.5,
            0.2,
            20,
        )
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - connection attempts allowed
    Closed,
    /// Too many failures - attempts rejected until the reset timeout
    Open,
    /// Probing recovery - one attempt allowed
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
}

/// Circuit breaker guarding repeated failing connection attempts
///
/// Shared by reference between the monitor loop and anything observing
/// connectivity; the interior mutex is short-held and never spans I/O.
///
/// # States
///
/// - **Closed**: attempts flow through; a success resets the counter
/// - **Open**: attempts denied until `reset_timeout` since the last failure
/// - **HalfOpen**: one probe allowed; success closes, failure re-opens
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker with the given failure threshold and a 5 minute reset timeout
    pub fn new(failure_threshold: u32) -> Self {
        Self::with_timeout(failure_threshold, Duration::from_secs(300))
    }

    /// Create a breaker with explicit threshold and reset timeout
    pub fn with_timeout(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
            }),
        }
    }

    /// Whether a connection attempt may proceed
    ///
    /// The first call after `reset_timeout` has elapsed on an open
    /// circuit transitions it to half-open and allows one probe.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed_enough = inner
                    .last_failure
                    .map(|t| t.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);
                if elapsed_enough {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(
                        "circuit breaker half-open after {:?}, allowing one probe",
                        self.reset_timeout
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful connection
    ///
    /// - Closed: resets the failure counter
    /// - HalfOpen: closes the circuit
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            tracing::info!("circuit breaker closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
    }

    /// Record a failed connection
    ///
    /// - Closed: increments the counter, opens at the threshold
    /// - HalfOpen: re-opens immediately, no grace
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!("circuit breaker probe failed, re-opened");
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, without transitioning
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Consecutive failures recorded since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}

impl Default for CircuitBreaker {
    /// Default breaker: opens after 5 consecutive failures, 5min reset timeout
    fn default() -> Self {
        Self::new(5)
    }
}
