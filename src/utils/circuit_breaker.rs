use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Circuit Breaker
// ============================================================================
//
// Closed   -> calls pass; consecutive failures are counted
// Open     -> calls are refused until the cool-down has elapsed
// HalfOpen -> probe calls pass; enough successes close, one failure reopens
//
// The lock is never held across an await: callers ask `try_acquire`, run
// their operation, then report the outcome.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding (0=Closed, 1=Open, 2=HalfOpen)
    pub fn as_gauge(&self) -> i64 {
        match self {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
            CircuitState::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cool_down: Duration,
    pub probe_successes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cool_down: Duration::from_secs(30),
            probe_successes: 2,
        }
    }
}

#[derive(Debug)]
struct Tally {
    state: CircuitState,
    failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    tally: Mutex<Tally>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            tally: Mutex::new(Tally {
                state: CircuitState::Closed,
                failures: 0,
                probe_successes: 0,
                opened_at: None,
            }),
            config,
        }
    }

    fn with_tally<R>(&self, f: impl FnOnce(&mut Tally) -> R) -> R {
        let mut tally = match self.tally.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut tally)
    }

    /// Whether a call may proceed right now
    pub fn try_acquire(&self) -> bool {
        let cool_down = self.config.cool_down;
        self.with_tally(|tally| match tally.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = tally
                    .opened_at
                    .map(|opened| opened.elapsed() >= cool_down)
                    .unwrap_or(true);
                if cooled {
                    tracing::info!("Circuit breaker half-open, probing");
                    tally.state = CircuitState::HalfOpen;
                    tally.probe_successes = 0;
                }
                cooled
            }
        })
    }

    pub fn record_success(&self) {
        let needed = self.config.probe_successes;
        self.with_tally(|tally| match tally.state {
            CircuitState::HalfOpen => {
                tally.probe_successes += 1;
                if tally.probe_successes >= needed {
                    tracing::info!("Circuit breaker closed");
                    tally.state = CircuitState::Closed;
                    tally.failures = 0;
                    tally.opened_at = None;
                }
            }
            CircuitState::Closed => tally.failures = 0,
            CircuitState::Open => {}
        })
    }

    pub fn record_failure(&self) {
        let threshold = self.config.failure_threshold;
        self.with_tally(|tally| {
            tally.failures += 1;
            let trip = match tally.state {
                CircuitState::Closed => tally.failures >= threshold,
                CircuitState::HalfOpen => true,
                CircuitState::Open => false,
            };
            if trip {
                tracing::warn!(failures = tally.failures, "Circuit breaker opened");
                tally.state = CircuitState::Open;
                tally.opened_at = Some(Instant::now());
            }
        })
    }

    pub fn state(&self) -> CircuitState {
        self.with_tally(|tally| tally.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cool_down: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 2,
            cool_down,
            probe_successes: 1,
        })
    }

    #[test]
    fn test_opens_after_threshold_and_refuses() {
        let cb = breaker(Duration::from_secs(60));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = breaker(Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_closes_or_reopens() {
        let cb = breaker(Duration::from_millis(0));
        cb.record_failure();
        cb.record_failure();

        assert!(cb.try_acquire());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        assert!(cb.try_acquire());
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
