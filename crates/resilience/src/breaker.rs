use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Observable breaker position, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitSnapshot {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

/// Circuit breaker for one named dependency.
///
/// Counts consecutive failed executions (a whole retried call, not a
/// single attempt). At the threshold the circuit opens for the break
/// duration, after which exactly one probe call is let through: its
/// success closes the circuit, its failure reopens it.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    break_duration: Duration,
    state: Mutex<State>,
}

/// Permission to run one execution.
pub(crate) enum Pass {
    /// Circuit closed, call proceeds.
    Granted,
    /// This caller is the half-open probe.
    Probe,
    /// Circuit open, call must not run.
    Rejected,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named dependency.
    pub fn new(name: impl Into<String>, failure_threshold: u32, break_duration: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            break_duration,
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
        }
    }

    /// Returns the current position.
    pub fn snapshot(&self) -> CircuitSnapshot {
        match *self.state.lock().unwrap() {
            State::Closed { .. } => CircuitSnapshot::Closed,
            State::Open { .. } => CircuitSnapshot::Open,
            State::HalfOpen => CircuitSnapshot::HalfOpen,
        }
    }

    pub(crate) fn try_pass(&self) -> Pass {
        let mut state = self.state.lock().unwrap();
        match *state {
            State::Closed { .. } => Pass::Granted,
            State::Open { until } => {
                if Instant::now() >= until {
                    *state = State::HalfOpen;
                    tracing::info!(dependency = %self.name, "circuit half-open, probing");
                    metrics::counter!("circuit_half_open_total").increment(1);
                    Pass::Probe
                } else {
                    Pass::Rejected
                }
            }
            // A probe is already in flight; everyone else stays out.
            State::HalfOpen => Pass::Rejected,
        }
    }

    pub(crate) fn record_success(&self) {
        let mut state = self.state.lock().unwrap();
        if matches!(*state, State::HalfOpen) {
            tracing::info!(dependency = %self.name, "circuit closed, dependency healthy again");
            metrics::counter!("circuit_closed_total").increment(1);
        }
        *state = State::Closed {
            consecutive_failures: 0,
        };
    }

    pub(crate) fn record_failure(&self) {
        let mut state = self.state.lock().unwrap();
        let failures = match *state {
            State::Closed {
                consecutive_failures,
            } => consecutive_failures + 1,
            // A failed probe reopens immediately.
            State::HalfOpen => self.failure_threshold,
            State::Open { .. } => return,
        };

        if failures >= self.failure_threshold {
            *state = State::Open {
                until: Instant::now() + self.break_duration,
            };
            tracing::error!(
                dependency = %self.name,
                break_secs = self.break_duration.as_secs(),
                "circuit opened"
            );
            metrics::counter!("circuit_opened_total").increment(1);
        } else {
            *state = State::Closed {
                consecutive_failures: failures,
            };
        }
    }
}
