use std::future::Future;
use std::time::Duration;

use crate::breaker::{CircuitBreaker, Pass};
use crate::{CircuitSnapshot, ResilienceError};

/// Tuning knobs for one pipeline.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Bound on a single attempt.
    pub attempt_timeout: Duration,

    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Backoff before retry `n` is `backoff_base * 2^n`.
    pub backoff_base: Duration,

    /// Consecutive failed executions before the circuit opens.
    pub failure_threshold: u32,

    /// Cool-down window while the circuit is open.
    pub break_duration: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            failure_threshold: 5,
            break_duration: Duration::from_secs(30),
        }
    }
}

/// Timeout → retry → circuit breaker wrapper for one named dependency.
pub struct ResiliencePipeline {
    name: String,
    config: ResilienceConfig,
    breaker: CircuitBreaker,
}

enum AttemptFailure<E> {
    TimedOut,
    Inner(E),
}

impl ResiliencePipeline {
    /// Creates a pipeline with the default policy constants.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, ResilienceConfig::default())
    }

    /// Creates a pipeline with explicit tuning.
    pub fn with_config(name: impl Into<String>, config: ResilienceConfig) -> Self {
        let name = name.into();
        let breaker = CircuitBreaker::new(
            name.clone(),
            config.failure_threshold,
            config.break_duration,
        );
        Self {
            name,
            config,
            breaker,
        }
    }

    /// Returns the dependency name this pipeline guards.
    pub fn dependency(&self) -> &str {
        &self.name
    }

    /// Returns the breaker position, for observability.
    pub fn circuit(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    /// Runs `op` through the pipeline.
    ///
    /// `op` is invoked once per attempt; each attempt is bounded by the
    /// attempt timeout, failures are retried with exponential backoff up
    /// to the attempt bound, and the whole execution counts once against
    /// the circuit breaker.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match self.breaker.try_pass() {
            Pass::Granted | Pass::Probe => {}
            Pass::Rejected => {
                metrics::counter!("circuit_short_circuited_total").increment(1);
                return Err(ResilienceError::CircuitOpen {
                    dependency: self.name.clone(),
                });
            }
        }

        let outcome = self.run_attempts(&mut op).await;
        match &outcome {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        outcome
    }

    async fn run_attempts<T, E, F, Fut>(&self, op: &mut F) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;
        loop {
            let failure = match tokio::time::timeout(self.config.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => AttemptFailure::Inner(e),
                Err(_) => AttemptFailure::TimedOut,
            };

            if attempt >= self.config.max_attempts {
                return Err(match failure {
                    AttemptFailure::TimedOut => ResilienceError::Timeout {
                        dependency: self.name.clone(),
                        timeout: self.config.attempt_timeout,
                    },
                    AttemptFailure::Inner(cause) => ResilienceError::Exhausted {
                        dependency: self.name.clone(),
                        attempts: attempt,
                        cause,
                    },
                });
            }

            let delay = self.config.backoff_base * 2u32.pow(attempt);
            match &failure {
                AttemptFailure::TimedOut => tracing::warn!(
                    dependency = %self.name,
                    attempt,
                    delay_secs = delay.as_secs(),
                    "attempt timed out, retrying"
                ),
                AttemptFailure::Inner(e) => tracing::warn!(
                    dependency = %self.name,
                    attempt,
                    delay_secs = delay.as_secs(),
                    reason = %e,
                    "attempt failed, retrying"
                ),
            }
            metrics::counter!("resilience_retries_total").increment(1);

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> ResilienceConfig {
        ResilienceConfig {
            attempt_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            failure_threshold: 2,
            break_duration: Duration::from_secs(30),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_through() {
        let pipeline = ResiliencePipeline::with_config("dep", fast_config());
        let result: Result<u32, ResilienceError<String>> =
            pipeline.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let pipeline = ResiliencePipeline::with_config("dep", fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<u32, ResilienceError<String>> = pipeline
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("flaky".to_string())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_bounded_attempts() {
        let pipeline = ResiliencePipeline::with_config("dep", fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<u32, _> = pipeline
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(ResilienceError::Exhausted {
                attempts, cause, ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(cause, "down");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let pipeline = ResiliencePipeline::with_config("dep", fast_config());

        let result: Result<u32, ResilienceError<String>> = pipeline
            .execute(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_opens_and_short_circuits() {
        let pipeline = ResiliencePipeline::with_config("dep", fast_config());
        let calls = AtomicU32::new(0);

        for _ in 0..2 {
            let _: Result<u32, _> = pipeline
                .execute(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down".to_string()) }
                })
                .await;
        }
        assert_eq!(pipeline.circuit(), CircuitSnapshot::Open);
        let before = calls.load(Ordering::SeqCst);

        let result: Result<u32, _> = pipeline
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("down".to_string()) }
            })
            .await;

        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_closes_after_successful_probe() {
        let pipeline = ResiliencePipeline::with_config("dep", fast_config());

        for _ in 0..2 {
            let _: Result<u32, _> = pipeline
                .execute(|| async { Err("down".to_string()) })
                .await;
        }
        assert_eq!(pipeline.circuit(), CircuitSnapshot::Open);

        tokio::time::advance(Duration::from_secs(31)).await;

        let result: Result<u32, ResilienceError<String>> =
            pipeline.execute(|| async { Ok(9) }).await;
        assert_eq!(result.unwrap(), 9);
        assert_eq!(pipeline.circuit(), CircuitSnapshot::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_dependencies_have_independent_circuits() {
        let a = ResiliencePipeline::with_config("a", fast_config());
        let b = ResiliencePipeline::with_config("b", fast_config());

        for _ in 0..2 {
            let _: Result<u32, _> = a.execute(|| async { Err("down".to_string()) }).await;
        }

        assert_eq!(a.circuit(), CircuitSnapshot::Open);
        assert_eq!(b.circuit(), CircuitSnapshot::Closed);
        let result: Result<u32, ResilienceError<String>> = b.execute(|| async { Ok(1) }).await;
        assert!(result.is_ok());
    }
}
