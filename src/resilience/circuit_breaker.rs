//! Circuit breaker for outbound dependencies.
//!
//! # States
//! - Closed: normal operation, calls pass through and are recorded
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of probes test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: window holds >= min_calls and failure rate >= threshold
//! Open → Half-Open: next call after open_state_duration
//! Half-Open → Closed: probe succeeds (window cleared)
//! Half-Open → Open: probe fails (window cleared, timer restarted)
//! ```
//!
//! # Design Decisions
//! - Count-based ring window of the last N attempted calls
//! - Admission and recording are each one critical section on a std mutex
//! - Every transition bumps a generation; outcomes from an older generation
//!   are dropped
//! - Admitted calls run in their own task, so a cancelled caller does not
//!   lose the outcome, and a panicking call still counts as a failure

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::{self, Instant};

use crate::config::BreakerSettings;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one attempted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Rejected without calling the dependency.
    #[error("circuit breaker '{0}' is open")]
    Open(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The call ran and failed.
    #[error("{0}")]
    Call(E),

    /// The call's task panicked or was cancelled.
    #[error("call aborted: {0}")]
    Aborted(String),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }
}

/// Resolved breaker settings.
#[derive(Debug, Clone)]
pub struct BreakerPolicy {
    pub window_size: usize,
    pub min_calls: usize,
    /// Percentage, 0-100.
    pub failure_rate_threshold: f64,
    pub open_duration: Duration,
    pub half_open_permits: u32,
    pub call_timeout: Duration,
}

impl BreakerPolicy {
    /// Resolve `settings`, using `default_timeout` when no call timeout is set.
    pub fn new(settings: &BreakerSettings, default_timeout: Duration) -> Self {
        Self {
            window_size: settings.sliding_window_size.max(1),
            min_calls: settings.min_calls.max(1),
            failure_rate_threshold: settings.failure_rate_threshold,
            open_duration: Duration::from_secs(settings.open_state_duration_secs),
            half_open_permits: settings.half_open_permits.max(1),
            call_timeout: settings
                .call_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default_timeout),
        }
    }
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    window: VecDeque<CallOutcome>,
    opened_at: Option<Instant>,
    probes_in_flight: u32,
    generation: u64,
}

impl BreakerCore {
    fn failures(&self) -> usize {
        self.window
            .iter()
            .filter(|o| **o == CallOutcome::Failure)
            .count()
    }

    fn failure_rate(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.failures() as f64 * 100.0 / self.window.len() as f64
        }
    }
}

/// Point-in-time view of a breaker for the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_rate: f64,
    pub buffered_calls: usize,
    pub failed_calls: usize,
    pub probes_in_flight: u32,
    /// Time left before a probe is admitted, while OPEN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_remaining_ms: Option<u64>,
}

/// Circuit breaker guarding one named dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    policy: BreakerPolicy,
    core: Mutex<BreakerCore>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, policy: BreakerPolicy) -> Self {
        Self {
            name: name.into(),
            core: Mutex::new(BreakerCore {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(policy.window_size),
                opened_at: None,
                probes_in_flight: 0,
                generation: 0,
            }),
            policy,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> &BreakerPolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, accounting for an elapsed open period only on the next
    /// admission attempt.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    fn transition(&self, core: &mut BreakerCore, to: CircuitState) {
        let from = core.state;
        core.state = to;
        core.generation += 1;
        core.window.clear();
        core.probes_in_flight = 0;
        core.opened_at = (to == CircuitState::Open).then(Instant::now);

        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker transition");
        metrics::record_breaker_transition(&self.name, from.as_str(), to.as_str());
    }

    /// Ask to make one call. `None` means the breaker rejects it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<CallPermit> {
        let mut core = self.lock();

        if core.state == CircuitState::Open {
            let elapsed = core
                .opened_at
                .map(|at| at.elapsed())
                .unwrap_or(self.policy.open_duration);
            if elapsed < self.policy.open_duration {
                return None;
            }
            self.transition(&mut core, CircuitState::HalfOpen);
        }

        let probe = core.state == CircuitState::HalfOpen;
        if probe {
            if core.probes_in_flight >= self.policy.half_open_permits {
                return None;
            }
            core.probes_in_flight += 1;
        }

        Some(CallPermit {
            breaker: Arc::clone(self),
            generation: core.generation,
            probe,
            finished: false,
        })
    }

    fn on_complete(&self, generation: u64, probe: bool, outcome: CallOutcome) {
        metrics::record_breaker_call(&self.name, outcome == CallOutcome::Success);

        let mut core = self.lock();
        if core.generation != generation {
            tracing::debug!(breaker = %self.name, ?outcome, "Ignoring outcome from an earlier breaker state");
            return;
        }

        match core.state {
            CircuitState::Closed => {
                if core.window.len() == self.policy.window_size {
                    core.window.pop_front();
                }
                core.window.push_back(outcome);

                if core.window.len() >= self.policy.min_calls
                    && core.failure_rate() >= self.policy.failure_rate_threshold
                {
                    tracing::warn!(
                        breaker = %self.name,
                        failure_rate = core.failure_rate(),
                        calls = core.window.len(),
                        "Failure rate over threshold, opening circuit"
                    );
                    self.transition(&mut core, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if probe => {
                core.probes_in_flight = core.probes_in_flight.saturating_sub(1);
                match outcome {
                    CallOutcome::Success => self.transition(&mut core, CircuitState::Closed),
                    CallOutcome::Failure => self.transition(&mut core, CircuitState::Open),
                }
            }
            _ => {}
        }
    }

    /// Run `call` under the breaker.
    ///
    /// The call future is spawned and bounded by the policy's call timeout.
    /// `Ok` counts as a success; `Err`, a timeout or a panic as a failure.
    pub async fn execute<F, Fut, T, E>(self: &Arc<Self>, call: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let Some(permit) = self.try_acquire() else {
            metrics::record_breaker_rejection(&self.name);
            return Err(BreakerError::Open(self.name.clone()));
        };

        let timeout = self.policy.call_timeout;
        let fut = call();
        let task = tokio::spawn(async move {
            let result = time::timeout(timeout, fut).await;
            permit.record(match &result {
                Ok(Ok(_)) => CallOutcome::Success,
                _ => CallOutcome::Failure,
            });
            result
        });

        match task.await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(BreakerError::Call(e)),
            Ok(Err(_)) => Err(BreakerError::Timeout(timeout)),
            Err(e) => Err(BreakerError::Aborted(e.to_string())),
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.lock();
        let open_remaining_ms = match (core.state, core.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let remaining = self.policy.open_duration.saturating_sub(at.elapsed());
                Some(u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX))
            }
            _ => None,
        };

        BreakerSnapshot {
            name: self.name.clone(),
            state: core.state,
            failure_rate: core.failure_rate(),
            buffered_calls: core.window.len(),
            failed_calls: core.failures(),
            probes_in_flight: core.probes_in_flight,
            open_remaining_ms,
        }
    }

    /// Force the breaker CLOSED with an empty window.
    pub fn reset(&self) {
        let mut core = self.lock();
        tracing::info!(breaker = %self.name, from = %core.state, "Circuit breaker reset");
        self.transition(&mut core, CircuitState::Closed);
    }
}

/// Admission to make one call.
///
/// Dropping a permit without recording an outcome records a failure, so a
/// panicking or cancelled call still releases its probe slot.
#[derive(Debug)]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    probe: bool,
    finished: bool,
}

impl CallPermit {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record(mut self, outcome: CallOutcome) {
        self.finished = true;
        self.breaker.on_complete(self.generation, self.probe, outcome);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.finished {
            self.breaker
                .on_complete(self.generation, self.probe, CallOutcome::Failure);
        }
    }
}
