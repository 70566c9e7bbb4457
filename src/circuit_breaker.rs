/// Circuit Breaker implementation with consecutive-failure tripping
///
/// State transitions:
/// - Closed → Open: when consecutive failures reach the failure threshold
/// - Open → HalfOpen: after the recovery timeout elapses
/// - HalfOpen → Closed: when success count reaches the success threshold
/// - HalfOpen → Open: on any failure
///
/// Transitions happen only along these edges and counters are reset only at
/// the transition boundaries, so the machine is deterministic regardless of
/// call interleaving. The Open → HalfOpen check is idempotent: it can be
/// evaluated lazily on the next call or proactively by the registry sweep
/// and both reach the same conclusion for the same clock reading.
use crate::events::{EventKind, EventSink, ResilienceEvent, TracingSink};
use crate::metrics::CircuitBreakerMetrics;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, requests pass through
    Closed,
    /// Circuit is open, requests fail fast
    Open,
    /// Testing if the dependency recovered, trial requests allowed
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failure count to trigger circuit open
    pub failure_threshold: u32,
    /// Success count in HalfOpen to close the circuit
    pub success_threshold: u32,
    /// Minimum time the circuit stays Open before a recovery attempt
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    #[error("circuit breaker '{0}' is open - failing fast")]
    Open(String),
    #[error("operation failed: {0}")]
    Operation(E),
}

/// Point-in-time view of a breaker, for health endpoints and dashboards
#[derive(Debug, Clone)]
pub struct BreakerHealth {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    /// Time since the last recorded failure, if any
    pub last_failure_age: Option<Duration>,
    pub healthy: bool,
}

struct BreakerState {
    current: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    last_activity_at: Option<Instant>,
}

/// A transition observed inside the critical section, emitted after it
struct Transition {
    from: CircuitState,
    to: CircuitState,
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: RwLock<BreakerState>,
    created_at: Instant,
    sink: Arc<dyn EventSink>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_sink(name, config, Arc::new(TracingSink))
    }

    pub fn with_sink(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            state: RwLock::new(BreakerState {
                current: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_at: None,
                last_activity_at: None,
            }),
            created_at: Instant::now(),
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute a future with circuit breaker protection
    ///
    /// Rejects with [`CircuitBreakerError::Open`] while the circuit is open.
    /// An error from the operation is recorded as a failure and re-raised
    /// unchanged inside [`CircuitBreakerError::Operation`].
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if !self.call_permitted() {
            return Err(CircuitBreakerError::Open(self.name.clone()));
        }

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(e))
            }
        }
    }

    /// Execute with a fallback that runs instead of the operation while the
    /// circuit is open; the protected dependency is never touched
    pub async fn execute_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        operation: F,
        fallback: FB,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
        E: fmt::Display,
    {
        if !self.call_permitted() {
            return Ok(fallback().await);
        }

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Operation(e))
            }
        }
    }

    /// Whether a call may proceed right now
    ///
    /// While Open, evaluates recovery eligibility and performs the
    /// Open → HalfOpen transition when the recovery timeout has elapsed.
    pub fn call_permitted(&self) -> bool {
        let transition = {
            let mut state = self.state.write();
            match state.current {
                CircuitState::Open => match self.try_half_open(&mut state) {
                    Some(t) => t,
                    None => return false,
                },
                CircuitState::HalfOpen | CircuitState::Closed => return true,
            }
        };
        self.emit_transition(transition);
        true
    }

    /// Idempotent Open → HalfOpen evaluation, used by the registry sweep
    ///
    /// Returns true if this check performed the transition.
    pub fn check_recovery(&self) -> bool {
        let transition = {
            let mut state = self.state.write();
            if state.current != CircuitState::Open {
                return false;
            }
            match self.try_half_open(&mut state) {
                Some(t) => t,
                None => return false,
            }
        };
        self.emit_transition(transition);
        true
    }

    // Caller holds the write lock and has verified state is Open.
    fn try_half_open(&self, state: &mut BreakerState) -> Option<Transition> {
        let eligible = state
            .last_failure_at
            .map(|at| at.elapsed() >= self.config.recovery_timeout)
            .unwrap_or(true);
        if !eligible {
            return None;
        }
        state.current = CircuitState::HalfOpen;
        state.success_count = 0;
        Some(Transition {
            from: CircuitState::Open,
            to: CircuitState::HalfOpen,
        })
    }

    /// Record a successful outcome against this breaker
    pub fn record_success(&self) {
        let transition = {
            let mut state = self.state.write();
            state.last_activity_at = Some(Instant::now());

            match state.current {
                CircuitState::Closed => {
                    // Consecutive-failures semantic: any success clears the streak
                    state.failure_count = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    state.success_count += 1;
                    if state.success_count >= self.config.success_threshold {
                        state.current = CircuitState::Closed;
                        state.failure_count = 0;
                        state.success_count = 0;
                        Some(Transition {
                            from: CircuitState::HalfOpen,
                            to: CircuitState::Closed,
                        })
                    } else {
                        None
                    }
                }
                // A call admitted before the trip can report late; ignore
                CircuitState::Open => None,
            }
        };
        if let Some(t) = transition {
            self.emit_transition(t);
        }
    }

    /// Record a failed outcome against this breaker
    ///
    /// Bulkhead rejections must NOT be reported here: saturation is a
    /// capacity signal, not a dependency-health signal.
    pub fn record_failure(&self) {
        let transition = {
            let mut state = self.state.write();
            let now = Instant::now();
            state.last_activity_at = Some(now);

            match state.current {
                CircuitState::Closed => {
                    state.failure_count += 1;
                    if state.failure_count >= self.config.failure_threshold {
                        state.current = CircuitState::Open;
                        state.success_count = 0;
                        state.last_failure_at = Some(now);
                        Some(Transition {
                            from: CircuitState::Closed,
                            to: CircuitState::Open,
                        })
                    } else {
                        state.last_failure_at = Some(now);
                        None
                    }
                }
                CircuitState::HalfOpen => {
                    state.current = CircuitState::Open;
                    state.success_count = 0;
                    state.last_failure_at = Some(now);
                    Some(Transition {
                        from: CircuitState::HalfOpen,
                        to: CircuitState::Open,
                    })
                }
                // Already open; late failures do not extend the open period
                CircuitState::Open => None,
            }
        };
        if let Some(t) = transition {
            self.emit_transition(t);
        }
    }

    /// Get current circuit state (for monitoring)
    pub fn state(&self) -> CircuitState {
        self.state.read().current
    }

    /// A breaker is healthy unless it is rejecting traffic outright
    pub fn is_healthy(&self) -> bool {
        self.state.read().current != CircuitState::Open
    }

    /// Point-in-time health view
    pub fn snapshot(&self) -> BreakerHealth {
        let state = self.state.read();
        BreakerHealth {
            state: state.current,
            failure_count: state.failure_count,
            success_count: state.success_count,
            last_failure_age: state.last_failure_at.map(|at| at.elapsed()),
            healthy: state.current != CircuitState::Open,
        }
    }

    /// Time since the last recorded outcome (creation time if none yet);
    /// feeds the registry's idle eviction
    pub fn idle_for(&self) -> Duration {
        let state = self.state.read();
        state
            .last_activity_at
            .map(|at| at.elapsed())
            .unwrap_or_else(|| self.created_at.elapsed())
    }

    fn emit_transition(&self, transition: Transition) {
        CircuitBreakerMetrics::record_state_transition(
            &self.name,
            &transition.from.to_string(),
            &transition.to.to_string(),
        );
        self.sink.emit(ResilienceEvent::now(
            &self.name,
            EventKind::StateTransition {
                from: transition.from,
                to: transition.to,
            },
        ));
    }
}
