/// Single entry point composing rate limiting, circuit breaking, and
/// bulkhead isolation around a caller-supplied unit of work
///
/// Check order per call: (1) rate limiter when a key is supplied, (2)
/// circuit breaker state, (3) bulkhead slot, (4) the operation itself, (5)
/// outcome recorded against the breaker, (6) slot released on every exit
/// path. A bulkhead rejection is a capacity signal and is never reported to
/// the circuit breaker - conflating the two would trip breakers during
/// traffic spikes rather than real outages.
use crate::bulkhead::BulkheadRegistry;
use crate::circuit_breaker::BreakerHealth;
use crate::events::{EventKind, EventSink, RejectionReason, ResilienceEvent, TracingSink};
use crate::metrics::FacadeMetrics;
use crate::presets::ResilienceConfig;
use crate::rate_limiter::RateLimiter;
use crate::registry::{
    CircuitBreakerRegistry, DEFAULT_EVICTION_INTERVAL, DEFAULT_RETENTION, DEFAULT_SWEEP_INTERVAL,
};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Typed failure taxonomy surfaced to callers
///
/// All four kinds are fail-fast and synchronous; none of them trigger
/// internal retries. Retry policy, if any, belongs to the calling service.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error("circuit breaker '{unit}' is open - failing fast")]
    CircuitOpen { unit: String },
    #[error("bulkhead '{unit}' is saturated - request rejected")]
    BulkheadOverflow { unit: String },
    #[error("rate limit exceeded for key '{key}'")]
    RateLimited { key: String },
    #[error("operation failed in unit '{unit}': {cause}")]
    Operation { unit: String, cause: E },
}

pub struct ResilienceFacade {
    config: ResilienceConfig,
    breakers: Arc<CircuitBreakerRegistry>,
    bulkheads: Arc<BulkheadRegistry>,
    limiter: Arc<RateLimiter>,
    sink: Arc<dyn EventSink>,
}

impl ResilienceFacade {
    pub fn new(config: ResilienceConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: ResilienceConfig, sink: Arc<dyn EventSink>) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::with_sink(
            config.defaults.circuit_breaker.clone(),
            sink.clone(),
        ));
        let bulkheads = Arc::new(BulkheadRegistry::new(config.defaults.bulkhead.clone()));
        Self {
            config,
            breakers,
            bulkheads,
            limiter: Arc::new(RateLimiter::new()),
            sink,
        }
    }

    /// Breaker registry handle, for health endpoints and direct sweeps
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Bulkhead registry handle
    pub fn bulkheads(&self) -> &Arc<BulkheadRegistry> {
        &self.bulkheads
    }

    /// Health data for every known breaker, keyed by unit name
    pub fn health_snapshot(&self) -> HashMap<String, BreakerHealth> {
        self.breakers.health_snapshot()
    }

    /// Spawn the recovery sweep, idle eviction, and limiter purge loops
    ///
    /// The tasks run until aborted; callers keep the handles for shutdown.
    pub fn spawn_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let sweeper = self.breakers.spawn_sweeper(DEFAULT_SWEEP_INTERVAL);
        let eviction = self
            .breakers
            .spawn_idle_eviction(DEFAULT_EVICTION_INTERVAL, DEFAULT_RETENTION);

        let limiter = self.limiter.clone();
        let purge = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DEFAULT_EVICTION_INTERVAL);
            loop {
                ticker.tick().await;
                limiter.purge_stale(DEFAULT_RETENTION);
            }
        });

        vec![sweeper, eviction, purge]
    }

    /// Run `operation` under `unit`'s breaker and bulkhead
    pub async fn run<F, Fut, T, E>(&self, unit: &str, operation: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run_inner(unit, None, operation).await
    }

    /// Run `operation` with a per-key rate limit applied first
    ///
    /// The key is caller-chosen (tenant, session, IP) and checked against
    /// the unit's configured budget before the breaker or bulkhead is
    /// touched. Units with no configured budget admit every key.
    pub async fn run_keyed<F, Fut, T, E>(
        &self,
        unit: &str,
        rate_limit_key: &str,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run_inner(unit, Some(rate_limit_key), operation).await
    }

    /// Run `operation`, answering with `fallback` if the circuit is open
    ///
    /// The fallback replaces only the open-circuit rejection; bulkhead and
    /// rate-limit rejections and operation errors still surface.
    pub async fn run_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        unit: &str,
        operation: F,
        fallback: FB,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
        E: fmt::Display,
    {
        match self.run_inner(unit, None, operation).await {
            Err(ResilienceError::CircuitOpen { .. }) => Ok(fallback().await),
            other => other,
        }
    }

    /// [`run_keyed`](Self::run_keyed) plus an open-circuit fallback
    pub async fn run_keyed_with_fallback<F, Fut, FB, FbFut, T, E>(
        &self,
        unit: &str,
        rate_limit_key: &str,
        operation: F,
        fallback: FB,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = T>,
        E: fmt::Display,
    {
        match self.run_inner(unit, Some(rate_limit_key), operation).await {
            Err(ResilienceError::CircuitOpen { .. }) => Ok(fallback().await),
            other => other,
        }
    }

    async fn run_inner<F, Fut, T, E>(
        &self,
        unit: &str,
        rate_limit_key: Option<&str>,
        operation: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let unit_config = self.config.unit(unit);

        if let Some(key) = rate_limit_key {
            if let Some(budget) = &unit_config.rate_limit {
                if !self.limiter.allow(key, budget.limit, budget.window) {
                    self.emit_rejection(unit, RejectionReason::RateLimited);
                    return Err(ResilienceError::RateLimited {
                        key: key.to_string(),
                    });
                }
            }
        }

        let breaker = self
            .breakers
            .get_or_create_with(unit, unit_config.circuit_breaker.clone());
        if !breaker.call_permitted() {
            self.emit_rejection(unit, RejectionReason::CircuitOpen);
            return Err(ResilienceError::CircuitOpen {
                unit: unit.to_string(),
            });
        }

        let pool = self
            .bulkheads
            .get_or_create_with(unit, unit_config.bulkhead.clone());
        // Held until the function returns: released on every exit path
        let _permit = match pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                // Saturation is not a dependency failure; the breaker is untouched
                self.emit_rejection(unit, RejectionReason::BulkheadOverflow);
                return Err(ResilienceError::BulkheadOverflow {
                    unit: unit.to_string(),
                });
            }
        };

        match operation().await {
            Ok(value) => {
                breaker.record_success();
                FacadeMetrics::record_call(unit, "success");
                self.sink.emit(ResilienceEvent::now(unit, EventKind::Success));
                Ok(value)
            }
            Err(cause) => {
                breaker.record_failure();
                FacadeMetrics::record_call(unit, "failure");
                self.sink.emit(ResilienceEvent::now(unit, EventKind::Failure));
                Err(ResilienceError::Operation {
                    unit: unit.to_string(),
                    cause,
                })
            }
        }
    }

    fn emit_rejection(&self, unit: &str, reason: RejectionReason) {
        FacadeMetrics::record_rejection(unit, reason.as_str());
        self.sink
            .emit(ResilienceEvent::now(unit, EventKind::Rejection { reason }));
    }
}
