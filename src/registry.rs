/// Process-wide registry of named circuit breakers
///
/// The registry is the only entity that creates or removes breaker
/// instances; each breaker still manages its own state transitions under
/// its own lock. Construct one registry at startup and pass the handle to
/// the facade and to anything serving health data - there is no ambient
/// global instance.
use crate::circuit_breaker::{BreakerHealth, CircuitBreaker, CircuitBreakerConfig};
use crate::events::{EventSink, TracingSink};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How often the recovery sweep scans all breakers
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(2);
/// How often idle breakers are collected
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(3600);
/// How long a breaker may sit without activity before eviction
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    defaults: CircuitBreakerConfig,
    sink: Arc<dyn EventSink>,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: CircuitBreakerConfig) -> Self {
        Self::with_sink(defaults, Arc::new(TracingSink))
    }

    pub fn with_sink(defaults: CircuitBreakerConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            defaults,
            sink,
        }
    }

    /// Return the breaker for `name`, creating it with registry defaults
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        self.get_or_create_with(name, self.defaults.clone())
    }

    /// Return the breaker for `name`, creating it with `config`
    ///
    /// Compute-if-absent: a construction race between two callers resolves
    /// to exactly one stored instance returned to both. The config only
    /// applies to the caller that wins creation.
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(unit = name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::with_sink(name, config, self.sink.clone()))
            })
            .clone()
    }

    /// Breaker for `name` if it already exists
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Number of registered breakers
    pub fn len(&self) -> usize {
        self.breakers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.read().len() == 0
    }

    /// Per-breaker health view for dashboards and alerting; not a hot path
    pub fn health_snapshot(&self) -> HashMap<String, BreakerHealth> {
        let breakers = self.breakers.read();
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.snapshot()))
            .collect()
    }

    /// One recovery pass over all breakers
    ///
    /// Eligible Open breakers transition to HalfOpen proactively, so the
    /// next caller does not pay the transition check and breakers with no
    /// traffic still self-heal. Returns the number of transitions made.
    pub fn sweep_once(&self) -> usize {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().values().cloned().collect();

        let mut transitioned = 0;
        for breaker in breakers {
            if breaker.check_recovery() {
                transitioned += 1;
            }
        }
        if transitioned > 0 {
            info!(count = transitioned, "Recovery sweep moved breakers to half-open");
        }
        transitioned
    }

    /// Remove breakers with no recorded activity for longer than `retention`
    pub fn evict_idle(&self, retention: Duration) -> usize {
        let mut breakers = self.breakers.write();
        let before = breakers.len();
        breakers.retain(|name, breaker| {
            let keep = breaker.idle_for() < retention;
            if !keep {
                info!(unit = name.as_str(), "Evicting idle circuit breaker");
            }
            keep
        });
        before - breakers.len()
    }

    /// Spawn the periodic recovery sweep
    ///
    /// A faulted iteration is caught and logged; the loop backs off with
    /// jitter and keeps running.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let result = catch_unwind(AssertUnwindSafe(|| registry.sweep_once()));
                if result.is_err() {
                    let backoff = sweep_backoff(interval);
                    warn!(
                        backoff_ms = backoff.as_millis() as u64,
                        "Recovery sweep iteration faulted; restarting after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        })
    }

    /// Spawn the periodic idle-eviction pass
    pub fn spawn_idle_eviction(
        self: &Arc<Self>,
        interval: Duration,
        retention: Duration,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(retention);
                if evicted > 0 {
                    debug!(count = evicted, "Idle eviction pass complete");
                }
            }
        })
    }
}

/// Jittered restart delay after a faulted sweep iteration (half the sweep
/// interval, +/-30%)
fn sweep_backoff(interval: Duration) -> Duration {
    let base = interval.as_millis() as f64 / 2.0;
    let jitter_factor = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
    Duration::from_millis((base * jitter_factor).max(1.0) as u64)
}
