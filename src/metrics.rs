/// Prometheus metrics for the resilience layer
#[cfg(feature = "metrics")]
use prometheus::{register_int_counter_vec, IntCounterVec};

#[cfg(feature = "metrics")]
use once_cell::sync::Lazy;

#[cfg(feature = "metrics")]
static RESILIENCE_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_calls_total",
        "Total number of operations run through the resilience facade",
        &["unit", "result"]
    )
    .expect("Failed to register resilience calls metric")
});

#[cfg(feature = "metrics")]
static RESILIENCE_STATE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_circuit_breaker_state_transitions_total",
        "Total number of circuit breaker state transitions",
        &["unit", "from", "to"]
    )
    .expect("Failed to register state transitions metric")
});

#[cfg(feature = "metrics")]
static RESILIENCE_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "resilience_rejections_total",
        "Total number of calls rejected before reaching the operation",
        &["unit", "reason"]
    )
    .expect("Failed to register rejections metric")
});

/// Metrics collector for circuit breaker transitions
#[cfg(feature = "metrics")]
pub struct CircuitBreakerMetrics;

#[cfg(feature = "metrics")]
impl CircuitBreakerMetrics {
    pub fn record_state_transition(unit: &str, from: &str, to: &str) {
        RESILIENCE_STATE_TRANSITIONS
            .with_label_values(&[unit, from, to])
            .inc();
    }
}

/// Metrics collector for facade outcomes
#[cfg(feature = "metrics")]
pub struct FacadeMetrics;

#[cfg(feature = "metrics")]
impl FacadeMetrics {
    pub fn record_call(unit: &str, result: &str) {
        RESILIENCE_CALLS.with_label_values(&[unit, result]).inc();
    }

    pub fn record_rejection(unit: &str, reason: &str) {
        RESILIENCE_REJECTIONS
            .with_label_values(&[unit, reason])
            .inc();
    }
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub struct CircuitBreakerMetrics;

#[cfg(not(feature = "metrics"))]
impl CircuitBreakerMetrics {
    pub fn record_state_transition(_unit: &str, _from: &str, _to: &str) {}
}

#[cfg(not(feature = "metrics"))]
pub struct FacadeMetrics;

#[cfg(not(feature = "metrics"))]
impl FacadeMetrics {
    pub fn record_call(_unit: &str, _result: &str) {}
    pub fn record_rejection(_unit: &str, _reason: &str) {}
}
