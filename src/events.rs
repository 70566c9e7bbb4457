/// Structured observability events emitted by the resilience layer
///
/// Every success, failure, rejection, and circuit state transition is
/// reported as a [`ResilienceEvent`] keyed by unit name. The sink that
/// receives them is a collaborator: dashboards, alerting pipelines, or the
/// default tracing-backed sink provided here.
use crate::circuit_breaker::CircuitState;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Why a call was rejected before the operation ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    /// The unit's circuit breaker is open
    CircuitOpen,
    /// The unit's bulkhead is saturated (no slot, queue full or timed out)
    BulkheadOverflow,
    /// The caller's rate-limit key exhausted its window budget
    RateLimited,
}

impl RejectionReason {
    /// Stable label for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::CircuitOpen => "circuit_open",
            RejectionReason::BulkheadOverflow => "bulkhead_overflow",
            RejectionReason::RateLimited => "rate_limited",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The wrapped operation completed successfully
    Success,
    /// The wrapped operation raised and the failure was recorded
    Failure,
    /// A circuit breaker moved along one FSM edge
    StateTransition {
        from: CircuitState,
        to: CircuitState,
    },
    /// A call was rejected before reaching the operation
    Rejection { reason: RejectionReason },
}

/// One observability event, keyed by resilience-unit name
#[derive(Debug, Clone)]
pub struct ResilienceEvent {
    pub unit: String,
    pub kind: EventKind,
    pub timestamp: SystemTime,
}

impl ResilienceEvent {
    pub fn now(unit: &str, kind: EventKind) -> Self {
        Self {
            unit: unit.to_string(),
            kind,
            timestamp: SystemTime::now(),
        }
    }
}

/// Receives resilience events; implementations live outside this crate
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ResilienceEvent);
}

/// Default sink: structured tracing output
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ResilienceEvent) {
        match event.kind {
            EventKind::Success => {
                debug!(unit = %event.unit, "Operation succeeded");
            }
            EventKind::Failure => {
                warn!(unit = %event.unit, "Operation failed");
            }
            EventKind::StateTransition { from, to } => {
                if to == CircuitState::Open {
                    warn!(unit = %event.unit, "Circuit breaker: {} → {}", from, to);
                } else {
                    info!(unit = %event.unit, "Circuit breaker: {} → {}", from, to);
                }
            }
            EventKind::Rejection { reason } => {
                warn!(unit = %event.unit, reason = reason.as_str(), "Call rejected");
            }
        }
    }
}

/// Discards all events; useful in tests
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ResilienceEvent) {}
}

/// Test sink that records everything it receives
#[cfg(test)]
pub(crate) struct RecordingSink {
    pub(crate) events: parking_lot::Mutex<Vec<ResilienceEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            events: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn emit(&self, event: ResilienceEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reason_labels() {
        assert_eq!(RejectionReason::CircuitOpen.as_str(), "circuit_open");
        assert_eq!(RejectionReason::BulkheadOverflow.as_str(), "bulkhead_overflow");
        assert_eq!(RejectionReason::RateLimited.as_str(), "rate_limited");
    }

    #[test]
    fn test_recording_sink_captures_events() {
        let sink = RecordingSink::new();
        sink.emit(ResilienceEvent::now("db", EventKind::Success));
        sink.emit(ResilienceEvent::now(
            "db",
            EventKind::Rejection {
                reason: RejectionReason::RateLimited,
            },
        ));

        let events = sink.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].unit, "db");
        assert!(matches!(events[1].kind, EventKind::Rejection { .. }));
    }
}
