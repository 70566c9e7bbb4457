/// Preset configurations for common dependency classes
use crate::bulkhead::BulkheadConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Fixed-window budget for a unit, applied when the caller passes a
/// rate-limit key
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Admissions per key per window
    pub limit: u32,
    /// Window duration
    pub window: Duration,
}

/// Configuration bundle for one resilience unit
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub bulkhead: BulkheadConfig,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            bulkhead: BulkheadConfig::default(),
            rate_limit: None,
        }
    }
}

/// Database queries (PostgreSQL, MySQL)
///
/// - Circuit breaker: 10 failures, 30s cooldown (more tolerant; transient
///   lock contention should not trip it)
/// - Bulkhead: 20 concurrent, queue of 10 (pool-sized, fast operations)
/// - No rate limit
pub fn database_config() -> UnitConfig {
    UnitConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 10,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        },
        bulkhead: BulkheadConfig {
            max_concurrency: 20,
            max_queue_depth: 10,
            queue_timeout: Some(Duration::from_secs(5)),
        },
        rate_limit: None,
    }
}

/// gRPC service calls (internal microservices)
///
/// - Circuit breaker: 5 failures, 60s cooldown
/// - Bulkhead: 50 concurrent, queue of 25 (fast in-process network calls)
/// - No rate limit
pub fn grpc_config() -> UnitConfig {
    UnitConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(60),
        },
        bulkhead: BulkheadConfig {
            max_concurrency: 50,
            max_queue_depth: 25,
            queue_timeout: Some(Duration::from_secs(10)),
        },
        rate_limit: None,
    }
}

/// Redis/Cache operations
///
/// - Circuit breaker: 3 failures, 15s cooldown (cache should fail fast)
/// - Bulkhead: 30 concurrent, queue of 15
/// - No rate limit
pub fn redis_config() -> UnitConfig {
    UnitConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(15),
        },
        bulkhead: BulkheadConfig {
            max_concurrency: 30,
            max_queue_depth: 15,
            queue_timeout: Some(Duration::from_secs(2)),
        },
        rate_limit: None,
    }
}

/// External HTTP APIs (third-party services)
///
/// - Circuit breaker: 5 failures, 120s cooldown (external outages last)
/// - Bulkhead: 8 concurrent, queue of 4 (slow calls must not hog capacity)
/// - Rate limit: 50 per 10s per key (protects partner API quotas)
pub fn http_external_config() -> UnitConfig {
    UnitConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(120),
        },
        bulkhead: BulkheadConfig {
            max_concurrency: 8,
            max_queue_depth: 4,
            queue_timeout: Some(Duration::from_secs(30)),
        },
        rate_limit: Some(RateLimitConfig {
            limit: 50,
            window: Duration::from_secs(10),
        }),
    }
}

/// Kafka producer operations
///
/// - Circuit breaker: 5 failures, 30s cooldown
/// - Bulkhead: 16 concurrent, queue of 8
/// - No rate limit
pub fn kafka_config() -> UnitConfig {
    UnitConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        },
        bulkhead: BulkheadConfig {
            max_concurrency: 16,
            max_queue_depth: 8,
            queue_timeout: Some(Duration::from_secs(5)),
        },
        rate_limit: None,
    }
}

/// Static mapping from unit name to configuration, supplied at startup
///
/// Unnamed units fall back to `defaults`.
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub defaults: UnitConfig,
    pub units: HashMap<String, UnitConfig>,
}

impl ResilienceConfig {
    pub fn new(defaults: UnitConfig) -> Self {
        Self {
            defaults,
            units: HashMap::new(),
        }
    }

    /// Register a per-unit override
    pub fn with_unit(mut self, name: impl Into<String>, config: UnitConfig) -> Self {
        self.units.insert(name.into(), config);
        self
    }

    /// Effective configuration for `name`
    pub fn unit(&self, name: &str) -> &UnitConfig {
        self.units.get(name).unwrap_or(&self.defaults)
    }
}
