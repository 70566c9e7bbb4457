/// Fault-isolation layer for microservices
///
/// This library provides the resilience infrastructure every business
/// service calls through before touching a downstream dependency:
/// - **Circuit Breaker**: per-dependency fault detector with timed automatic
///   recovery; fails fast when a dependency is down
/// - **Circuit Breaker Registry**: process-wide named breakers with lazy
///   creation, health snapshots, background recovery sweep, idle eviction
/// - **Bulkhead**: bounded-concurrency pools with a bounded FIFO backlog, so
///   one saturated dependency cannot exhaust capacity needed by another
/// - **Rate Limiter**: fixed-window per-key admission control
/// - **Facade**: the single composed entry point - rate limit, breaker
///   check, bulkhead slot, execute, record
/// - **Tower Layer**: composable middleware for Tower-based clients
/// - **Preset Configurations**: pre-tuned settings for Database, gRPC,
///   Redis, external HTTP, Kafka
///
/// # Example: running work under a named unit
///
/// ```rust,no_run
/// use resilience::{presets, ResilienceConfig, ResilienceFacade};
///
/// #[tokio::main]
/// async fn main() {
///     let config = ResilienceConfig::default()
///         .with_unit("db", presets::database_config())
///         .with_unit("partner-api", presets::http_external_config());
///     let facade = ResilienceFacade::new(config);
///     let _tasks = facade.spawn_background_tasks();
///
///     let result = facade.run("db", || async {
///         // Your database query here
///         Ok::<_, String>(())
///     }).await;
/// }
/// ```
///
/// # Example: fallback while the circuit is open
///
/// ```rust,no_run
/// use resilience::{ResilienceConfig, ResilienceFacade};
///
/// #[tokio::main]
/// async fn main() {
///     let facade = ResilienceFacade::new(ResilienceConfig::default());
///
///     let _feed = facade.run_with_fallback(
///         "personalization",
///         || async { Ok::<_, String>(vec!["ranked"]) },
///         || async { vec!["chronological"] },
///     ).await;
/// }
/// ```

pub mod bulkhead;
pub mod circuit_breaker;
pub mod events;
pub mod facade;
pub mod layer;
pub mod metrics;
pub mod presets;
pub mod rate_limiter;
pub mod registry;

// Re-export main types for convenience
pub use bulkhead::{BulkheadConfig, BulkheadError, BulkheadOccupancy, BulkheadPool, BulkheadRegistry};
pub use circuit_breaker::{
    BreakerHealth, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use events::{EventKind, EventSink, RejectionReason, ResilienceEvent, TracingSink};
pub use facade::{ResilienceError, ResilienceFacade};
pub use layer::{ResilienceLayer, ResilienceService};
pub use presets::{
    database_config, grpc_config, http_external_config, kafka_config, redis_config,
    RateLimitConfig, ResilienceConfig, UnitConfig,
};
pub use rate_limiter::RateLimiter;
pub use registry::CircuitBreakerRegistry;
