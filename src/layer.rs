/// Tower Layer integration for composable resilience
///
/// Wraps any Tower service so every request runs through the facade under a
/// named unit: rate limiting is skipped (no per-request key at this layer),
/// the breaker and bulkhead apply as configured for the unit.
use crate::facade::{ResilienceError, ResilienceFacade};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Resilience layer for Tower services
#[derive(Clone)]
pub struct ResilienceLayer {
    facade: Arc<ResilienceFacade>,
    unit: String,
}

impl ResilienceLayer {
    pub fn new(facade: Arc<ResilienceFacade>, unit: impl Into<String>) -> Self {
        Self {
            facade,
            unit: unit.into(),
        }
    }
}

impl<S> Layer<S> for ResilienceLayer {
    type Service = ResilienceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ResilienceService {
            inner: service,
            facade: self.facade.clone(),
            unit: self.unit.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ResilienceService<S> {
    inner: S,
    facade: Arc<ResilienceFacade>,
    unit: String,
}

impl<S, Request> Service<Request> for ResilienceService<S>
where
    S: Service<Request> + Clone + Send + 'static,
    S::Response: Send,
    S::Future: Send,
    S::Error: std::fmt::Display,
    Request: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError<String>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let unit = self.unit.clone();
        self.inner.poll_ready(cx).map_err(|e| ResilienceError::Operation {
            unit,
            cause: e.to_string(),
        })
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let facade = self.facade.clone();
        let unit = self.unit.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            facade
                .run(&unit, || async {
                    inner.call(req).await.map_err(|e| e.to_string())
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::presets::{ResilienceConfig, UnitConfig};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::ServiceExt;

    #[derive(Clone)]
    struct MockService {
        counter: Arc<AtomicU32>,
        fail_until: u32,
    }

    impl Service<()> for MockService {
        type Response = String;
        type Error = String;
        type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ()) -> Self::Future {
            let count = self.counter.fetch_add(1, Ordering::SeqCst);
            let fail_until = self.fail_until;

            Box::pin(async move {
                if count < fail_until {
                    Err("Service error".to_string())
                } else {
                    Ok("Success".to_string())
                }
            })
        }
    }

    #[tokio::test]
    async fn test_layer_opens_circuit_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let mock_service = MockService {
            counter: counter.clone(),
            fail_until: 10,
        };

        let config = ResilienceConfig::new(UnitConfig::default()).with_unit(
            "mock",
            UnitConfig {
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: 2,
                    ..Default::default()
                },
                ..UnitConfig::default()
            },
        );
        let facade = Arc::new(ResilienceFacade::new(config));
        let layer = ResilienceLayer::new(facade, "mock");

        let mut service = layer.layer(mock_service);

        // First 2 calls fail and trip the breaker
        let _ = service.ready().await.unwrap().call(()).await;
        let _ = service.ready().await.unwrap().call(()).await;

        // Circuit should be open now; the inner service is not called again
        let result = service.ready().await.unwrap().call(()).await;
        assert!(matches!(result, Err(ResilienceError::CircuitOpen { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_layer_passes_responses_through() {
        let mock_service = MockService {
            counter: Arc::new(AtomicU32::new(0)),
            fail_until: 0,
        };

        let facade = Arc::new(ResilienceFacade::new(ResilienceConfig::default()));
        let mut service = ResilienceLayer::new(facade, "mock").layer(mock_service);

        let result = service.ready().await.unwrap().call(()).await;
        assert_eq!(result.unwrap(), "Success");
    }
}
