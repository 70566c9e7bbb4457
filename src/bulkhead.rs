/// Bulkhead isolation: bounded-concurrency pools per dependency class
///
/// Each named pool caps how many operations run at once and how many
/// callers may wait for a slot. Saturation in one dependency cannot exhaust
/// capacity needed by an unrelated one. Admission is a pure function of
/// current occupancy and the configured bounds: admit while a slot is free,
/// queue FIFO while the backlog has room, reject otherwise.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum operations in flight at once
    pub max_concurrency: usize,
    /// Maximum callers waiting for a slot before rejection
    pub max_queue_depth: usize,
    /// Bound on how long a queued caller waits; None waits until a slot frees
    pub queue_timeout: Option<Duration>,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            max_queue_depth: 16,
            queue_timeout: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BulkheadError {
    #[error("bulkhead '{0}' is saturated - request rejected")]
    Overflow(String),
}

pub struct BulkheadPool {
    name: String,
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    queued: AtomicUsize,
}

/// Slot held by an admitted caller; dropping it frees the slot on every
/// exit path, including panics
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

/// Occupancy view for health data
#[derive(Debug, Clone)]
pub struct BulkheadOccupancy {
    pub max_concurrency: usize,
    pub max_queue_depth: usize,
    pub in_flight: usize,
    pub queued: usize,
}

// Decrements the waiter count when the caller leaves the queue, whether it
// acquired a slot, timed out, or was cancelled.
struct QueueSlot<'a>(&'a AtomicUsize);

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BulkheadPool {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        let permits = config.max_concurrency;
        Self {
            name: name.into(),
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operations currently holding a slot
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrency - self.semaphore.available_permits()
    }

    /// Callers currently waiting for a slot
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn occupancy(&self) -> BulkheadOccupancy {
        BulkheadOccupancy {
            max_concurrency: self.config.max_concurrency,
            max_queue_depth: self.config.max_queue_depth,
            in_flight: self.in_flight(),
            queued: self.queued(),
        }
    }

    /// Acquire a slot, queueing within the configured backlog bound
    ///
    /// Rejects immediately with [`BulkheadError::Overflow`] when both the
    /// pool and its queue are full, and after `queue_timeout` for a queued
    /// caller that never got a slot.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadError> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                debug!(pool = %self.name, "Bulkhead slot acquired");
                return Ok(BulkheadPermit { _permit: permit });
            }
            Err(TryAcquireError::Closed) => {
                return Err(BulkheadError::Overflow(self.name.clone()));
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        // Reserve a queue position atomically against the depth bound
        let reserved = self.queued.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |queued| {
            (queued < self.config.max_queue_depth).then_some(queued + 1)
        });
        if reserved.is_err() {
            warn!(pool = %self.name, "Bulkhead queue full - rejecting");
            return Err(BulkheadError::Overflow(self.name.clone()));
        }
        let _slot = QueueSlot(&self.queued);

        // Semaphore waiters are served FIFO, so queued work keeps arrival order
        let acquired = match self.config.queue_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.semaphore.clone().acquire_owned()).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(pool = %self.name, "Bulkhead queue wait timed out - rejecting");
                        return Err(BulkheadError::Overflow(self.name.clone()));
                    }
                }
            }
            None => self.semaphore.clone().acquire_owned().await,
        };

        match acquired {
            Ok(permit) => Ok(BulkheadPermit { _permit: permit }),
            Err(_) => Err(BulkheadError::Overflow(self.name.clone())),
        }
    }

    /// Run `work` inside a slot; the slot is released when `work` finishes
    pub async fn run<F, Fut, T>(&self, work: F) -> Result<T, BulkheadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        Ok(work().await)
    }
}

/// Named bulkhead pools, created lazily and shared for the process lifetime
pub struct BulkheadRegistry {
    pools: RwLock<HashMap<String, Arc<BulkheadPool>>>,
    defaults: BulkheadConfig,
}

impl BulkheadRegistry {
    pub fn new(defaults: BulkheadConfig) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            defaults,
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<BulkheadPool> {
        self.get_or_create_with(name, self.defaults.clone())
    }

    pub fn get_or_create_with(&self, name: &str, config: BulkheadConfig) -> Arc<BulkheadPool> {
        if let Some(pool) = self.pools.read().get(name) {
            return pool.clone();
        }

        let mut pools = self.pools.write();
        pools
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(pool = name, "Creating bulkhead pool");
                Arc::new(BulkheadPool::new(name, config))
            })
            .clone()
    }

    /// Occupancy of every known pool
    pub fn occupancy_snapshot(&self) -> HashMap<String, BulkheadOccupancy> {
        let pools = self.pools.read();
        pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.occupancy()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    fn pool(max_concurrency: usize, max_queue_depth: usize) -> Arc<BulkheadPool> {
        Arc::new(BulkheadPool::new(
            "test",
            BulkheadConfig {
                max_concurrency,
                max_queue_depth,
                queue_timeout: None,
            },
        ))
    }

    #[tokio::test]
    async fn test_rejects_beyond_capacity_with_empty_queue() {
        let pool = pool(2, 0);

        let first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
        assert_eq!(pool.in_flight(), 2);

        // Third concurrent submission is rejected, not queued
        let result = pool.acquire().await;
        assert!(matches!(result, Err(BulkheadError::Overflow(_))));

        // Releasing one slot admits exactly one more
        drop(first);
        let _third = pool.acquire().await.unwrap();
        assert_eq!(pool.in_flight(), 2);
        assert!(matches!(pool.acquire().await, Err(BulkheadError::Overflow(_))));
    }

    #[tokio::test]
    async fn test_queued_caller_runs_when_slot_frees() {
        let pool = pool(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let occupant = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(|| async {
                    release_rx.await.unwrap();
                })
                .await
                .unwrap();
            })
        };

        // Wait until the occupant holds the only slot
        while pool.in_flight() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let queued = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.run(|| async { 42 }).await })
        };

        // The queued caller waits rather than being rejected
        while pool.queued() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        release_tx.send(()).unwrap();
        occupant.await.unwrap();
        assert_eq!(queued.await.unwrap().unwrap(), 42);
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_queue_depth_bound_rejects_excess_waiters() {
        let pool = pool(1, 1);

        let _held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        while pool.queued() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Queue holds one waiter already; the next submission overflows
        let result = pool.acquire().await;
        assert!(matches!(result, Err(BulkheadError::Overflow(_))));

        waiter.abort();
    }

    #[tokio::test]
    async fn test_queue_wait_is_time_boxed() {
        let pool = Arc::new(BulkheadPool::new(
            "timed",
            BulkheadConfig {
                max_concurrency: 1,
                max_queue_depth: 4,
                queue_timeout: Some(Duration::from_millis(50)),
            },
        ));

        let _held = pool.acquire().await.unwrap();

        let start = std::time::Instant::now();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(BulkheadError::Overflow(_))));
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_slot_released_on_work_panic() {
        let pool = pool(1, 0);

        let task = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.run(|| async { panic!("work blew up") }).await
            })
        };
        assert!(task.await.is_err());

        // The slot freed despite the panic
        let _permit = pool.acquire().await.unwrap();
    }

    #[tokio::test]
    async fn test_registry_shares_pools_by_name() {
        let registry = BulkheadRegistry::new(BulkheadConfig::default());

        let a = registry.get_or_create("db");
        let b = registry.get_or_create("db");
        let c = registry.get_or_create("api");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));

        let snapshot = registry.occupancy_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["db"].in_flight, 0);
        assert_eq!(snapshot["db"].max_concurrency, 16);
    }
}
