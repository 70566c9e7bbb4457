/// Fixed-window rate limiting, keyed by caller-chosen limiter keys
///
/// Counting is fixed-window, not sliding: the counter resets at aligned
/// window boundaries. This accepts the known artifact of up to 2x the limit
/// admitted across a boundary in exchange for O(1) state per key - a
/// documented trade-off, not a bug.
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

struct WindowSlot {
    window_id: u64,
    count: u32,
    touched: Instant,
}

pub struct RateLimiter {
    started: Instant,
    /// Map insertion takes the write lock; counting a known key only takes
    /// the read lock plus that key's own mutex
    slots: RwLock<HashMap<String, Arc<Mutex<WindowSlot>>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Admit `key` iff its count in the current window is below `limit`
    ///
    /// Reads and increments the counter atomically under the key's lock.
    /// A slot left over from an elapsed window is overwritten on first
    /// touch, so stale windows are reclaimed lazily rather than scanned.
    pub fn allow(&self, key: &str, limit: u32, window: Duration) -> bool {
        if window.is_zero() {
            return true;
        }
        let window_id = (self.started.elapsed().as_nanos() / window.as_nanos()) as u64;

        let slot = self.slot_for(key, window_id);
        let mut slot = slot.lock();
        if slot.window_id != window_id {
            slot.window_id = window_id;
            slot.count = 0;
        }
        slot.touched = Instant::now();

        if slot.count >= limit {
            debug!(key, limit, "Rate limit window exhausted");
            return false;
        }
        slot.count += 1;
        true
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.slots.read().len()
    }

    /// Drop keys untouched for longer than `max_age`; bounds memory for
    /// short-lived keys (per-tenant, per-session) that stop arriving
    pub fn purge_stale(&self, max_age: Duration) -> usize {
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| slot.lock().touched.elapsed() < max_age);
        before - slots.len()
    }

    fn slot_for(&self, key: &str, window_id: u64) -> Arc<Mutex<WindowSlot>> {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }

        let mut slots = self.slots.write();
        slots
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(WindowSlot {
                    window_id,
                    count: 0,
                    touched: Instant::now(),
                }))
            })
            .clone()
    }
}
