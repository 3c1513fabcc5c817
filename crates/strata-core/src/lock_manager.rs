//! Stripe-based per-key locking for the loader's read-compare-write
//! sequence.
//!
//! Business keys are hashed to a fixed set of stripes; loader workers
//! on disjoint keys proceed without contention, workers on the same
//! key (or a colliding stripe) serialize. Acquisition is timeout-based
//! so a stuck worker surfaces as `LockTimeout` instead of blocking a
//! batch forever.

use crate::error::{Result, StrataError};
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;
use xxhash_rust::xxh3::xxh3_64;

/// Default lock acquisition timeout (5 seconds)
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

pub struct LockManager {
    stripes: Vec<Mutex<()>>,
    num_stripes: usize,
    default_timeout: Duration,
}

/// Holds one stripe lock; released on drop.
pub struct KeyLockGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl LockManager {
    /// # Panics
    ///
    /// Panics if `num_stripes` is 0.
    pub fn new(num_stripes: usize, default_timeout: Duration) -> Self {
        assert!(num_stripes > 0, "num_stripes must be positive");
        let stripes = (0..num_stripes).map(|_| Mutex::new(())).collect();

        Self {
            stripes,
            num_stripes,
            default_timeout,
        }
    }

    pub fn with_stripes(num_stripes: usize) -> Self {
        Self::new(num_stripes, Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS))
    }

    fn stripe_index(&self, key: &str) -> usize {
        let hash = xxh3_64(key.as_bytes());
        (hash as usize) % self.num_stripes
    }

    /// Acquire the stripe lock for a business key.
    pub fn lock(&self, key: &str) -> Result<KeyLockGuard<'_>> {
        self.lock_with_timeout(key, self.default_timeout)
    }

    pub fn lock_with_timeout(&self, key: &str, timeout: Duration) -> Result<KeyLockGuard<'_>> {
        let idx = self.stripe_index(key);
        match self.stripes[idx].try_lock_for(timeout) {
            Some(guard) => Ok(KeyLockGuard { _guard: guard }),
            None => Err(StrataError::LockTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    pub fn num_stripes(&self) -> usize {
        self.num_stripes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_same_key_same_stripe() {
        let lm = LockManager::with_stripes(256);
        assert_eq!(lm.stripe_index("order-1"), lm.stripe_index("order-1"));
        assert!(lm.stripe_index("order-2") < 256);
    }

    #[test]
    fn test_lock_and_release() {
        let lm = LockManager::with_stripes(256);
        {
            let _guard = lm.lock("order-1").unwrap();
        }
        // Released on drop, reacquirable.
        let _guard = lm.lock("order-1").unwrap();
    }

    #[test]
    fn test_contended_key_times_out() {
        let lm = Arc::new(LockManager::new(1, Duration::from_millis(50)));
        let _guard = lm.lock("order-1").unwrap();

        let lm2 = lm.clone();
        let handle = thread::spawn(move || {
            matches!(
                lm2.lock("order-2"),
                Err(StrataError::LockTimeout { .. })
            )
        });

        assert!(handle.join().unwrap(), "should have timed out");
    }

    #[test]
    fn test_disjoint_keys_proceed_concurrently() {
        let lm = Arc::new(LockManager::with_stripes(256));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let lm = lm.clone();
                thread::spawn(move || {
                    let key = format!("order-{}", i);
                    let _guard = lm.lock(&key).unwrap();
                    thread::sleep(Duration::from_millis(5));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
