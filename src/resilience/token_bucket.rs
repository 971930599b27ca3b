//! Token bucket rate limiter.
//!
//! Allows `rate_per_second` acquisitions per second on average with bursts of up
//! to `burst`. Refill is computed lazily from elapsed time on each acquisition.

use std::time::Instant;

use parking_lot::Mutex;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

pub struct TokenBucket {
    rate_per_second: f64,
    capacity: f64,
    bucket: Mutex<Bucket>,
}

impl TokenBucket {
    /// A bucket starts full. `rate_per_second == 0` never refills; `burst == 0`
    /// admits nothing.
    pub fn new(rate_per_second: u32, burst: u32) -> Self {
        Self {
            rate_per_second: f64::from(rate_per_second),
            capacity: f64::from(burst),
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Takes one token if available. Never blocks.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available.
    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate_per_second).min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_acquires_up_to_burst() {
        let bucket = TokenBucket::new(0, 3);
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_zero_burst_admits_nothing() {
        let bucket = TokenBucket::new(100, 0);
        assert!(!bucket.try_acquire());
    }

    #[test]
    fn test_refills_over_time() {
        let bucket = TokenBucket::new(100, 1);
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
        std::thread::sleep(Duration::from_millis(30));
        assert!(bucket.try_acquire());
    }

    #[test]
    fn test_concurrent_callers_never_overdraw() {
        let bucket = Arc::new(TokenBucket::new(0, 50));
        let granted = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = bucket.clone();
                let granted = granted.clone();
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        if bucket.try_acquire() {
                            granted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(granted.load(Ordering::Relaxed), 50);
    }
}
