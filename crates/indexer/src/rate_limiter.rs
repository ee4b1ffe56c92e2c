use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Per-endpoint token bucket gating outbound RPC calls.
///
/// Adapted from a per-IP HTTP request tracker to per-endpoint outbound
/// throttling: one bucket per `RpcAdapter`, refilled continuously rather
/// than reset on a fixed window boundary, so a caller never has to wait
/// a full window just because it arrived a moment after the edge.
pub struct RateLimiter {
    state: Mutex<BucketState>,
    capacity: u32,
    refill_per_sec: u32,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new(requests_per_sec: u32) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: requests_per_sec as f64,
                last_refill: Instant::now(),
            }),
            capacity: requests_per_sec,
            refill_per_sec: requests_per_sec,
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        let refilled = elapsed * self.refill_per_sec as f64;
        state.tokens = (state.tokens + refilled).min(self.capacity as f64);
        state.last_refill = Instant::now();
    }

    /// Returns `None` if a token was available (and consumes it), or
    /// `Some(wait)` telling the caller how long to sleep before retrying.
    fn try_acquire(&self) -> Option<Duration> {
        let mut state = self.state.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - state.tokens;
            Some(Duration::from_secs_f64(deficit / self.refill_per_sec as f64))
        }
    }

    /// Blocks (async) until a token is available, then consumes it.
    pub async fn acquire(&self) {
        loop {
            match self.try_acquire() {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_burst_up_to_capacity() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.try_acquire().is_none());
        }
        assert!(limiter.try_acquire().is_some());
    }

    #[tokio::test]
    async fn refills_over_time() {
        let limiter = RateLimiter::new(100);
        for _ in 0..100 {
            limiter.try_acquire();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(limiter.try_acquire().is_none());
    }
}
