use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Token bucket governing how fast a resource may be called.
///
/// Refill is lazy: tokens accrue on acquire based on elapsed time, capped at
/// `capacity`. When the bucket is empty, `acquire` suspends the calling task
/// until the next token accrues; it never busy-waits and never blocks an OS
/// thread.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_per_sec: f64,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
    /// Requests issued in the current 1s window; reset lazily on the first
    /// acquire after the window has elapsed.
    window_count: u32,
    window_start: Instant,
}

impl TokenBucket {
    /// Bucket sized for `rps` requests per second with burst equal to `rps`.
    pub fn per_second(rps: u32) -> Self {
        Self::new(rps.max(1) as f64, rps.max(1) as f64)
    }

    /// Bucket sized for `ops` operations per minute.
    pub fn per_minute(ops: u32) -> Self {
        Self::new(ops.max(1) as f64, ops.max(1) as f64 / 60.0)
    }

    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                window_count: 0,
                window_start: Instant::now(),
            }),
            capacity,
            refill_per_sec,
        }
    }

    /// Take one token, suspending until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    if state.window_start.elapsed() >= Duration::from_secs(1) {
                        state.window_count = 0;
                        state.window_start = Instant::now();
                    }
                    state.window_count += 1;
                    return;
                }

                // Time until one full token accrues.
                let deficit = 1.0 - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Requests issued inside the current 1s window.
    pub async fn window_count(&self) -> u32 {
        let state = self.state.lock().await;
        if state.window_start.elapsed() >= Duration::from_secs(1) {
            0
        } else {
            state.window_count
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
            state.last_refill = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_up_to_capacity_is_immediate() {
        let bucket = TokenBucket::per_second(5);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(bucket.window_count().await, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sixth_request_waits_for_refill() {
        let bucket = TokenBucket::per_second(5);
        for _ in 0..5 {
            bucket.acquire().await;
        }
        let start = Instant::now();
        bucket.acquire().await;
        // One token accrues every 200ms at 5 rps.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_one_second() {
        let bucket = TokenBucket::per_second(10);
        bucket.acquire().await;
        bucket.acquire().await;
        assert_eq!(bucket.window_count().await, 2);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(bucket.window_count().await, 0);

        bucket.acquire().await;
        assert_eq!(bucket.window_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_minute_refill_rate() {
        let bucket = TokenBucket::per_minute(60);
        for _ in 0..60 {
            bucket.acquire().await;
        }
        let start = Instant::now();
        bucket.acquire().await;
        // 60/min is one token per second.
        assert!(start.elapsed() >= Duration::from_millis(900));
    }
}
