use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};

use crate::BucketError;

/// A leaky bucket with continuous refill.
///
/// `capacity` bounds the burst; `refill_per_second` is the sustained rate.
/// Refill is computed lazily from elapsed time, so the bucket does no work
/// while idle. Requests larger than the capacity are allowed through once
/// the bucket is full by draining it negative (the "cheat" drain) — the
/// debt is paid back by subsequent refill, so a single oversized request
/// cannot starve forever but still costs its full token count.
pub struct Bucket {
    state: Mutex<State>,
}

struct State {
    available: f64,
    capacity: f64,
    refill_per_second: f64,
    last_refill: Instant,
    depleted: bool,
}

impl State {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.available = (self.available + elapsed * self.refill_per_second).min(self.capacity);
        self.last_refill = now;

        if self.depleted && self.available >= 0.0 {
            self.depleted = false;
        }
    }
}

impl Bucket {
    /// A full bucket with the given burst capacity and refill rate.
    pub fn new(capacity: f64, refill_per_second: f64) -> Self {
        Self {
            state: Mutex::new(State {
                available: capacity,
                capacity,
                refill_per_second,
                last_refill: Instant::now(),
                depleted: false,
            }),
        }
    }

    /// Tokens currently available.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        state.refill();
        state.available
    }

    /// Whether the last acquire drained the bucket past zero.
    pub async fn is_depleted(&self) -> bool {
        let mut state = self.state.lock().await;
        state.refill();
        state.depleted
    }

    /// Time until `n` tokens are available. Zero when they already are.
    pub async fn wait_time(&self, n: f64) -> Duration {
        let mut state = self.state.lock().await;
        state.refill();

        // Oversized requests wait for a full bucket, then cheat.
        let needed = n.min(state.capacity) - state.available;

        if needed <= 0.0 {
            return Duration::ZERO;
        }

        if state.refill_per_second <= 0.0 {
            return Duration::MAX;
        }

        Duration::from_secs_f64(needed / state.refill_per_second)
    }

    /// Block until `n` tokens are available, then take them.
    ///
    /// When `n` exceeds the capacity the bucket waits until full, takes
    /// everything and goes negative, marking itself depleted until the
    /// refill catches up.
    pub async fn acquire(&self, n: f64) -> Result<(), BucketError> {
        if n <= 0.0 {
            return Ok(());
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                state.refill();

                let target = n.min(state.capacity);

                if state.available >= target {
                    state.available -= n;

                    if state.available < 0.0 {
                        state.depleted = true;
                        log::warn!(
                            "Bucket cheat drain: request of {n} exceeds capacity {}; bucket owes {}",
                            state.capacity,
                            -state.available
                        );
                    }

                    return Ok(());
                }

                if state.refill_per_second <= 0.0 {
                    return Err(BucketError::NoRefill {
                        requested: n,
                        capacity: state.capacity,
                    });
                }

                Duration::from_secs_f64((target - state.available) / state.refill_per_second)
            };

            tokio::time::sleep(wait).await;
        }
    }

    /// Replace the capacity and refill rate. Available tokens are clamped
    /// to the new capacity; waiters pick up the new rate on their next
    /// refill.
    pub async fn set_limits(&self, capacity: f64, refill_per_second: f64) {
        let mut state = self.state.lock().await;

        state.refill();
        state.capacity = capacity;
        state.refill_per_second = refill_per_second;
        state.available = state.available.min(capacity);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::Arc,
        time::Duration,
    };

    use super::Bucket;

    #[tokio::test(start_paused = true)]
    async fn burst_then_refill() {
        let bucket = Bucket::new(10.0, 10.0);

        // The full burst is available immediately.
        bucket.acquire(10.0).await.unwrap();
        assert_eq!(bucket.available().await, 0.0);

        // 5 more tokens need 500ms of refill.
        let before = tokio::time::Instant::now();
        bucket.acquire(5.0).await.unwrap();
        let elapsed = before.elapsed();

        assert!(elapsed >= Duration::from_millis(499), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(600), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_time_reports_refill_horizon() {
        let bucket = Bucket::new(10.0, 10.0);
        bucket.acquire(10.0).await.unwrap();

        let wait = bucket.wait_time(5.0).await;
        assert!(wait >= Duration::from_millis(499) && wait <= Duration::from_millis(501), "{wait:?}");

        assert_eq!(bucket.wait_time(0.0).await, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_request_cheats_once_full() {
        let bucket = Bucket::new(10.0, 10.0);
        bucket.acquire(6.0).await.unwrap();

        // 25 tokens can never fit in a 10-token bucket: wait for full,
        // drain negative.
        let before = tokio::time::Instant::now();
        bucket.acquire(25.0).await.unwrap();

        // Needed 10 - 4 = 6 tokens of refill at 10/s.
        assert!(before.elapsed() >= Duration::from_millis(599));
        assert!(bucket.is_depleted().await);
        assert!(bucket.available().await < 0.0);

        // The debt delays the next acquire by (15 + 1) / 10 seconds.
        let before = tokio::time::Instant::now();
        bucket.acquire(1.0).await.unwrap();
        assert!(before.elapsed() >= Duration::from_millis(1599));
        assert!(!bucket.is_depleted().await);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_refill_fails_oversized_acquires() {
        let bucket = Bucket::new(5.0, 0.0);

        bucket.acquire(5.0).await.unwrap();
        assert!(bucket.acquire(1.0).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn contended_issuance_respects_the_rate() {
        // 40 workers × 5 tokens against capacity 10 at 10 tokens/s:
        // total issuance time is at least (200 - 10) / 10 = 19 s.
        let bucket = Arc::new(Bucket::new(10.0, 10.0));
        let before = tokio::time::Instant::now();

        let mut handles = Vec::new();
        for _ in 0..40 {
            let bucket = bucket.clone();
            handles.push(tokio::spawn(async move { bucket.acquire(5.0).await }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let elapsed = before.elapsed();
        assert!(elapsed >= Duration::from_secs(19), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(25), "{elapsed:?}");
    }
}
