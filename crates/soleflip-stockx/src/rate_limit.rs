//! Process-wide request rate limiting for the `StockX` API.
//!
//! A token bucket of `capacity` permits where each permit returns to the
//! bucket exactly one `period` after it was taken. Tracking issue instants
//! rather than a fractional refill counter means no window of length
//! `period` ever sees more than `capacity` requests, including the burst
//! that follows an idle stretch.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    period: Duration,
    issued: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `capacity` permits per `period`.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn new(capacity: u32, period: Duration) -> Self {
        let capacity = usize::try_from(capacity.max(1)).unwrap_or(usize::MAX);
        Self {
            capacity,
            period,
            issued: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Waits until a permit is available and takes it.
    ///
    /// The internal lock is held while sleeping, and `tokio::sync::Mutex`
    /// queues waiters in arrival order, so callers are served first come,
    /// first served.
    pub async fn acquire(&self) {
        let mut issued = self.issued.lock().await;
        loop {
            let now = Instant::now();
            while issued
                .front()
                .is_some_and(|&at| now.duration_since(at) >= self.period)
            {
                issued.pop_front();
            }

            if issued.len() < self.capacity {
                issued.push_back(now);
                return;
            }

            if let Some(&oldest) = issued.front() {
                let ready_at = oldest + self.period;
                tracing::debug!(
                    wait_ms = u64::try_from(ready_at.duration_since(now).as_millis())
                        .unwrap_or(u64::MAX),
                    "rate limit reached, waiting for a permit"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
    }
}
