use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Spaces out call dispatches by a fixed minimum interval.
///
/// Only the start of each call is delayed. Calls that have been let through
/// run concurrently and may complete in any order.
pub struct RateLimiter {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits for the next free dispatch slot. Slots are handed out in call
    /// order, so concurrent callers are released one spacing apart.
    pub async fn acquire(&self) {
        let slot = {
            let mut next_slot = self.next_slot.lock().unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let slot = match *next_slot {
                Some(at) if at > now => at,
                _ => now,
            };
            *next_slot = Some(slot + self.spacing);
            slot
        };
        sleep_until(slot).await;
    }

    pub async fn run<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.acquire().await;
        call().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_released_one_spacing_apart() {
        let limiter = RateLimiter::new(Duration::from_millis(110));
        let start = Instant::now();

        let released = join_all((0..4).map(|_| async {
            limiter.acquire().await;
            Instant::now()
        }))
        .await;

        let offsets: Vec<u128> = released
            .iter()
            .map(|at| at.duration_since(start).as_millis())
            .collect();
        assert_eq!(offsets, [0, 110, 220, 330]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_limiter_does_not_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(110));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let before = Instant::now();
        let value = limiter.run(|| async { 7 }).await;
        assert_eq!(value, 7);
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_do_not_hold_back_later_dispatches() {
        let limiter = RateLimiter::new(Duration::from_millis(100));
        let start = Instant::now();

        let finished = join_all((0..3u64).map(|n| {
            let limiter = &limiter;
            async move {
                limiter
                    .run(|| async move {
                        // The first call is the slowest and finishes last.
                        tokio::time::sleep(Duration::from_millis(1000 - n * 300)).await;
                    })
                    .await;
                Instant::now().duration_since(start).as_millis()
            }
        }))
        .await;

        assert_eq!(finished, [1000, 800, 600]);
    }
}
