use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use factline_core::Cancellation;

/// Token bucket rate limiter, one shared instance across every endpoint.
/// Refill happens once per second on a background tick; this is a coarse
/// but deterministic contract, not a smooth per-millisecond rate.
pub struct RateLimiter {
    tokens: AtomicU32,
    burst: u32,
    rate: u32,
}

impl RateLimiter {
    pub fn start(rate: u32, burst: u32, cancel: Cancellation) -> Arc<Self> {
        let limiter = Arc::new(Self {
            tokens: AtomicU32::new(burst),
            burst,
            rate,
        });
        let background = Arc::clone(&limiter);
        tokio::spawn(async move { background.refill_loop(cancel).await });
        limiter
    }

    /// Atomically decrements if tokens > 0, else returns false.
    pub fn allow(&self) -> bool {
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    async fn refill_loop(&self, cancel: Cancellation) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancel.cancelled() => return,
            }
            loop {
                let current = self.tokens.load(Ordering::Acquire);
                let refilled = current.saturating_add(self.rate).min(self.burst);
                if self
                    .tokens
                    .compare_exchange(current, refilled, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_plus_one_yields_exactly_burst_admits() {
        let limiter = RateLimiter {
            tokens: AtomicU32::new(5),
            burst: 5,
            rate: 1,
        };
        let mut admitted = 0;
        for _ in 0..6 {
            if limiter.allow() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
        assert!(!limiter.allow());
    }

    #[tokio::test]
    async fn refill_restores_tokens_after_tick() {
        let cancel = Cancellation::new();
        let limiter = RateLimiter::start(100, 1, cancel.clone());
        assert!(limiter.allow());
        assert!(!limiter.allow());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.allow());
        cancel.cancel();
    }
}
