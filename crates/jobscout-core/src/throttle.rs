//! Sliding-window rate limiting for rate-limited services.
//!
//! [`RateLimiter`] is a plain sliding-window counter: it remembers when each
//! call happened and allows a new one while fewer than `max_calls` fall inside
//! the trailing window. It is not thread-safe by itself;
//! [`RateLimitedBrowser`] shares one limiter between workers behind an async
//! mutex and sleeps until a slot frees before opening each page session.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use jobscout_core::throttle::RateLimiter;
//!
//! let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
//! limiter.record_call();
//! limiter.record_call();
//! assert!(!limiter.can_proceed());
//! assert!(limiter.wait_time() > Duration::ZERO);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::AppError;
use crate::traits::Browser;

/// Counts calls within a trailing time window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            calls: VecDeque::with_capacity(max_calls),
        }
    }

    /// 30 browser sessions per minute.
    pub fn for_browser() -> Self {
        Self::new(30, Duration::from_secs(60))
    }

    /// Forget calls that have left the window.
    fn prune(&mut self) {
        let now = Instant::now();
        while let Some(&oldest) = self.calls.front() {
            if now.duration_since(oldest) >= self.window {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether another call fits in the current window.
    pub fn can_proceed(&mut self) -> bool {
        self.prune();
        self.calls.len() < self.max_calls
    }

    pub fn record_call(&mut self) {
        self.calls.push_back(Instant::now());
    }

    /// Time until the oldest call in the window expires, or zero if a call
    /// may proceed now.
    pub fn wait_time(&mut self) -> Duration {
        if self.can_proceed() {
            return Duration::ZERO;
        }
        match self.calls.front() {
            Some(&oldest) => self.window.saturating_sub(oldest.elapsed()),
            None => Duration::ZERO,
        }
    }
}

/// A [`Browser`] wrapper that bounds how often page sessions are opened.
///
/// Clones share the same limiter, so every worker of a batch draws from one
/// budget.
#[derive(Clone)]
pub struct RateLimitedBrowser<B> {
    inner: B,
    limiter: Arc<Mutex<RateLimiter>>,
}

impl<B: Browser> RateLimitedBrowser<B> {
    pub fn new(inner: B, limiter: RateLimiter) -> Self {
        Self {
            inner,
            limiter: Arc::new(Mutex::new(limiter)),
        }
    }

    /// Wait for a free slot in the window and claim it.
    async fn acquire_slot(&self, url: &str) {
        loop {
            let wait = {
                let mut limiter = self.limiter.lock().await;
                if limiter.can_proceed() {
                    limiter.record_call();
                    return;
                }
                limiter.wait_time()
            };
            // The lock is released while sleeping so other workers can re-check.
            tracing::debug!(
                %url,
                sleep_ms = %wait.as_millis(),
                "Rate limit reached, waiting for a browser slot"
            );
            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }
}

impl<B: Browser> Browser for RateLimitedBrowser<B> {
    type Page = B::Page;

    async fn open(&self, url: &str, timeout: Duration) -> Result<Self::Page, AppError> {
        self.acquire_slot(url).await;
        self.inner.open(url, timeout).await
    }
}
