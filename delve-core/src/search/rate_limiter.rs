//! Client-side request limiter for search providers.
//!
//! Proactively spaces provider calls to stay under a requests-per-minute
//! ceiling instead of relying on 429 backpressure.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A sliding-window limiter over request timestamps.
#[derive(Debug)]
pub struct RequestRateLimiter {
    /// Requests per window (0 = unlimited).
    limit: usize,
    requests: VecDeque<Instant>,
    window: Duration,
}

impl RequestRateLimiter {
    /// Limiter allowing `requests_per_minute` calls per sliding minute.
    pub fn per_minute(requests_per_minute: usize) -> Self {
        Self::with_window(requests_per_minute, Duration::from_secs(60))
    }

    pub fn with_window(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            requests: VecDeque::new(),
            window,
        }
    }

    pub fn unlimited() -> Self {
        Self::per_minute(0)
    }

    /// Returns `None` if a request may go now, or how long to wait first.
    ///
    /// The wait never exceeds one window.
    pub fn check(&mut self) -> Option<Duration> {
        if self.limit == 0 {
            return None;
        }
        let now = Instant::now();
        self.prune(now);
        if self.requests.len() < self.limit {
            return None;
        }
        self.requests
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
            .filter(|wait| !wait.is_zero())
    }

    /// Record a request that is about to be sent.
    pub fn record(&mut self) {
        if self.limit > 0 {
            self.requests.push_back(Instant::now());
        }
    }

    /// Wait until a request is allowed, then record it.
    pub async fn acquire(&mut self) {
        if let Some(wait) = self.check() {
            tracing::info!(
                wait_ms = wait.as_millis() as u64,
                limit = self.limit,
                "Search rate limit reached, cooling down"
            );
            tokio::time::sleep(wait).await;
        }
        self.record();
    }

    pub fn has_limits(&self) -> bool {
        self.limit > 0
    }

    /// Requests counted in the current window.
    pub fn current_usage(&mut self) -> usize {
        self.prune(Instant::now());
        self.requests.len()
    }

    fn prune(&mut self, now: Instant) {
        while self
            .requests
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            self.requests.pop_front();
        }
    }
}
