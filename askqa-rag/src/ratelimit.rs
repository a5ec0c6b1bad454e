//! Per-client sliding-window rate limiting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::Settings;

/// Outcome of a [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// The request was admitted and counted.
    Admitted,
    /// The window is exhausted; the request was not counted.
    Rejected {
        /// Time until the oldest counted request leaves the window.
        retry_after: Duration,
    },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateDecision::Admitted)
    }
}

/// Admits at most `limit` requests per client within any trailing `window`.
///
/// Timestamps are kept per client and pruned lazily on each check. The
/// prune-decide-record sequence runs under the client's map shard lock, so
/// concurrent requests from one client cannot both claim the last slot.
///
/// # Example
///
/// ```rust,ignore
/// use askqa_rag::RateLimiter;
///
/// let limiter = RateLimiter::new(20, Duration::from_secs(60));
/// if !limiter.check("203.0.113.7").is_admitted() {
///     // reply 429
/// }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    clients: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window, clients: DashMap::new() }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.rate_limit_requests, settings.rate_limit_window())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check and record a request from `client` at the current instant.
    pub fn check(&self, client: &str) -> RateDecision {
        let mut entry = self.clients.entry(client.to_string()).or_default();
        // Read the clock under the entry lock so timestamps stay ordered.
        let now = Instant::now();
        self.decide(entry.value_mut(), now)
    }

    /// Check and record a request from `client` at `now`.
    pub fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let mut entry = self.clients.entry(client.to_string()).or_default();
        self.decide(entry.value_mut(), now)
    }

    fn decide(&self, timestamps: &mut VecDeque<Instant>, now: Instant) -> RateDecision {
        self.prune(timestamps, now);
        if timestamps.len() >= self.limit {
            let retry_after = timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
                .unwrap_or(self.window);
            return RateDecision::Rejected { retry_after };
        }
        timestamps.push_back(now);
        RateDecision::Admitted
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Forget clients with no requests inside the window.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    pub fn sweep_at(&self, now: Instant) {
        self.clients.retain(|_, timestamps| {
            self.prune(timestamps, now);
            !timestamps.is_empty()
        });
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}
